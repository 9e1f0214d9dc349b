// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Map-only job computing the pairwise distances between cluster centers.
//!
//! The distance matrix produced here feeds the triangle-inequality pruning of
//! an Elkan k-means iteration. The job reads the prior round's cluster models
//! once per worker, then, for each input cluster record, emits the distances
//! from the record's center to every model center, in model order.

pub mod compute;
pub mod context;
pub mod job;
pub mod model;
pub mod output;
pub mod params;
pub mod policy;
pub mod snapshot;

pub use compute::{CentroidDistanceComputer, DistanceVector};
pub use context::WorkerContext;
pub use job::{run, run_async, DistanceMatrixJob, JobSummary};
pub use model::{ClusterModel, ClusterModelSet};
pub use output::{read_distance_matrix, CommitManifest, DistanceMatrix};
pub use params::DistanceStepParams;
pub use policy::{ClusteringPolicy, KMeansPolicy, PolicyConfig};
