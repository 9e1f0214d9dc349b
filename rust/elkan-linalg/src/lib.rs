// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Vectors and distance measures used to compare cluster centers.

pub mod distance;
pub mod vector;

pub use distance::{DistanceMeasure, DistanceMeasureRegistry, DistanceType};
pub use elkan_core::{Error, Result};
pub use vector::{paired_entries, SparseVector, Vector};
