// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use std::sync::Arc;

use deepsize::DeepSizeOf;
use elkan_core::io::ObjectStore;
use elkan_core::utils::backoff::{retry_with_backoff, Backoff};
use elkan_core::Result;
use elkan_linalg::DistanceMeasure;
use log::info;
use object_store::path::Path;
use tracing::instrument;

use crate::model::ClusterModelSet;
use crate::policy::ClusteringPolicy;
use crate::snapshot::{load_model_set, read_policy_config};

/// Everything a worker needs to process records.
///
/// Built once per worker, then shared read-only by every record of the
/// worker. The policy has already been refreshed with the models.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    models: Arc<ClusterModelSet>,
    measure: Arc<dyn DistanceMeasure>,
    policy: Arc<dyn ClusteringPolicy>,
}

impl WorkerContext {
    /// Refresh `policy` with `models` and freeze the result.
    pub fn initialize(
        models: ClusterModelSet,
        measure: Arc<dyn DistanceMeasure>,
        mut policy: Box<dyn ClusteringPolicy>,
    ) -> Result<Self> {
        policy.refresh(&models)?;
        Ok(Self {
            models: Arc::new(models),
            measure,
            policy: Arc::from(policy),
        })
    }

    /// Load the snapshot at `prior` and initialize a context from it.
    ///
    /// Transient failures while reading the snapshot are retried up to
    /// `load_attempts` times in total.
    #[instrument(level = "debug", skip(store, measure))]
    pub async fn load(
        store: &ObjectStore,
        prior: &Path,
        measure: Arc<dyn DistanceMeasure>,
        load_attempts: u32,
    ) -> Result<Self> {
        let (models, policy_config) = retry_with_backoff(
            "load cluster models",
            load_attempts,
            Backoff::default(),
            |_| async move {
                let models = load_model_set(store, prior).await?;
                let policy_config = read_policy_config(store, prior).await?;
                Ok((models, policy_config))
            },
        )
        .await?;
        info!(
            "Loaded {} cluster models of dimension {} from {} ({} bytes, measure={}, policy={:?})",
            models.k(),
            models.dimension(),
            prior,
            models.deep_size_of(),
            measure.name(),
            policy_config
        );
        Self::initialize(models, measure, policy_config.build())
    }

    pub fn models(&self) -> &ClusterModelSet {
        &self.models
    }

    pub fn measure(&self) -> &dyn DistanceMeasure {
        self.measure.as_ref()
    }

    pub fn policy(&self) -> &dyn ClusteringPolicy {
        self.policy.as_ref()
    }
}
