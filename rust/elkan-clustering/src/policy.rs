// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use std::fmt::Debug;

use log::debug;
use serde::{Deserialize, Serialize};

use elkan_core::Result;

use crate::model::ClusterModelSet;

pub const DEFAULT_CONVERGENCE_DELTA: f64 = 0.001;

/// Policy of the clustering algorithm driving the rounds.
///
/// The distance step does not make clustering decisions. It only lets the
/// policy observe the prior round's models once, before any record is
/// processed.
pub trait ClusteringPolicy: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Update the policy state from the models of the prior round.
    fn refresh(&mut self, models: &ClusterModelSet) -> Result<()>;
}

/// Policy description stored next to a snapshot, in `_policy.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy")]
pub enum PolicyConfig {
    #[serde(rename = "kmeans")]
    KMeans {
        #[serde(default = "default_convergence_delta")]
        convergence_delta: f64,
    },
}

fn default_convergence_delta() -> f64 {
    DEFAULT_CONVERGENCE_DELTA
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::KMeans {
            convergence_delta: DEFAULT_CONVERGENCE_DELTA,
        }
    }
}

impl PolicyConfig {
    pub fn build(&self) -> Box<dyn ClusteringPolicy> {
        match self {
            Self::KMeans { convergence_delta } => Box::new(KMeansPolicy::new(*convergence_delta)),
        }
    }
}

/// The k-means policy.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansPolicy {
    convergence_delta: f64,
    num_clusters: usize,
    num_converged: usize,
    num_refreshes: usize,
}

impl KMeansPolicy {
    pub fn new(convergence_delta: f64) -> Self {
        Self {
            convergence_delta,
            num_clusters: 0,
            num_converged: 0,
            num_refreshes: 0,
        }
    }

    pub fn convergence_delta(&self) -> f64 {
        self.convergence_delta
    }

    /// Number of models seen by the last refresh.
    pub fn num_clusters(&self) -> usize {
        self.num_clusters
    }

    /// Number of models flagged as converged by the prior round.
    pub fn num_converged(&self) -> usize {
        self.num_converged
    }

    pub fn num_refreshes(&self) -> usize {
        self.num_refreshes
    }

    /// Whether every model of the prior round converged.
    pub fn all_converged(&self) -> bool {
        self.num_refreshes > 0 && self.num_converged == self.num_clusters
    }
}

impl Default for KMeansPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERGENCE_DELTA)
    }
}

impl ClusteringPolicy for KMeansPolicy {
    fn name(&self) -> &str {
        "kmeans"
    }

    fn refresh(&mut self, models: &ClusterModelSet) -> Result<()> {
        self.num_clusters = models.k();
        self.num_converged = models
            .iter()
            .filter(|m| m.converged == Some(true))
            .count();
        self.num_refreshes += 1;
        debug!(
            "KMeans policy refreshed: {}/{} clusters converged (delta={})",
            self.num_converged, self.num_clusters, self.convergence_delta
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::ClusterModel;

    #[test]
    fn test_kmeans_refresh() {
        let models = ClusterModelSet::try_new(vec![
            ClusterModel::new(0, vec![0.0]).with_converged(true),
            ClusterModel::new(1, vec![1.0]).with_converged(false),
            ClusterModel::new(2, vec![2.0]),
        ])
        .unwrap();
        let mut policy = KMeansPolicy::default();
        assert!(!policy.all_converged());
        policy.refresh(&models).unwrap();
        assert_eq!(policy.num_clusters(), 3);
        assert_eq!(policy.num_converged(), 1);
        assert_eq!(policy.num_refreshes(), 1);
        assert!(!policy.all_converged());
    }

    #[test]
    fn test_policy_config_json() {
        let config: PolicyConfig = serde_json::from_str(r#"{"policy": "kmeans"}"#).unwrap();
        assert_eq!(config, PolicyConfig::default());

        let config: PolicyConfig =
            serde_json::from_str(r#"{"policy": "kmeans", "convergence_delta": 0.25}"#).unwrap();
        assert_eq!(
            config,
            PolicyConfig::KMeans {
                convergence_delta: 0.25
            }
        );
        assert_eq!(config.build().name(), "kmeans");

        assert!(serde_json::from_str::<PolicyConfig>(r#"{"policy": "canopy"}"#).is_err());
        assert_eq!(
            serde_json::to_string(&PolicyConfig::default()).unwrap(),
            r#"{"policy":"kmeans","convergence_delta":0.001}"#
        );
    }
}
