// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use std::ops::Index;

use deepsize::DeepSizeOf;
use elkan_core::{Error, Result};
use elkan_linalg::Vector;
use snafu::location;

/// One cluster of a clustering round.
///
/// Only `id` and `center` are used to compute distances. The statistics are
/// carried along so that they survive a snapshot round-trip.
#[derive(Debug, Clone, PartialEq, DeepSizeOf)]
pub struct ClusterModel {
    pub id: i32,
    pub center: Vector,
    pub num_observations: Option<u64>,
    pub radius: Option<Vec<f32>>,
    pub converged: Option<bool>,
}

impl ClusterModel {
    pub fn new(id: i32, center: impl Into<Vector>) -> Self {
        Self {
            id,
            center: center.into(),
            num_observations: None,
            radius: None,
            converged: None,
        }
    }

    pub fn with_num_observations(mut self, num_observations: u64) -> Self {
        self.num_observations = Some(num_observations);
        self
    }

    pub fn with_radius(mut self, radius: Vec<f32>) -> Self {
        self.radius = Some(radius);
        self
    }

    pub fn with_converged(mut self, converged: bool) -> Self {
        self.converged = Some(converged);
        self
    }

    pub fn dimension(&self) -> usize {
        self.center.dimension()
    }
}

/// All `K` cluster models of a round, in their canonical order.
///
/// The position of a model in the set is its index in every distance vector.
/// The set is never empty and every center has the same dimension.
#[derive(Debug, Clone, PartialEq, DeepSizeOf)]
pub struct ClusterModelSet {
    models: Vec<ClusterModel>,
    dimension: usize,
}

impl ClusterModelSet {
    pub fn try_new(models: Vec<ClusterModel>) -> Result<Self> {
        let Some(first) = models.first() else {
            return Err(Error::InconsistentModelSet {
                message: "a model set needs at least one model".to_string(),
                location: location!(),
            });
        };
        let dimension = first.dimension();
        if let Some(model) = models.iter().find(|m| m.dimension() != dimension) {
            return Err(Error::InconsistentModelSet {
                message: format!(
                    "cluster {} has dimension {} but cluster {} has dimension {}",
                    model.id,
                    model.dimension(),
                    first.id,
                    dimension
                ),
                location: location!(),
            });
        }
        Ok(Self { models, dimension })
    }

    /// Number of models `K`.
    pub fn k(&self) -> usize {
        self.models.len()
    }

    /// Dimension `D` shared by every center.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn models(&self) -> &[ClusterModel] {
        &self.models
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ClusterModel> {
        self.models.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ClusterModel> {
        self.models.get(index)
    }

    /// Index of the model with the given id, if any.
    pub fn position(&self, id: i32) -> Option<usize> {
        self.models.iter().position(|m| m.id == id)
    }

    pub fn into_models(self) -> Vec<ClusterModel> {
        self.models
    }
}

impl Index<usize> for ClusterModelSet {
    type Output = ClusterModel;

    fn index(&self, index: usize) -> &Self::Output {
        &self.models[index]
    }
}

impl<'a> IntoIterator for &'a ClusterModelSet {
    type Item = &'a ClusterModel;
    type IntoIter = std::slice::Iter<'a, ClusterModel>;

    fn into_iter(self) -> Self::IntoIter {
        self.models.iter()
    }
}
