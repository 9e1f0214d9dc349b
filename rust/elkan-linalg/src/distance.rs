// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Distance measures
//!
//! This module provides the pluggable distance measures used to compare
//! cluster centers.
//!
//! - Every measure accepts dense and sparse [`Vector`]s, in any combination.
//! - Measures are resolved by name through a [`DistanceMeasureRegistry`].

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use deepsize::DeepSizeOf;
use elkan_core::{Error, Result};
use log::debug;
use snafu::location;

pub mod chebyshev;
pub mod cosine;
pub mod dot;
pub mod l2;
pub mod manhattan;
pub mod tanimoto;

pub use chebyshev::*;
pub use cosine::*;
pub use dot::*;
pub use l2::*;
pub use manhattan::*;
pub use tanimoto::*;

use crate::vector::Vector;

/// A scalar distance between two vectors.
///
/// Implementations must be pure: they are shared between worker threads and
/// called concurrently. Symmetry is not required.
pub trait DistanceMeasure: Send + Sync + Debug {
    /// Name the measure was registered under.
    fn name(&self) -> &str;

    /// Distance from `a` to `b`.
    ///
    /// Fails with [`Error::DimensionMismatch`] if the vectors have different
    /// dimensions.
    fn distance(&self, a: &Vector, b: &Vector) -> Result<f32>;
}

pub type DistanceFunc = fn(&Vector, &Vector) -> Result<f32>;

/// Built-in distance types.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, DeepSizeOf)]
pub enum DistanceType {
    Euclidean,
    SquaredEuclidean,
    Manhattan,
    Chebyshev,
    Cosine,
    Tanimoto,
}

impl DistanceType {
    pub const ALL: [Self; 6] = [
        Self::Euclidean,
        Self::SquaredEuclidean,
        Self::Manhattan,
        Self::Chebyshev,
        Self::Cosine,
        Self::Tanimoto,
    ];

    /// Returns the distance function between two vectors.
    pub fn func(&self) -> DistanceFunc {
        match self {
            Self::Euclidean => euclidean_distance,
            Self::SquaredEuclidean => l2_squared,
            Self::Manhattan => manhattan_distance,
            Self::Chebyshev => chebyshev_distance,
            Self::Cosine => cosine_distance,
            Self::Tanimoto => tanimoto_distance,
        }
    }

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Euclidean => "euclidean",
            Self::SquaredEuclidean => "squared_euclidean",
            Self::Manhattan => "manhattan",
            Self::Chebyshev => "chebyshev",
            Self::Cosine => "cosine",
            Self::Tanimoto => "tanimoto",
        }
    }

    /// Alternative names accepted by [`TryFrom<&str>`] and the default registry.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Euclidean => &["l2"],
            Self::SquaredEuclidean => &["l2sq", "squared_l2"],
            Self::Manhattan => &["l1", "cityblock"],
            Self::Chebyshev => &["linf"],
            Self::Cosine => &[],
            Self::Tanimoto => &["jaccard"],
        }
    }
}

impl std::fmt::Display for DistanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for DistanceType {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        let name = normalize_name(s);
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == name || t.aliases().contains(&name.as_str()))
            .ok_or_else(|| Error::UnknownDistanceMeasure {
                name: s.to_string(),
                location: location!(),
            })
    }
}

impl DistanceMeasure for DistanceType {
    fn name(&self) -> &str {
        self.as_str()
    }

    #[inline]
    fn distance(&self, a: &Vector, b: &Vector) -> Result<f32> {
        self.func()(a, b)
    }
}

/// Creates a distance measure instance.
pub type DistanceMeasureFactory = Arc<dyn Fn() -> Arc<dyn DistanceMeasure> + Send + Sync>;

/// Maps measure names to factories.
///
/// Names are matched case-insensitively, ignoring surrounding whitespace.
/// [`Default`] registers every [`DistanceType`] under its canonical name and
/// aliases.
#[derive(Clone)]
pub struct DistanceMeasureRegistry {
    factories: BTreeMap<String, DistanceMeasureFactory>,
}

impl DistanceMeasureRegistry {
    /// A registry without any measure.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register `factory` under `name`, replacing any previous registration.
    pub fn register(&mut self, name: &str, factory: DistanceMeasureFactory) {
        let name = normalize_name(name);
        if self.factories.insert(name.clone(), factory).is_some() {
            debug!("Replaced the distance measure registered as '{}'", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&normalize_name(name))
    }

    /// Instantiate the measure registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DistanceMeasure>> {
        self.factories
            .get(&normalize_name(name))
            .map(|factory| factory())
            .ok_or_else(|| Error::UnknownDistanceMeasure {
                name: name.to_string(),
                location: location!(),
            })
    }

    /// Registered names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for DistanceMeasureRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for distance_type in DistanceType::ALL {
            let factory: DistanceMeasureFactory =
                Arc::new(move || Arc::new(distance_type) as Arc<dyn DistanceMeasure>);
            registry.register(distance_type.as_str(), factory.clone());
            for alias in distance_type.aliases() {
                registry.register(alias, factory.clone());
            }
        }
        registry
    }
}

impl Debug for DistanceMeasureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistanceMeasureRegistry")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
