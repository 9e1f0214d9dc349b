// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use elkan_core::Result;
use elkan_linalg::{DistanceMeasure, Vector};

use crate::context::WorkerContext;
use crate::model::{ClusterModel, ClusterModelSet};

/// Distances from one center to every model of a [`ClusterModelSet`].
///
/// Entry `j` is the distance to the `j`-th model of the set.
pub type DistanceVector = Vec<f32>;

/// Computes the row of the centroid distance matrix for one cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct CentroidDistanceComputer;

impl CentroidDistanceComputer {
    /// Distances from `query` to every center of `models`, in model order.
    ///
    /// The result always holds `K` values, the distance of a model to itself
    /// included.
    pub fn compute(
        query: &Vector,
        models: &ClusterModelSet,
        measure: &dyn DistanceMeasure,
    ) -> Result<DistanceVector> {
        query.check_dimension(models.dimension())?;
        let mut distances = Vec::with_capacity(models.k());
        for model in models {
            distances.push(measure.distance(query, &model.center)?);
        }
        Ok(distances)
    }

    /// Distance vector of one input record, keyed by the record id.
    ///
    /// Errors name the record that caused them.
    pub fn compute_record(
        record: &ClusterModel,
        context: &WorkerContext,
    ) -> Result<(i32, DistanceVector)> {
        Self::compute(&record.center, context.models(), context.measure())
            .map(|distances| (record.id, distances))
            .map_err(|e| e.for_record(record.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use elkan_core::{Error, ErrorKind};
    use elkan_linalg::distance::DistanceType;
    use elkan_testing::datagen::{generate_scaled_random_centers, sparsify};
    use rstest::rstest;

    fn triangle() -> ClusterModelSet {
        ClusterModelSet::try_new(vec![
            ClusterModel::new(0, vec![0.0, 0.0]),
            ClusterModel::new(1, vec![3.0, 0.0]),
            ClusterModel::new(2, vec![0.0, 4.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_triangle() {
        let models = triangle();
        let distances = CentroidDistanceComputer::compute(
            &Vector::dense(vec![0.0, 0.0]),
            &models,
            &DistanceType::Euclidean,
        )
        .unwrap();
        assert_eq!(distances, vec![0.0, 3.0, 4.0]);

        let distances = CentroidDistanceComputer::compute(
            &models[1].center,
            &models,
            &DistanceType::Euclidean,
        )
        .unwrap();
        assert_eq!(distances, vec![3.0, 0.0, 5.0]);
    }

    #[rstest]
    #[case(DistanceType::Euclidean)]
    #[case(DistanceType::SquaredEuclidean)]
    #[case(DistanceType::Manhattan)]
    #[case(DistanceType::Chebyshev)]
    #[case(DistanceType::Cosine)]
    #[case(DistanceType::Tanimoto)]
    fn test_self_distance_and_length(#[case] distance_type: DistanceType) {
        let centers = generate_scaled_random_centers(7, 12, -10.0..10.0, [11; 32]);
        let models = ClusterModelSet::try_new(
            centers
                .into_iter()
                .enumerate()
                .map(|(i, c)| ClusterModel::new(i as i32, c))
                .collect(),
        )
        .unwrap();
        for (j, model) in models.iter().enumerate() {
            let distances =
                CentroidDistanceComputer::compute(&model.center, &models, &distance_type).unwrap();
            assert_eq!(distances.len(), models.k());
            assert_relative_eq!(distances[j], 0.0, epsilon = 1e-5);

            let again =
                CentroidDistanceComputer::compute(&model.center, &models, &distance_type).unwrap();
            assert_eq!(
                distances.iter().map(|d| d.to_bits()).collect::<Vec<_>>(),
                again.iter().map(|d| d.to_bits()).collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn test_sparse_query_matches_dense() {
        let centers = generate_scaled_random_centers(5, 32, -1.0..1.0, [4; 32]);
        let models = ClusterModelSet::try_new(
            centers
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let (indices, values) = sparsify(c, 0.3, [i as u8; 32]);
                    ClusterModel::new(i as i32, Vector::sparse(32, indices, values).unwrap())
                })
                .collect(),
        )
        .unwrap();
        let query = generate_scaled_random_centers(1, 32, -1.0..1.0, [8; 32]).remove(0);
        let (indices, values) = sparsify(&query, 0.5, [9; 32]);
        let sparse = Vector::sparse(32, indices, values).unwrap();
        let dense = Vector::dense(sparse.to_dense());

        for distance_type in DistanceType::ALL {
            let a = CentroidDistanceComputer::compute(&sparse, &models, &distance_type).unwrap();
            let b = CentroidDistanceComputer::compute(&dense, &models, &distance_type).unwrap();
            assert_eq!(
                a.iter().map(|d| d.to_bits()).collect::<Vec<_>>(),
                b.iter().map(|d| d.to_bits()).collect::<Vec<_>>(),
                "{distance_type}"
            );
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let err = CentroidDistanceComputer::compute(
            &Vector::dense(vec![0.0, 0.0, 0.0]),
            &triangle(),
            &DistanceType::Euclidean,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 3,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Data);
    }
}
