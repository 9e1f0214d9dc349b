// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::path::Path;
use snafu::location;
use tokio_util::sync::CancellationToken;

use elkan_clustering::output::encode_distance_rows;
use elkan_clustering::snapshot::{write_part, write_snapshot};
use elkan_clustering::{
    read_distance_matrix, run, run_async, ClusterModel, DistanceMatrix, DistanceMatrixJob,
    DistanceStepParams,
};
use elkan_core::io::ObjectStore;
use elkan_core::utils::testing::ProxyObjectStore;
use elkan_core::{Error, ErrorKind, Result, SUCCESS_MARKER};
use elkan_linalg::distance::DistanceType;
use elkan_linalg::{DistanceMeasure, DistanceMeasureRegistry, Vector};
use elkan_testing::datagen::{generate_scaled_random_centers, sparsify};

fn triangle() -> Vec<ClusterModel> {
    vec![
        ClusterModel::new(0, vec![0.0, 0.0]).with_num_observations(5),
        ClusterModel::new(1, vec![3.0, 0.0]).with_num_observations(7),
        ClusterModel::new(2, vec![0.0, 4.0]).with_num_observations(2),
    ]
}

struct Fixture {
    input: ObjectStore,
    output: ObjectStore,
    prior: ObjectStore,
}

impl Fixture {
    fn new() -> Self {
        Self {
            input: ObjectStore::memory(),
            output: ObjectStore::memory(),
            prior: ObjectStore::memory(),
        }
    }

    fn with_output(self, output: ObjectStore) -> Self {
        Self { output, ..self }
    }

    async fn with_prior(self, models: &[ClusterModel]) -> Self {
        write_snapshot(&self.prior, &Path::from("prior"), models, 1)
            .await
            .unwrap();
        self
    }

    async fn with_input(self, records: &[ClusterModel], num_parts: usize) -> Self {
        write_snapshot(&self.input, &Path::from("input"), records, num_parts)
            .await
            .unwrap();
        self
    }

    fn job(&self, params: DistanceStepParams) -> DistanceMatrixJob {
        DistanceMatrixJob::new("input", "output", params).with_stores(
            self.input.clone(),
            self.output.clone(),
            self.prior.clone(),
        )
    }

    async fn matrix(&self) -> Result<DistanceMatrix> {
        read_distance_matrix(&self.output, &Path::from("output")).await
    }

    async fn output_files(&self) -> Vec<Path> {
        self.output
            .inner
            .list(Some(&Path::from("output")))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await
            .unwrap()
    }
}

fn params() -> DistanceStepParams {
    DistanceStepParams::new("prior")
        .with_parallelism(2)
        .with_max_task_attempts(2)
}

fn bits(matrix: &DistanceMatrix) -> Vec<(i32, Vec<u32>)> {
    matrix
        .rows()
        .iter()
        .map(|(id, d)| (*id, d.iter().map(|v| v.to_bits()).collect()))
        .collect()
}

#[tokio::test]
async fn test_triangle_distances() {
    let fixture = Fixture::new()
        .with_prior(&triangle())
        .await
        .with_input(&triangle(), 2)
        .await;
    let summary = fixture.job(params()).execute().await.unwrap();
    assert_eq!(summary.num_tasks, 2);
    assert_eq!(summary.num_records, 3);
    assert_eq!(summary.k, 3);
    assert_eq!(summary.dimension, 2);
    assert_eq!(summary.num_retries, 0);

    let matrix = fixture.matrix().await.unwrap();
    assert_eq!(matrix.k(), 3);
    assert_eq!(matrix.get(0), Some([0.0, 3.0, 4.0].as_slice()));
    assert_eq!(matrix.get(1), Some([3.0, 0.0, 5.0].as_slice()));
    assert_eq!(matrix.get(2), Some([4.0, 5.0, 0.0].as_slice()));

    let files = fixture.output_files().await;
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|p| !p.as_ref().contains("_temporary")));
}

#[tokio::test]
async fn test_one_row_per_record() {
    let prior = generate_scaled_random_centers(9, 24, -5.0..5.0, [1; 32])
        .into_iter()
        .enumerate()
        .map(|(i, c)| ClusterModel::new(i as i32, c))
        .collect::<Vec<_>>();
    let records = generate_scaled_random_centers(50, 24, -5.0..5.0, [2; 32])
        .into_iter()
        .enumerate()
        .map(|(i, c)| ClusterModel::new(100 + i as i32, c))
        .collect::<Vec<_>>();
    let fixture = Fixture::new()
        .with_prior(&prior)
        .await
        .with_input(&records, 4)
        .await;
    let summary = fixture
        .job(params().with_parallelism(3).with_distance_measure("l1"))
        .execute()
        .await
        .unwrap();
    assert_eq!(summary.num_records, 50);

    let matrix = fixture.matrix().await.unwrap();
    assert_eq!(matrix.len(), 50);
    assert_eq!(matrix.k(), 9);
    for record in records.iter() {
        let row = matrix.get(record.id).unwrap();
        assert_eq!(row.len(), 9);
        let expected = DistanceType::Manhattan
            .distance(&record.center, &prior[4].center)
            .unwrap();
        assert_eq!(row[4].to_bits(), expected.to_bits());
    }
}

#[tokio::test]
async fn test_sparse_and_dense_inputs_agree() {
    let centers = generate_scaled_random_centers(12, 40, -1.0..1.0, [5; 32]);
    let prior = centers
        .iter()
        .take(4)
        .enumerate()
        .map(|(i, c)| ClusterModel::new(i as i32, c.clone()))
        .collect::<Vec<_>>();
    let sparse = centers
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let (indices, values) = sparsify(c, 0.25, [i as u8; 32]);
            ClusterModel::new(i as i32, Vector::sparse(40, indices, values).unwrap())
        })
        .collect::<Vec<_>>();
    let dense = sparse
        .iter()
        .map(|m| ClusterModel::new(m.id, m.center.to_dense()))
        .collect::<Vec<_>>();

    let sparse_fixture = Fixture::new()
        .with_prior(&prior)
        .await
        .with_input(&sparse, 3)
        .await;
    let dense_fixture = Fixture::new()
        .with_prior(&prior)
        .await
        .with_input(&dense, 2)
        .await;
    for fixture in [&sparse_fixture, &dense_fixture] {
        fixture
            .job(params().with_distance_measure("cosine"))
            .execute()
            .await
            .unwrap();
    }
    assert_eq!(
        bits(&sparse_fixture.matrix().await.unwrap()),
        bits(&dense_fixture.matrix().await.unwrap())
    );
}

#[tokio::test]
async fn test_empty_prior_fails_without_output() {
    let fixture = Fixture::new().with_input(&triangle(), 1).await;
    write_part(&fixture.prior, &Path::from("prior"), 0, &[])
        .await
        .unwrap();

    let err = fixture.job(params()).execute().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    match err {
        Error::TaskFailed {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 1);
            assert!(matches!(*source, Error::EmptyModelSet { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(fixture.output_files().await.is_empty());
}

#[tokio::test]
async fn test_dimension_mismatch_fails_without_commit() {
    let mut records = triangle();
    records.push(ClusterModel::new(3, vec![0.0, 0.0, 0.0]));
    let fixture = Fixture::new()
        .with_prior(&triangle())
        .await
        .with_input(&records, 2)
        .await;

    let err = fixture.job(params()).execute().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Data);
    match &err {
        Error::TaskFailed {
            attempts, source, ..
        } => {
            assert_eq!(*attempts, 2);
            assert!(matches!(**source, Error::Record { id: 3, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        fixture.matrix().await.unwrap_err(),
        Error::NotFound { .. }
    ));
    assert!(fixture.output_files().await.is_empty());
}

#[tokio::test]
async fn test_unknown_measure() {
    let fixture = Fixture::new()
        .with_prior(&triangle())
        .await
        .with_input(&triangle(), 1)
        .await;
    let err = fixture
        .job(params().with_distance_measure("mahalanobis"))
        .execute()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownDistanceMeasure { .. }));
    assert!(fixture.output_files().await.is_empty());
}

#[tokio::test]
async fn test_committed_output_is_not_overwritten() {
    let fixture = Fixture::new()
        .with_prior(&triangle())
        .await
        .with_input(&triangle(), 1)
        .await;
    fixture.job(params()).execute().await.unwrap();
    let first = fixture.matrix().await.unwrap();

    let err = fixture.job(params()).execute().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    fixture
        .job(params().with_overwrite(true))
        .execute()
        .await
        .unwrap();
    let second = fixture.matrix().await.unwrap();
    assert_eq!(bits(&first), bits(&second));
}

#[tokio::test]
async fn test_leftover_part_files_are_not_committed() {
    let fixture = Fixture::new()
        .with_prior(&triangle())
        .await
        .with_input(&triangle(), 1)
        .await;
    let leftover = Path::from("output").child("part-00007.arrow");
    fixture
        .output
        .put(
            &leftover,
            encode_distance_rows(&[(99, vec![1.0, 2.0, 3.0])], 3).unwrap(),
        )
        .await
        .unwrap();

    let err = fixture.job(params()).execute().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(matches!(
        fixture.matrix().await.unwrap_err(),
        Error::NotFound { .. }
    ));
    assert_eq!(fixture.output_files().await, vec![leftover.clone()]);

    fixture
        .job(params().with_overwrite(true))
        .execute()
        .await
        .unwrap();
    let matrix = fixture.matrix().await.unwrap();
    assert_eq!(
        matrix.rows().iter().map(|(id, _)| *id).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert!(!fixture.output.exists(&leftover).await.unwrap());
}

#[tokio::test]
async fn test_failed_commit_rolls_back_part_files() {
    let (output, policy) = ProxyObjectStore::memory();
    let fixture = Fixture::new()
        .with_output(output)
        .with_prior(&triangle())
        .await
        .with_input(&triangle(), 2)
        .await;
    policy.lock().unwrap().set_before_policy(
        "interrupt_commit",
        Arc::new(|method: &str, path: &Path| -> Result<()> {
            if method == "rename" && path.filename() == Some("part-00001.arrow") {
                return Err(Error::io("connection reset by peer", location!()));
            }
            Ok(())
        }),
    );

    let err = fixture.job(params()).execute().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Infrastructure);
    assert!(fixture.output_files().await.is_empty());

    policy
        .lock()
        .unwrap()
        .clear_before_policy("interrupt_commit");
    fixture.job(params()).execute().await.unwrap();
    assert_eq!(fixture.matrix().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_cancelled_job_commits_nothing() {
    let fixture = Fixture::new()
        .with_prior(&triangle())
        .await
        .with_input(&triangle(), 3)
        .await;
    let token = CancellationToken::new();
    token.cancel();
    let err = fixture
        .job(params())
        .with_cancellation(token)
        .execute()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(fixture.output_files().await.is_empty());
}

/// Fails the first `failures` calls with an I/O error.
#[derive(Debug)]
struct FlakyMeasure {
    calls: Arc<AtomicUsize>,
    failures: usize,
}

impl DistanceMeasure for FlakyMeasure {
    fn name(&self) -> &str {
        "flaky"
    }

    fn distance(&self, a: &Vector, b: &Vector) -> Result<f32> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(Error::io("connection reset by peer", location!()));
        }
        DistanceType::Euclidean.distance(a, b)
    }
}

#[tokio::test]
async fn test_retried_task_matches_first_try() {
    let fixture = Fixture::new()
        .with_prior(&triangle())
        .await
        .with_input(&triangle(), 1)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = DistanceMeasureRegistry::default();
    let shared = calls.clone();
    registry.register(
        "flaky",
        Arc::new(move || {
            Arc::new(FlakyMeasure {
                calls: shared.clone(),
                failures: 2,
            }) as Arc<dyn DistanceMeasure>
        }),
    );
    let summary = fixture
        .job(
            params()
                .with_distance_measure("flaky")
                .with_max_task_attempts(3),
        )
        .with_registry(registry)
        .execute()
        .await
        .unwrap();
    assert_eq!(summary.num_retries, 2);
    let retried = fixture.matrix().await.unwrap();

    let reference = Fixture::new()
        .with_prior(&triangle())
        .await
        .with_input(&triangle(), 1)
        .await;
    reference.job(params()).execute().await.unwrap();
    assert_eq!(bits(&retried), bits(&reference.matrix().await.unwrap()));
}

#[tokio::test]
async fn test_local_files_and_status() {
    let tmp = tempfile::tempdir().unwrap();
    let prior = tmp.path().join("prior");
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    let (store, prior_path) = ObjectStore::from_uri(prior.to_str().unwrap()).unwrap();
    write_snapshot(&store, &prior_path, &triangle(), 2)
        .await
        .unwrap();
    let (store, input_path) = ObjectStore::from_uri(input.to_str().unwrap()).unwrap();
    write_snapshot(&store, &input_path, &triangle(), 1)
        .await
        .unwrap();

    let config = HashMap::from([
        (
            "prior_path".to_string(),
            prior.to_str().unwrap().to_string(),
        ),
        ("distance_measure".to_string(), "Euclidean".to_string()),
    ]);
    let status = run_async(
        input.to_str().unwrap(),
        output.to_str().unwrap(),
        &config,
    )
    .await;
    assert_eq!(status, 0);
    assert!(output.join(SUCCESS_MARKER).exists());

    let (store, output_path) = ObjectStore::from_uri(output.to_str().unwrap()).unwrap();
    let matrix = read_distance_matrix(&store, &output_path).await.unwrap();
    assert_eq!(matrix.get(0), Some([0.0, 3.0, 4.0].as_slice()));
}

#[test]
fn test_unreadable_snapshot_status() {
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let (store, input_path) = ObjectStore::from_uri(input.to_str().unwrap()).unwrap();
        write_snapshot(&store, &input_path, &triangle(), 1)
            .await
            .unwrap();
    });
    drop(runtime);

    let config = HashMap::from([(
        "prior_path".to_string(),
        tmp.path().join("does-not-exist").to_str().unwrap().to_string(),
    )]);
    let status = run(input.to_str().unwrap(), output.to_str().unwrap(), &config);
    assert_ne!(status, 0);
    assert!(!output.join(SUCCESS_MARKER).exists());
    assert!(!output.join("part-00000.arrow").exists());
}
