// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Cluster model snapshots.
//!
//! A snapshot is a directory of Arrow IPC part files named `part-NNNNN.arrow`.
//! Each row is one [`ClusterModel`]:
//!
//! | column             | type              | notes                          |
//! |--------------------|-------------------|--------------------------------|
//! | `id`               | `Int32`           |                                |
//! | `dimension`        | `UInt32`          | `D`                            |
//! | `indices`          | `List<UInt32>`    | null for a dense center        |
//! | `values`           | `List<Float32>`   | `D` values, or the stored ones |
//! | `num_observations` | `UInt64`          | nullable                       |
//! | `radius`           | `List<Float32>`   | nullable                       |
//! | `converged`        | `Boolean`         | nullable                       |
//!
//! The same layout is used for the input records of the distance job. A
//! snapshot directory may also hold a `_policy.json` describing the
//! clustering policy of the round.

use std::sync::Arc;

use arrow_array::builder::{
    BooleanBuilder, Float32Builder, Int32Builder, ListBuilder, UInt32Builder, UInt64Builder,
};
use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Int32Type, UInt32Type, UInt64Type};
use arrow_array::{Array, ArrayRef, RecordBatch};
use arrow_ipc::reader::FileReader as ArrowFileReader;
use arrow_ipc::writer::{FileWriter as ArrowFileWriter, IpcWriteOptions};
use arrow_ipc::CompressionType;
use arrow_schema::{ArrowError, DataType, Field, Schema, SchemaRef};
use elkan_core::error::{box_error, CorruptFileSnafu};
use elkan_core::io::ObjectStore;
use elkan_core::{Error, Result};
use elkan_linalg::Vector;
use log::debug;
use object_store::path::Path;
use snafu::{location, ResultExt};
use tracing::instrument;

use crate::model::{ClusterModel, ClusterModelSet};
use crate::policy::PolicyConfig;

pub const PART_PREFIX: &str = "part-";
pub const PART_SUFFIX: &str = ".arrow";
pub const POLICY_FILE: &str = "_policy.json";

/// Name of the `part`-th part file.
pub fn part_file_name(part: usize) -> String {
    format!("{PART_PREFIX}{part:05}{PART_SUFFIX}")
}

fn is_part_file(path: &Path) -> bool {
    path.filename()
        .is_some_and(|name| name.starts_with(PART_PREFIX) && name.ends_with(PART_SUFFIX))
}

/// Get the Arrow schema of a cluster model file.
pub fn models_arrow_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int32, false),
        Field::new("dimension", DataType::UInt32, false),
        Field::new("indices", DataType::new_list(DataType::UInt32, true), true),
        Field::new("values", DataType::new_list(DataType::Float32, true), false),
        Field::new("num_observations", DataType::UInt64, true),
        Field::new("radius", DataType::new_list(DataType::Float32, true), true),
        Field::new("converged", DataType::Boolean, true),
    ]))
}

/// Convert cluster models into one record batch.
pub fn models_to_batch(models: &[ClusterModel]) -> Result<RecordBatch> {
    let mut ids = Int32Builder::with_capacity(models.len());
    let mut dimensions = UInt32Builder::with_capacity(models.len());
    let mut indices = ListBuilder::new(UInt32Builder::new());
    let mut values = ListBuilder::new(Float32Builder::new());
    let mut num_observations = UInt64Builder::with_capacity(models.len());
    let mut radius = ListBuilder::new(Float32Builder::new());
    let mut converged = BooleanBuilder::with_capacity(models.len());

    for model in models {
        let dimension = u32::try_from(model.dimension()).map_err(|_| {
            Error::invalid_input(
                format!(
                    "cluster {} has dimension {}, which does not fit in u32",
                    model.id,
                    model.dimension()
                ),
                location!(),
            )
        })?;
        ids.append_value(model.id);
        dimensions.append_value(dimension);
        match &model.center {
            Vector::Dense(center) => {
                indices.append_null();
                values.values().append_slice(center);
            }
            Vector::Sparse(center) => {
                indices.values().append_slice(center.indices());
                indices.append(true);
                values.values().append_slice(center.values());
            }
        }
        values.append(true);
        num_observations.append_option(model.num_observations);
        match &model.radius {
            Some(r) => {
                radius.values().append_slice(r);
                radius.append(true);
            }
            None => radius.append_null(),
        }
        converged.append_option(model.converged);
    }

    let columns: Vec<ArrayRef> = vec![
        Arc::new(ids.finish()),
        Arc::new(dimensions.finish()),
        Arc::new(indices.finish()),
        Arc::new(values.finish()),
        Arc::new(num_observations.finish()),
        Arc::new(radius.finish()),
        Arc::new(converged.finish()),
    ];
    Ok(RecordBatch::try_new(models_arrow_schema(), columns)?)
}

fn column<'a>(batch: &'a RecordBatch, name: &str, path: &Path) -> Result<&'a ArrayRef> {
    batch.column_by_name(name).ok_or_else(|| {
        Error::corrupt_file(
            path.clone(),
            format!("missing column '{name}' in cluster model file"),
            location!(),
        )
    })
}

fn wrong_type(path: &Path, name: &str, array: &ArrayRef) -> Error {
    Error::corrupt_file(
        path.clone(),
        format!(
            "column '{name}' has type {}, which is not valid for a cluster model file",
            array.data_type()
        ),
        location!(),
    )
}

/// Read the `f32` values of row `row` of a list column.
fn list_values(
    path: &Path,
    name: &str,
    list: &arrow_array::ListArray,
    row: usize,
) -> Result<Vec<f32>> {
    let values = list.value(row);
    let values = values
        .as_primitive_opt::<Float32Type>()
        .ok_or_else(|| wrong_type(path, name, &values))?;
    if values.null_count() > 0 {
        return Err(Error::corrupt_file(
            path.clone(),
            format!("null values are not allowed in column '{name}'"),
            location!(),
        ));
    }
    Ok(values.values().to_vec())
}

/// Decode the cluster models of a record batch.
///
/// `path` is the file the batch was read from, and is only used to report
/// errors.
pub fn batch_to_models(batch: &RecordBatch, path: &Path) -> Result<Vec<ClusterModel>> {
    let ids_col = column(batch, "id", path)?;
    let ids = ids_col
        .as_primitive_opt::<Int32Type>()
        .ok_or_else(|| wrong_type(path, "id", ids_col))?;
    let dims_col = column(batch, "dimension", path)?;
    let dimensions = dims_col
        .as_primitive_opt::<UInt32Type>()
        .ok_or_else(|| wrong_type(path, "dimension", dims_col))?;
    let indices_col = column(batch, "indices", path)?;
    let indices = indices_col
        .as_list_opt::<i32>()
        .ok_or_else(|| wrong_type(path, "indices", indices_col))?;
    let values_col = column(batch, "values", path)?;
    let values = values_col
        .as_list_opt::<i32>()
        .ok_or_else(|| wrong_type(path, "values", values_col))?;

    let num_observations = match batch.column_by_name("num_observations") {
        Some(col) => Some(
            col.as_primitive_opt::<UInt64Type>()
                .ok_or_else(|| wrong_type(path, "num_observations", col))?,
        ),
        None => None,
    };
    let radius = match batch.column_by_name("radius") {
        Some(col) => Some(
            col.as_list_opt::<i32>()
                .ok_or_else(|| wrong_type(path, "radius", col))?,
        ),
        None => None,
    };
    let converged = match batch.column_by_name("converged") {
        Some(col) => Some(
            col.as_boolean_opt()
                .ok_or_else(|| wrong_type(path, "converged", col))?,
        ),
        None => None,
    };

    let mut models = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        if ids.is_null(row) || dimensions.is_null(row) || values.is_null(row) {
            return Err(Error::corrupt_file(
                path.clone(),
                format!("row {row} has a null id, dimension or values"),
                location!(),
            ));
        }
        let id = ids.value(row);
        let dimension = dimensions.value(row) as usize;
        let center_values = list_values(path, "values", values, row)?;
        let center = if indices.is_null(row) {
            if center_values.len() != dimension {
                return Err(Error::corrupt_file(
                    path.clone(),
                    format!(
                        "cluster {id} declares dimension {dimension} but stores {} dense values",
                        center_values.len()
                    ),
                    location!(),
                ));
            }
            Vector::dense(center_values)
        } else {
            let row_indices = indices.value(row);
            let row_indices = row_indices
                .as_primitive_opt::<UInt32Type>()
                .ok_or_else(|| wrong_type(path, "indices", indices_col))?;
            if row_indices.null_count() > 0 {
                return Err(Error::corrupt_file(
                    path.clone(),
                    "null values are not allowed in column 'indices'",
                    location!(),
                ));
            }
            Vector::sparse(dimension, row_indices.values().to_vec(), center_values).map_err(
                |e| Error::corrupt_file(path.clone(), format!("cluster {id}: {e}"), location!()),
            )?
        };

        let mut model = ClusterModel::new(id, center);
        model.num_observations = num_observations
            .filter(|col| col.is_valid(row))
            .map(|col| col.value(row));
        model.radius = match radius.filter(|col| col.is_valid(row)) {
            Some(col) => Some(list_values(path, "radius", col, row)?),
            None => None,
        };
        model.converged = converged
            .filter(|col| col.is_valid(row))
            .map(|col| col.value(row));
        models.push(model);
    }
    Ok(models)
}

/// Encode record batches as an Arrow IPC file.
pub(crate) fn encode_ipc(schema: &Schema, batches: &[RecordBatch]) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();
    let write_options =
        IpcWriteOptions::default().try_with_compression(Some(CompressionType::ZSTD))?;
    {
        let mut writer = ArrowFileWriter::try_new_with_options(&mut out, schema, write_options)?;
        for batch in batches {
            writer.write(batch)?;
        }
        writer.finish()?;
    }
    Ok(out)
}

/// Read every record batch of the Arrow IPC file at `path`.
pub(crate) async fn read_ipc(store: &ObjectStore, path: &Path) -> Result<Vec<RecordBatch>> {
    let data = store.read(path).await?;
    let data = std::io::Cursor::new(data);
    ArrowFileReader::try_new(data, None)
        .and_then(|reader| reader.collect::<std::result::Result<Vec<_>, ArrowError>>())
        .map_err(box_error)
        .context(CorruptFileSnafu {
            path: path.clone(),
            location: location!(),
        })
}

/// Write `models` as one part file of the snapshot at `dir`.
pub async fn write_part(
    store: &ObjectStore,
    dir: &Path,
    part: usize,
    models: &[ClusterModel],
) -> Result<Path> {
    let path = dir.child(part_file_name(part));
    let batch = models_to_batch(models)?;
    let data = encode_ipc(batch.schema().as_ref(), &[batch])?;
    store.put(&path, data).await?;
    debug!("Wrote {} cluster models to {}", models.len(), path);
    Ok(path)
}

/// Write `models` as a snapshot split in `num_parts` part files.
///
/// Models keep their order: reading the snapshot back yields the same
/// sequence.
pub async fn write_snapshot(
    store: &ObjectStore,
    dir: &Path,
    models: &[ClusterModel],
    num_parts: usize,
) -> Result<Vec<Path>> {
    let num_parts = num_parts.max(1);
    let chunk_size = models.len().div_ceil(num_parts).max(1);
    let mut paths = Vec::with_capacity(num_parts);
    for part in 0..num_parts {
        let start = (part * chunk_size).min(models.len());
        let end = ((part + 1) * chunk_size).min(models.len());
        paths.push(write_part(store, dir, part, &models[start..end]).await?);
    }
    Ok(paths)
}

/// Part files of the directory `dir`, in name order.
///
/// A directory without any part file is reported as [`Error::NotFound`].
pub async fn list_part_files(store: &ObjectStore, dir: &Path) -> Result<Vec<Path>> {
    let parts = store
        .list_files(dir)
        .await?
        .into_iter()
        .map(|meta| meta.location)
        .filter(is_part_file)
        .collect::<Vec<_>>();
    if parts.is_empty() {
        return Err(Error::NotFound {
            uri: format!("{}/{}*{}", dir, PART_PREFIX, PART_SUFFIX),
            location: location!(),
        });
    }
    Ok(parts)
}

/// Read the cluster models stored in one part file.
pub async fn read_part(store: &ObjectStore, path: &Path) -> Result<Vec<ClusterModel>> {
    let batches = read_ipc(store, path).await?;
    let mut models = Vec::new();
    for batch in batches.iter() {
        models.extend(batch_to_models(batch, path)?);
    }
    Ok(models)
}

/// Rebuild the model set of the snapshot at `dir`.
///
/// Part files are read in name order, and rows in file order.
#[instrument(level = "debug", skip(store))]
pub async fn load_model_set(store: &ObjectStore, dir: &Path) -> Result<ClusterModelSet> {
    let mut models = Vec::new();
    for path in list_part_files(store, dir).await? {
        models.extend(read_part(store, &path).await?);
    }
    if models.is_empty() {
        return Err(Error::EmptyModelSet {
            uri: dir.to_string(),
            location: location!(),
        });
    }
    ClusterModelSet::try_new(models)
}

/// Read the clustering policy of the snapshot at `dir`.
///
/// Without a policy file, the k-means policy with default parameters is used.
pub async fn read_policy_config(store: &ObjectStore, dir: &Path) -> Result<PolicyConfig> {
    let path = dir.child(POLICY_FILE);
    match store.read(&path).await {
        Ok(data) => serde_json::from_slice(&data)
            .map_err(box_error)
            .context(CorruptFileSnafu {
                path,
                location: location!(),
            }),
        Err(Error::NotFound { .. }) => Ok(PolicyConfig::default()),
        Err(e) => Err(e),
    }
}

pub async fn write_policy_config(
    store: &ObjectStore,
    dir: &Path,
    config: &PolicyConfig,
) -> Result<()> {
    let data = serde_json::to_vec(config)?;
    store.put(&dir.child(POLICY_FILE), data).await
}
