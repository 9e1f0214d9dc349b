// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Distance matrix files.
//!
//! The job output is a directory of Arrow IPC part files with the schema
//! `id: Int32, distances: FixedSizeList<Float32, K>`, plus a `_SUCCESS`
//! marker written once every part file is in place. The marker holds a JSON
//! [`CommitManifest`] naming the part files of the committed matrix.

use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::{Float32Type, Int32Type};
use arrow_array::{Array, ArrayRef, FixedSizeListArray, Float32Array, Int32Array, RecordBatch};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use elkan_core::io::ObjectStore;
use elkan_core::{Error, Result, SUCCESS_MARKER};
use object_store::path::Path;
use serde::{Deserialize, Serialize};
use snafu::location;

use crate::compute::DistanceVector;
use crate::snapshot::{encode_ipc, list_part_files, read_ipc};

/// Get the Arrow schema of a distance matrix file with `k` models.
pub fn distance_matrix_schema(k: usize) -> Result<SchemaRef> {
    let size = i32::try_from(k).map_err(|_| {
        Error::invalid_input(format!("{k} cluster models is too many"), location!())
    })?;
    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int32, false),
        Field::new(
            "distances",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), size),
            false,
        ),
    ])))
}

/// Encode distance rows of `k` values each as an Arrow IPC file.
pub fn encode_distance_rows(rows: &[(i32, DistanceVector)], k: usize) -> Result<Vec<u8>> {
    let schema = distance_matrix_schema(k)?;
    if let Some((id, distances)) = rows.iter().find(|(_, d)| d.len() != k) {
        return Err(Error::internal(
            format!(
                "distance vector of cluster {id} has {} values, expected {k}",
                distances.len()
            ),
            location!(),
        ));
    }
    let ids = Int32Array::from_iter_values(rows.iter().map(|(id, _)| *id));
    let values = Float32Array::from_iter_values(rows.iter().flat_map(|(_, d)| d.iter().copied()));
    let DataType::FixedSizeList(item, size) = schema.field(1).data_type() else {
        return Err(Error::internal("unexpected distance schema", location!()));
    };
    let distances = FixedSizeListArray::try_new(item.clone(), *size, Arc::new(values), None)?;
    let columns: Vec<ArrayRef> = vec![Arc::new(ids), Arc::new(distances)];
    let batch = RecordBatch::try_new(schema.clone(), columns)?;
    encode_ipc(schema.as_ref(), &[batch])
}

/// Decode the rows of one distance matrix batch.
fn batch_to_rows(batch: &RecordBatch, path: &Path) -> Result<(usize, Vec<(i32, DistanceVector)>)> {
    let corrupt = |message: String| Error::corrupt_file(path.clone(), message, location!());
    let ids = batch
        .column_by_name("id")
        .and_then(|col| col.as_primitive_opt::<Int32Type>())
        .ok_or_else(|| corrupt("expected an Int32 'id' column".to_string()))?;
    let distances = batch
        .column_by_name("distances")
        .and_then(|col| col.as_fixed_size_list_opt())
        .ok_or_else(|| corrupt("expected a FixedSizeList 'distances' column".to_string()))?;
    let values = distances
        .values()
        .as_primitive_opt::<Float32Type>()
        .ok_or_else(|| corrupt("distances must be Float32".to_string()))?;
    if ids.null_count() > 0 || distances.null_count() > 0 || values.null_count() > 0 {
        return Err(corrupt("null values are not allowed in distance files".to_string()));
    }

    let k = distances.value_length() as usize;
    let rows = ids
        .values()
        .iter()
        .zip(values.values().chunks_exact(k.max(1)))
        .map(|(id, d)| (*id, d.to_vec()))
        .collect();
    Ok((k, rows))
}

/// A committed centroid distance matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    k: usize,
    rows: Vec<(i32, DistanceVector)>,
}

impl DistanceMatrix {
    /// Number of values in each row.
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows sorted by cluster id.
    pub fn rows(&self) -> &[(i32, DistanceVector)] {
        &self.rows
    }

    /// Distance vector of the cluster `id`.
    pub fn get(&self, id: i32) -> Option<&[f32]> {
        self.rows
            .binary_search_by_key(&id, |(row_id, _)| *row_id)
            .ok()
            .map(|pos| self.rows[pos].1.as_slice())
    }

    pub fn into_rows(self) -> Vec<(i32, DistanceVector)> {
        self.rows
    }
}

/// Content of the `_SUCCESS` marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitManifest {
    pub job_id: String,
    /// File names of the committed part files, relative to the output
    /// directory.
    pub parts: Vec<String>,
}

impl CommitManifest {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn parse(data: &[u8], path: &Path) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| {
            Error::corrupt_file(
                path.clone(),
                format!("invalid commit manifest: {e}"),
                location!(),
            )
        })
    }
}

/// Read the distance matrix committed at `dir`.
///
/// Fails with [`Error::NotFound`] if `dir` does not hold a committed
/// output, i.e. has no `_SUCCESS` marker. Only the part files named by the
/// marker are read. An empty marker commits every part file of `dir`.
pub async fn read_distance_matrix(store: &ObjectStore, dir: &Path) -> Result<DistanceMatrix> {
    let marker = dir.child(SUCCESS_MARKER);
    if !store.exists(&marker).await? {
        return Err(Error::NotFound {
            uri: marker.to_string(),
            location: location!(),
        });
    }
    let data = store.read(&marker).await?;
    let parts = if data.is_empty() {
        list_part_files(store, dir).await?
    } else {
        CommitManifest::parse(&data, &marker)?
            .parts
            .iter()
            .map(|name| dir.child(name.as_str()))
            .collect()
    };

    let mut k = None;
    let mut rows = Vec::new();
    for path in parts {
        for batch in read_ipc(store, &path).await? {
            let (batch_k, batch_rows) = batch_to_rows(&batch, &path)?;
            match k {
                Some(k) if k != batch_k => {
                    return Err(Error::corrupt_file(
                        path,
                        format!("rows hold {batch_k} distances, other files hold {k}"),
                        location!(),
                    ));
                }
                _ => k = Some(batch_k),
            }
            rows.extend(batch_rows);
        }
    }
    rows.sort_by_key(|(id, _)| *id);
    Ok(DistanceMatrix {
        k: k.unwrap_or(0),
        rows,
    })
}
