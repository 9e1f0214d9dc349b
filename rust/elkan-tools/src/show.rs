// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use std::io::Write;

use elkan_clustering::snapshot::load_model_set;
use elkan_clustering::read_distance_matrix;
use elkan_core::io::ObjectStore;
use elkan_core::Result;
use elkan_linalg::DistanceMeasureRegistry;

use crate::cli::SourceArgs;

/// Print K, D and one line per cluster model of a snapshot.
pub async fn show_models(mut writer: impl Write, args: &SourceArgs) -> Result<()> {
    let (store, dir) = ObjectStore::from_uri(&args.source)?;
    let models = load_model_set(&store, &dir).await?;
    writeln!(writer, "K: {}", models.k())?;
    writeln!(writer, "D: {}", models.dimension())?;
    writeln!(writer, "{:>10} {:>10} {:>8} {:>14}", "id", "dimension", "format", "observations")?;
    for model in models.iter() {
        let format = if model.center.is_sparse() {
            "sparse"
        } else {
            "dense"
        };
        let observations = model
            .num_observations
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        writeln!(
            writer,
            "{:>10} {:>10} {:>8} {:>14}",
            model.id,
            model.dimension(),
            format,
            observations
        )?;
    }
    Ok(())
}

/// Print a committed distance matrix, one row per cluster.
pub async fn show_matrix(mut writer: impl Write, args: &SourceArgs) -> Result<()> {
    let (store, dir) = ObjectStore::from_uri(&args.source)?;
    let matrix = read_distance_matrix(&store, &dir).await?;
    writeln!(writer, "K: {}", matrix.k())?;
    writeln!(writer, "Rows: {}", matrix.len())?;
    for (id, distances) in matrix.rows() {
        let distances = distances
            .iter()
            .map(|d| format!("{d:.6}"))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(writer, "{id}: [{distances}]")?;
    }
    Ok(())
}

/// Print the names of the registered distance measures.
pub fn list_measures(mut writer: impl Write) -> Result<()> {
    for name in DistanceMeasureRegistry::default().names() {
        writeln!(writer, "{name}")?;
    }
    Ok(())
}
