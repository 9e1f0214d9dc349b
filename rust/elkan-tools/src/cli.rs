// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use std::collections::HashMap;

use clap::{Args, Parser, Subcommand};
use elkan_clustering::params::{
    DISTANCE_MEASURE_KEY, MAX_TASK_ATTEMPTS_KEY, OVERWRITE_KEY, PARALLELISM_KEY, PRIOR_PATH_KEY,
};
use elkan_core::Result;

#[derive(Parser, Debug)]
#[command(
    name = "elkan-tools",
    about = "Compute and inspect centroid distance matrices for Elkan k-means",
    version
)]
pub struct ElkanToolsArgs {
    /// Subcommand to run
    #[command(subcommand)]
    command: ElkanToolsCommand,
}

#[derive(Subcommand, Debug)]
pub enum ElkanToolsCommand {
    /// Compute the distance matrix between input clusters and prior cluster models.
    Distances(DistancesArgs),
    /// Display the cluster models of a snapshot.
    Models(SourceArgs),
    /// Display a committed distance matrix.
    Matrix(SourceArgs),
    /// List the registered distance measures.
    Measures,
}

#[derive(Args, Debug)]
pub struct DistancesArgs {
    /// Directory of the input cluster records.
    #[arg(short = 'i', long, value_name = "input")]
    pub(crate) input: String,

    /// Directory the distance matrix is written to.
    #[arg(short = 'o', long, value_name = "output")]
    pub(crate) output: String,

    /// Snapshot of the prior round's cluster models.
    #[arg(short = 'p', long, value_name = "prior")]
    pub(crate) prior: String,

    /// Distance measure name.
    #[arg(short = 'm', long, value_name = "measure")]
    pub(crate) measure: Option<String>,

    /// Maximum number of concurrent tasks.
    #[arg(long)]
    pub(crate) parallelism: Option<usize>,

    /// Attempts granted to each task.
    #[arg(long)]
    pub(crate) max_attempts: Option<u32>,

    /// Replace a previously committed output.
    #[arg(long, default_value_t = false)]
    pub(crate) overwrite: bool,
}

impl DistancesArgs {
    /// Job options, in the form accepted by the job configuration.
    pub fn to_options(&self) -> HashMap<String, String> {
        let mut options = HashMap::from([
            (PRIOR_PATH_KEY.to_string(), self.prior.clone()),
            (OVERWRITE_KEY.to_string(), self.overwrite.to_string()),
        ]);
        if let Some(measure) = &self.measure {
            options.insert(DISTANCE_MEASURE_KEY.to_string(), measure.clone());
        }
        if let Some(parallelism) = self.parallelism {
            options.insert(PARALLELISM_KEY.to_string(), parallelism.to_string());
        }
        if let Some(attempts) = self.max_attempts {
            options.insert(MAX_TASK_ATTEMPTS_KEY.to_string(), attempts.to_string());
        }
        options
    }
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    // The directory to examine.
    #[arg(short = 's', long, value_name = "source")]
    pub(crate) source: String,
}

impl ElkanToolsArgs {
    /// Run the command, returning the process exit status.
    pub async fn run(&self, mut writer: impl std::io::Write) -> i32 {
        let result: Result<()> = match &self.command {
            ElkanToolsCommand::Distances(args) => {
                return elkan_clustering::run_async(&args.input, &args.output, &args.to_options())
                    .await;
            }
            ElkanToolsCommand::Models(args) => crate::show::show_models(&mut writer, args).await,
            ElkanToolsCommand::Matrix(args) => crate::show::show_matrix(&mut writer, args).await,
            ElkanToolsCommand::Measures => crate::show::list_measures(&mut writer),
        };
        match result {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{}", e);
                1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_distances() {
        let args = ElkanToolsArgs::try_parse_from([
            "elkan-tools",
            "distances",
            "--input",
            "/in",
            "--output",
            "/out",
            "--prior",
            "/prior",
            "--measure",
            "cosine",
            "--parallelism",
            "4",
            "--overwrite",
        ])
        .unwrap();
        let ElkanToolsCommand::Distances(distances) = args.command else {
            panic!("expected the distances command");
        };
        let options = distances.to_options();
        assert_eq!(options[PRIOR_PATH_KEY], "/prior");
        assert_eq!(options[DISTANCE_MEASURE_KEY], "cosine");
        assert_eq!(options[PARALLELISM_KEY], "4");
        assert_eq!(options[OVERWRITE_KEY], "true");
        assert!(!options.contains_key(MAX_TASK_ATTEMPTS_KEY));
    }

    #[test]
    fn test_missing_prior() {
        assert!(
            ElkanToolsArgs::try_parse_from(["elkan-tools", "distances", "-i", "a", "-o", "b"])
                .is_err()
        );
    }
}
