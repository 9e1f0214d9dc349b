// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use std::collections::HashMap;

use elkan_core::utils::parse::{env_option, parse_bool_option, parse_option};
use elkan_core::{Error, Result};
use log::warn;
use snafu::location;

pub const DISTANCE_MEASURE_KEY: &str = "distance_measure";
pub const PRIOR_PATH_KEY: &str = "prior_path";
pub const PARALLELISM_KEY: &str = "parallelism";
pub const MAX_TASK_ATTEMPTS_KEY: &str = "max_task_attempts";
pub const SNAPSHOT_LOAD_RETRIES_KEY: &str = "snapshot_load_retries";
pub const OVERWRITE_KEY: &str = "overwrite";

pub const PARALLELISM_ENV: &str = "ELKAN_PARALLELISM";
pub const MAX_TASK_ATTEMPTS_ENV: &str = "ELKAN_MAX_TASK_ATTEMPTS";

pub const DEFAULT_DISTANCE_MEASURE: &str = "euclidean";
pub const DEFAULT_MAX_TASK_ATTEMPTS: u32 = 4;
pub const DEFAULT_SNAPSHOT_LOAD_RETRIES: u32 = 3;

/// Parameters of the centroid distance step.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceStepParams {
    /// Name of the distance measure, resolved through the measure registry.
    pub distance_measure: String,
    /// Location of the prior round's cluster model snapshot.
    pub prior_path: String,
    /// Maximum number of tasks running at the same time.
    pub parallelism: usize,
    /// Attempts granted to each task before the job fails.
    pub max_task_attempts: u32,
    /// Attempts granted to each snapshot load.
    pub snapshot_load_retries: u32,
    /// Replace the output of a previous successful run.
    pub overwrite: bool,
}

impl Default for DistanceStepParams {
    fn default() -> Self {
        Self {
            distance_measure: DEFAULT_DISTANCE_MEASURE.to_string(),
            prior_path: String::new(),
            parallelism: num_cpus::get(),
            max_task_attempts: DEFAULT_MAX_TASK_ATTEMPTS,
            snapshot_load_retries: DEFAULT_SNAPSHOT_LOAD_RETRIES,
            overwrite: false,
        }
    }
}

impl DistanceStepParams {
    pub fn new(prior_path: impl Into<String>) -> Self {
        Self {
            prior_path: prior_path.into(),
            ..Default::default()
        }
    }

    pub fn with_distance_measure(mut self, name: impl Into<String>) -> Self {
        self.distance_measure = name.into();
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_max_task_attempts(mut self, attempts: u32) -> Self {
        self.max_task_attempts = attempts;
        self
    }

    pub fn with_snapshot_load_retries(mut self, retries: u32) -> Self {
        self.snapshot_load_retries = retries;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Build parameters from a string option map.
    ///
    /// `parallelism` and `max_task_attempts` fall back to the
    /// `ELKAN_PARALLELISM` and `ELKAN_MAX_TASK_ATTEMPTS` environment
    /// variables when absent from `options`. Keys are case-insensitive.
    /// Unknown keys are ignored.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self> {
        let mut params = Self::default();
        let mut parallelism = env_option::<usize>(PARALLELISM_ENV)?;
        let mut max_task_attempts = env_option::<u32>(MAX_TASK_ATTEMPTS_ENV)?;

        for (key, value) in options {
            match key.to_ascii_lowercase().as_str() {
                DISTANCE_MEASURE_KEY => params.distance_measure = value.trim().to_string(),
                PRIOR_PATH_KEY => params.prior_path = value.trim().to_string(),
                PARALLELISM_KEY => parallelism = Some(parse_option(key, value)?),
                MAX_TASK_ATTEMPTS_KEY => max_task_attempts = Some(parse_option(key, value)?),
                SNAPSHOT_LOAD_RETRIES_KEY => {
                    params.snapshot_load_retries = parse_option(key, value)?
                }
                OVERWRITE_KEY => params.overwrite = parse_bool_option(key, value)?,
                _ => warn!("Ignoring unknown distance step option '{}'", key),
            }
        }
        if let Some(parallelism) = parallelism {
            params.parallelism = parallelism;
        }
        if let Some(max_task_attempts) = max_task_attempts {
            params.max_task_attempts = max_task_attempts;
        }
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prior_path.is_empty() {
            return Err(Error::invalid_input(
                format!("option '{PRIOR_PATH_KEY}' is required"),
                location!(),
            ));
        }
        if self.distance_measure.is_empty() {
            return Err(Error::invalid_input(
                format!("option '{DISTANCE_MEASURE_KEY}' must not be empty"),
                location!(),
            ));
        }
        if self.parallelism == 0 {
            return Err(Error::invalid_input(
                format!("option '{PARALLELISM_KEY}' must be at least 1"),
                location!(),
            ));
        }
        if self.max_task_attempts == 0 || self.snapshot_load_retries == 0 {
            return Err(Error::invalid_input(
                format!(
                    "options '{MAX_TASK_ATTEMPTS_KEY}' and '{SNAPSHOT_LOAD_RETRIES_KEY}' must be at least 1"
                ),
                location!(),
            ));
        }
        Ok(())
    }
}
