// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Shared error types, storage access and utilities for the Elkan
//! centroid distance step.

pub mod error;
pub mod io;
pub mod utils;

pub use error::{Error, ErrorKind, Result};

/// File written last into a committed output directory.
pub const SUCCESS_MARKER: &str = "_SUCCESS";
/// Staging directory for task output that has not been committed yet.
pub const TEMPORARY_DIR: &str = "_temporary";
