// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

use arrow_schema::ArrowError;
use snafu::{location, Location, Snafu};

type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Allocates error on the heap and then places `e` into it.
#[inline]
pub fn box_error(e: impl std::error::Error + Send + Sync + 'static) -> BoxedError {
    Box::new(e)
}

/// How a failure should be treated by the job that observed it.
///
/// * `Configuration`: the job cannot run as configured. Never retried.
/// * `Data`: a single record is malformed. The owning task may be retried,
///   but a deterministic failure eventually fails the job.
/// * `Infrastructure`: I/O or worker failures. Retried by the task runner.
/// * `Cancelled`: the caller aborted the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Data,
    Infrastructure,
    Cancelled,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("Invalid user input: {source}, {location}"))]
    InvalidInput {
        source: BoxedError,
        location: Location,
    },
    #[snafu(display("Distance measure '{name}' is not registered, {location}"))]
    UnknownDistanceMeasure { name: String, location: Location },
    #[snafu(display("Not found: {uri}, {location}"))]
    NotFound { uri: String, location: Location },
    #[snafu(display("Encountered corrupt file {path}: {source}, {location}"))]
    CorruptFile {
        path: object_store::path::Path,
        source: BoxedError,
        location: Location,
    },
    #[snafu(display("Cluster model snapshot at {uri} holds no models, {location}"))]
    EmptyModelSet { uri: String, location: Location },
    #[snafu(display("Inconsistent cluster model set: {message}, {location}"))]
    InconsistentModelSet { message: String, location: Location },
    #[snafu(display(
        "Vector dimension mismatch: expected {expected}, got {actual}, {location}"
    ))]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        location: Location,
    },
    #[snafu(display("Invalid vector: {message}, {location}"))]
    InvalidVector { message: String, location: Location },
    #[snafu(display("Failed to process cluster {id}: {source}"))]
    Record { id: i32, source: Box<Error> },
    #[snafu(display("ElkanError(Arrow): {message}, {location}"))]
    Arrow { message: String, location: Location },
    #[snafu(display("ElkanError(IO): {source}, {location}"))]
    IO {
        source: BoxedError,
        location: Location,
    },
    #[snafu(display("Task {task} failed after {attempts} attempt(s): {source}"))]
    TaskFailed {
        task: usize,
        attempts: u32,
        source: Box<Error>,
    },
    #[snafu(display("Job was cancelled, {location}"))]
    Cancelled { location: Location },
    #[snafu(display("Encountered internal error. {message}, {location}"))]
    Internal { message: String, location: Location },
}

impl Error {
    pub fn invalid_input(message: impl Into<String>, location: Location) -> Self {
        let message: String = message.into();
        Self::InvalidInput {
            source: message.into(),
            location,
        }
    }

    pub fn corrupt_file(
        path: object_store::path::Path,
        message: impl Into<String>,
        location: Location,
    ) -> Self {
        let message: String = message.into();
        Self::CorruptFile {
            path,
            source: message.into(),
            location,
        }
    }

    pub fn io(message: impl Into<String>, location: Location) -> Self {
        let message: String = message.into();
        Self::IO {
            source: message.into(),
            location,
        }
    }

    pub fn internal(message: impl Into<String>, location: Location) -> Self {
        Self::Internal {
            message: message.into(),
            location,
        }
    }

    /// Attach the id of the cluster record being processed.
    pub fn for_record(self, id: i32) -> Self {
        Self::Record {
            id,
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput { .. }
            | Self::UnknownDistanceMeasure { .. }
            | Self::NotFound { .. }
            | Self::CorruptFile { .. }
            | Self::EmptyModelSet { .. }
            | Self::InconsistentModelSet { .. } => ErrorKind::Configuration,
            Self::DimensionMismatch { .. } | Self::InvalidVector { .. } => ErrorKind::Data,
            Self::Record { source, .. } | Self::TaskFailed { source, .. } => source.kind(),
            Self::Arrow { .. } | Self::IO { .. } | Self::Internal { .. } => {
                ErrorKind::Infrastructure
            }
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Whether re-executing the failed work may succeed, or at least is allowed to be tried.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Data | ErrorKind::Infrastructure)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<ArrowError> for Error {
    #[track_caller]
    fn from(e: ArrowError) -> Self {
        Self::Arrow {
            message: e.to_string(),
            location: location!(),
        }
    }
}

impl From<std::io::Error> for Error {
    #[track_caller]
    fn from(e: std::io::Error) -> Self {
        Self::IO {
            source: box_error(e),
            location: location!(),
        }
    }
}

impl From<object_store::Error> for Error {
    #[track_caller]
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { path, .. } => Self::NotFound {
                uri: path,
                location: location!(),
            },
            _ => Self::IO {
                source: box_error(e),
                location: location!(),
            },
        }
    }
}

impl From<Error> for object_store::Error {
    fn from(err: Error) -> Self {
        Self::Generic {
            store: "elkan",
            source: Box::new(err),
        }
    }
}

impl From<object_store::path::Error> for Error {
    #[track_caller]
    fn from(e: object_store::path::Error) -> Self {
        Self::InvalidInput {
            source: box_error(e),
            location: location!(),
        }
    }
}

impl From<url::ParseError> for Error {
    #[track_caller]
    fn from(e: url::ParseError) -> Self {
        Self::InvalidInput {
            source: box_error(e),
            location: location!(),
        }
    }
}

impl From<serde_json::Error> for Error {
    #[track_caller]
    fn from(e: serde_json::Error) -> Self {
        use serde_json::error::Category;
        match e.classify() {
            Category::Io => std::io::Error::from(e).into(),
            Category::Data | Category::Syntax | Category::Eof => Self::InvalidInput {
                source: box_error(e),
                location: location!(),
            },
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    #[track_caller]
    fn from(e: tokio::task::JoinError) -> Self {
        Self::IO {
            source: box_error(e),
            location: location!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let err = Error::invalid_input("bad measure", location!());
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.is_retryable());

        let err = Error::DimensionMismatch {
            expected: 2,
            actual: 3,
            location: location!(),
        };
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(err.is_retryable());

        let err = Error::io("connection reset", location!());
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert!(err.is_retryable());

        let err = Error::Cancelled {
            location: location!(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_wrapped_error_keeps_kind() {
        let err = Error::DimensionMismatch {
            expected: 2,
            actual: 3,
            location: location!(),
        }
        .for_record(7);
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(err.to_string().contains("cluster 7"));

        let err = Error::TaskFailed {
            task: 1,
            attempts: 3,
            source: Box::new(Error::EmptyModelSet {
                uri: "memory:///prior".to_string(),
                location: location!(),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("3 attempt(s)"));
    }

    #[test]
    fn test_object_store_not_found() {
        let err: Error = object_store::Error::NotFound {
            path: "prior/part-00000.arrow".to_string(),
            source: "missing".into(),
        }
        .into();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
