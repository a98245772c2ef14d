use std::io;

use thiserror::Error;

use crate::{BucketFunctionError, ValidationError};

/// Errors that can occur while creating metrics.
#[derive(Debug, Error)]
pub enum Error {
    /// The metric name or tags were rejected in strict mode.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A bucket function definition could not be parsed.
    #[error(transparent)]
    BucketFunction(#[from] BucketFunctionError),

    /// The background runtime driving recurring work could not be started.
    #[error("failed to start background scheduler: {0}")]
    Scheduler(#[from] io::Error),
}
