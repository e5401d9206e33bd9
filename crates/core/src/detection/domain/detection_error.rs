use std::path::PathBuf;

use thiserror::Error;

/// Failure to build a detector from its description.
///
/// Always fatal to processor initialization.
#[derive(Error, Debug)]
pub enum CreationError {
    #[error("\"{0}\" is not an implemented detector type")]
    UnknownType(String),
    #[error("required key \"{0}\" is missing")]
    MissingKey(String),
    #[error("incorrect \"{key}\" parameter type, need {expected}")]
    WrongType { key: String, expected: &'static str },
    #[error("invalid \"{key}\" value: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("{resource} was not found by path: {}", path.display())]
    ResourceNotFound {
        resource: &'static str,
        path: PathBuf,
    },
    #[error("loading of {resource} from {} failed: {reason}", path.display())]
    LoadFailed {
        resource: &'static str,
        path: PathBuf,
        reason: String,
    },
}

/// Failure to produce detections for a single image.
///
/// Recoverable at file granularity: the image is skipped and the batch goes on.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("empty image")]
    EmptyImage,
    #[error("incorrect channels count: {0}")]
    UnsupportedChannels(u8),
    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("detection error: {0}")]
    Detection(String),
}
