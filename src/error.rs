use std::path::PathBuf;
use thiserror::Error;

use crate::tensor::Task;

/// The main error type for yolopost operations.
///
/// Per-frame numeric anomalies never surface here; they are dropped
/// candidates. Errors are reserved for configuration mistakes and broken
/// caller contracts.
#[derive(Debug, Error)]
pub enum YoloError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{task} output shape {shape:?} does not match {expected} features per anchor")]
    ShapeMismatch {
        task: Task,
        shape: Vec<usize>,
        expected: usize,
    },

    #[error("prototype shape {shape:?} does not carry {coefficients} mask channels")]
    PrototypeShape {
        shape: Vec<usize>,
        coefficients: usize,
    },

    #[error("segment task requires a prototype tensor")]
    MissingPrototypes,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid frame context: {0}")]
    InvalidFrame(String),

    #[error("tensor buffer holds {actual} values but its shape {shape:?} needs {expected}")]
    BufferLength {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("Result failed validation: {0}")]
    InvalidResult(String),

    #[error("Failed to parse JSON from {path}: {source}")]
    JsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write JSON to {path}: {source}")]
    JsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse YAML from {path}: {source}")]
    YamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}
