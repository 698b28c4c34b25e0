use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the pipeline stages
///
/// Stage level emptiness errors are never recovered; they abort the run
/// before anything is reported.
#[derive(Error, Debug)]
pub enum TopicError {
    #[error("corpus source {path:?} is unavailable: {source}")]
    DataUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corpus source could not be decoded: {0}")]
    Decode(String),

    #[error("no non-empty documents remain after filtering")]
    EmptyCorpus,

    #[error("no terms survive the {stage} vocabulary bounds")]
    EmptyVocabulary { stage: &'static str },

    #[error("bag-of-words corpus is empty, nothing to train on")]
    EmptyTrainingSet,

    #[error("worker failed on chunk {chunk} in pass {pass}: {reason}")]
    WorkerFailure {
        chunk: usize,
        pass: usize,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("report artifact could not be written: {0}")]
    Report(#[source] std::io::Error),
}

impl TopicError {
    /// Name of the stage that produced this error
    pub fn stage(&self) -> &'static str {
        match self {
            TopicError::DataUnavailable { .. } | TopicError::Decode(_) | TopicError::EmptyCorpus => "loader",
            TopicError::EmptyVocabulary { stage } => *stage,
            TopicError::EmptyTrainingSet | TopicError::WorkerFailure { .. } => "lda",
            TopicError::InvalidConfig(_) => "config",
            TopicError::Report(_) => "report",
        }
    }
}

pub type Result<T> = std::result::Result<T, TopicError>;
