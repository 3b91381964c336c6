use thiserror::Error;

#[derive(Debug, Error)]
pub enum RatingError {
    #[error("cannot fit classifier: training set is empty")]
    InsufficientData,

    #[error("classifier has not been fitted")]
    NotFitted,

    #[error("malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("feature vector contains a non-finite value")]
    NonFiniteFeature,

    #[error("no daily records in batch")]
    EmptyBatch,
}
