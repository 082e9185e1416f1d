use thiserror::Error;

pub type Result<T> = std::result::Result<T, RerankError>;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("No training instances")]
    EmptyTrainingSet,

    #[error("Label {label} out of range for {candidates} candidates")]
    LabelOutOfRange { label: usize, candidates: usize },

    #[error("Candidate count mismatch: {candidates} candidates, {slices} feature slices")]
    CandidateCountMismatch { candidates: usize, slices: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] gridlocate_core::Error),
}
