use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Document is not part of the training split: {0}")]
    NotTrainingDocument(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Duplicate grid id: {0}")]
    DuplicateGridId(u16),
}
