use thiserror::Error;

use crate::model::FailureCause;

pub const INVALID_NAME_MESSAGE: &str = "Name must contain only alphanumeric characters.";

/// Failures inside a broker lifecycle call
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("{}", INVALID_NAME_MESSAGE)]
    InvalidName,
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("database {0} already exists")]
    DatabaseExists(String),
    #[error("role {0} already exists")]
    UserExists(String),
    #[error("{0:#}")]
    Database(#[from] anyhow::Error),
}

impl BrokerError {
    pub fn cause(&self) -> FailureCause {
        match self {
            BrokerError::InvalidName => FailureCause::Validation,
            BrokerError::MissingParameter(_) => FailureCause::NotFound,
            BrokerError::DatabaseExists(_) | BrokerError::UserExists(_) => FailureCause::Conflict,
            BrokerError::Database(_) => FailureCause::Infrastructure,
        }
    }
}
