//! Load balancer error types

use converge_engine::{EngineError, ErrorKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ElbError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to parse observed state: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ElbError {
    /// Engine error kind, when this came from the engine
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ElbError::Engine(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// Id of the resource the engine error concerns, when known
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            ElbError::Engine(e) => e.resource_id(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ElbError>;
