use std::path::PathBuf;
use thiserror::Error;

use crate::inventory::InventoryError;
use crate::workflow::{BuildError, WorkflowError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("YAML error: {0}")]
    YamlValue(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Workflow failed: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Process exit code for this error
    ///
    /// Problems with the input files exit with 2, failed runs with 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Workflow(_) | Error::Serialization(_) => 1,
            _ => 2,
        }
    }
}
