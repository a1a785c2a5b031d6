pub mod analysis;
pub mod bio;
pub mod cli;
pub mod index;
pub mod report;
pub mod utils;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LacunaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(
        "required column not found (tried: {}); available columns: {}",
        .wanted.join(", "),
        .found.join(", ")
    )]
    MissingColumn { wanted: Vec<String>, found: Vec<String> },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LacunaError>;
