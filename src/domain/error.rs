use thiserror::Error;

/// Replug unified error type
#[derive(Error, Debug)]
pub enum ReplugError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{count} USB Serial devices match; be more specific or use -l to list them")]
    Ambiguous { count: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output error: {0}")]
    Output(String),
}

pub type ReplugResult<T> = Result<T, ReplugError>;
