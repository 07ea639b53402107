use thiserror::Error;

#[derive(Error, Debug)]
pub enum KpiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid column mapping: {0}")]
    InvalidMapping(String),

    #[error("Invalid promised days: {0} (must be at least 1)")]
    InvalidPromisedDays(u32),
}

pub type Result<T> = std::result::Result<T, KpiError>;
