use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Model has not been fitted yet")]
    NotFitted,

    #[error("Data frame error: {0}")]
    Polars(#[from] PolarsError),

    #[error("YAML configuration error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML configuration error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Plotting error: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, ForecastError>;
