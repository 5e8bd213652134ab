
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Path not found: {0}")]
    NotFound(String),
    #[error("Table error: {0}")]
    Table(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

// Helper conversions
impl From<config::ConfigError> for IndexError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<arrow::error::ArrowError> for IndexError {
    fn from(e: arrow::error::ArrowError) -> Self { Self::Table(e.to_string()) }
}
impl From<parquet::errors::ParquetError> for IndexError {
    fn from(e: parquet::errors::ParquetError) -> Self { Self::Table(e.to_string()) }
}
