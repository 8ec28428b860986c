use thiserror::Error;

#[derive(Error, Debug)]
pub enum CartError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
    /// The payment processor refused the cart. The cart keeps its status.
    #[error("Checkout validation failed: {0}")]
    CheckoutValidation(String),
    /// A processor record or its configuration cannot be turned into an instance.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    /// The payment gateway failed, rejected the request or timed out.
    #[error("Processing error: {0}")]
    ProcessingError(String),
    #[error("Pipeline error: {0}")]
    PipelineError(String),
    /// A command is missing a field it needs.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Reconciliation error: {0}")]
    ReconciliationError(String),
}

pub type Result<T> = std::result::Result<T, CartError>;

impl From<crate::domain::gateway::GatewayError> for CartError {
    fn from(e: crate::domain::gateway::GatewayError) -> Self {
        CartError::ProcessingError(e.to_string())
    }
}
