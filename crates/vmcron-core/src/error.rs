use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmcronError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VmcronError {
    /// Short, stable error code for operator-facing output.
    pub fn code(&self) -> &'static str {
        match self {
            VmcronError::Config(_) => "CONFIG_ERROR",
            VmcronError::Validation(_) => "VALIDATION_ERROR",
            VmcronError::UnknownVariant { .. } => "UNKNOWN_VARIANT",
            VmcronError::Serialization(_) => "SERIALIZATION_ERROR",
            VmcronError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, VmcronError>;
