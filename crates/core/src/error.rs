//! Error types for apkforge
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type shared by the apkforge crates
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A required external tool path is missing or invalid at first use
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An external tool failed by the caller's own success criterion.
    /// `output` is the full captured output, kept verbatim.
    #[error("{tool} failed:\n{output}")]
    ToolInvocation { tool: String, output: String },

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias for apkforge operations
pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            ForgeError::Io(e) => format!("File operation failed: {}", e),
            ForgeError::Configuration(msg) => format!("Configuration error: {}", msg),
            // raw tool output is what diagnoses Android toolchain failures
            ForgeError::ToolInvocation { tool, output } => format!("{} failed:\n{}", tool, output),
            ForgeError::UnsupportedConfiguration(msg) => {
                format!("Unsupported configuration (continuing): {}", msg)
            }
            _ => self.to_string(),
        }
    }
}
