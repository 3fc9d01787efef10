//! apkforge Core - settings, errors and process execution
//!
//! This crate holds what every other apkforge crate needs: the typed build
//! settings, the shared error taxonomy and the external process runner.

pub mod arch;
pub mod config;
pub mod error;
pub mod process;

pub use arch::{Architecture, Architectures};
pub use config::{ApiLevels, BuildSettings, ExportSettings, ExternalToolsSettings, TargetType};
pub use error::{ForgeError, Result};
pub use process::{Invocation, ProcessError, ProcessOutput, ProcessRunner, SystemProcessRunner};

/// apkforge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
