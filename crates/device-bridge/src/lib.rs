//! Android Device Bridge
//!
//! Installs, launches and tests packaged apps on an attached device.

pub mod adb;
pub mod bundletool;
pub mod device;
pub mod logcat;
pub mod markers;

pub use adb::{DeviceController, LaunchTarget, DEFAULT_TEST_WAIT};
pub use bundletool::Bundletool;
pub use device::{Device, DeviceState};
pub use logcat::{parse_logs, LogEntry, LogFilter, LogLevel};

use apkforge_core::{ForgeError, ProcessError};

/// Device errors
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// adb, the JDK or bundletool is missing
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A device step failed; `output` is the tool's full output
    #[error("Cannot {action} : {output}")]
    ToolInvocation { action: String, output: String },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl From<DeviceError> for ForgeError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Configuration(msg) => ForgeError::Configuration(msg),
            DeviceError::ToolInvocation { action, output } => ForgeError::ToolInvocation { tool: action, output },
            DeviceError::Process(e) => e.into(),
        }
    }
}
