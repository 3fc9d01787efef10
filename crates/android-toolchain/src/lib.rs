//! Android Toolchain Management
//!
//! Handles resolution and description of:
//! - JDK, Android SDK, Android NDK, Gradle and bundletool locations
//! - Compiler flags and linker policies per architecture
//! - The memoized (architecture, role) toolchain registry

pub mod compiler;
pub mod detector;
pub mod env;
pub mod linker;
pub mod ndk;
pub mod registry;

pub use compiler::{CodeGen, CompilerSettings};
pub use detector::{is_valid_dir, ExternalToolConfig, ToolResolver};
pub use env::ToolEnvironment;
pub use linker::{
    ArtifactKind, BuildArtifact, FormatKind, LinkMode, LinkPlan, Linker, LinkerPolicy, NativeProgramFormat,
    ENTRY_LIBRARY,
};
pub use ndk::{AndroidNdk, NdkLocation, PLACEHOLDER_NDK_ROOT};
pub use registry::{AndroidToolchain, TargetPlan, TargetRole, ToolchainKey, ToolchainRegistry};

/// Toolchain errors
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    /// A tool the current operation needs is not configured
    #[error("{0}")]
    NotFound(String),

    #[error("Unsupported configuration: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ToolchainError> for apkforge_core::ForgeError {
    fn from(err: ToolchainError) -> Self {
        match err {
            ToolchainError::NotFound(msg) => apkforge_core::ForgeError::Configuration(msg),
            ToolchainError::Unsupported(msg) => apkforge_core::ForgeError::UnsupportedConfiguration(msg),
            ToolchainError::Io(e) => apkforge_core::ForgeError::Io(e),
        }
    }
}
