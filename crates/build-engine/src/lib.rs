//! Android Build Engine
//!
//! Describes everything needed to turn linked native libraries into an
//! Android package: compile and link actions, the synthesized Gradle
//! project, deployment copies and the Gradle invocation itself. The graph
//! is handed to an external engine; nothing here runs a tool.

pub mod deploy;
pub mod graph;
pub mod native;
pub mod package;
pub mod project;

pub use deploy::{native_library_dir, route, DeployKind, Deployable, DeployableFile, TEST_CONFIG_FILE};
pub use graph::{output_is_allowed, Action, ActionKind, BuildGraph, GraphError};
pub use native::{setup_native_program, NativeProgram, ProgramOutput};
pub use package::{
    abi_filters, deploy_complementary, gradle_output, gradle_task, load_libraries, AndroidPackage, PackageContext,
    PackageOutput, PackagingParameters, GRADLE_ALLOWED_OUTPUT,
};
pub use project::{ProjectFile, ProjectFileContent, ProjectTemplate, SynthesizedProject, TemplateTokens};

use std::path::PathBuf;

use apkforge_android_toolchain::ToolchainError;
use apkforge_core::ForgeError;

/// Build errors
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Architecture and role combination nothing knows how to package
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Cannot read template {path:?}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BuildError> for ForgeError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::Configuration(msg) => ForgeError::Configuration(msg),
            BuildError::UnsupportedConfiguration(msg) => ForgeError::UnsupportedConfiguration(msg),
            BuildError::InvalidState(msg) => ForgeError::InvalidState(msg),
            BuildError::Template { path, source } => {
                ForgeError::Io(std::io::Error::new(source.kind(), format!("{:?}: {}", path, source)))
            }
            BuildError::Graph(GraphError::Json(e)) => ForgeError::Json(e),
            BuildError::Graph(e) => ForgeError::InvalidState(e.to_string()),
            BuildError::Toolchain(e) => e.into(),
            BuildError::Io(e) => ForgeError::Io(e),
        }
    }
}
