//! Deployment Routing
//!
//! Decides where a file that ships with the app lands inside the generated
//! Gradle project.

use std::path::{Path, PathBuf};

/// Copied to the output directory for test harnesses
pub const TEST_CONFIG_FILE: &str = "testconfig.json";

/// A file shipped with the app
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeployableFile {
    pub source: PathBuf,
    /// Location relative to the routing directory; the file name when absent
    pub relative_path: Option<PathBuf>,
}

impl DeployableFile {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            relative_path: None,
        }
    }

    pub fn with_relative_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.relative_path = Some(path.into());
        self
    }

    pub fn file_name(&self) -> PathBuf {
        self.source.file_name().map(PathBuf::from).unwrap_or_default()
    }

    pub fn extension(&self) -> &str {
        self.source.extension().and_then(|e| e.to_str()).unwrap_or("")
    }

    pub fn stem(&self) -> &str {
        self.source.file_stem().and_then(|s| s.to_str()).unwrap_or("")
    }

    pub fn kind(&self) -> DeployKind {
        match self.extension() {
            "java" => DeployKind::JavaSource,
            "kt" => DeployKind::KotlinSource,
            "aar" | "jar" => DeployKind::GradleLibrary,
            _ if self.file_name() == Path::new(TEST_CONFIG_FILE) => DeployKind::TestConfig,
            _ => DeployKind::Asset,
        }
    }

    fn relative_or_name(&self) -> PathBuf {
        self.relative_path.clone().unwrap_or_else(|| self.file_name())
    }
}

/// Routing class of a deployable file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployKind {
    JavaSource,
    KotlinSource,
    /// `.aar` or `.jar`, declared as a Gradle dependency
    GradleLibrary,
    TestConfig,
    Asset,
}

/// Everything deployed alongside the main library
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Deployable {
    File(DeployableFile),
    /// Shared library loaded at runtime, goes to `jniLibs/<abi>`
    NativeLibrary(PathBuf),
}

impl Deployable {
    pub fn path(&self) -> &Path {
        match self {
            Deployable::File(f) => &f.source,
            Deployable::NativeLibrary(p) => p,
        }
    }
}

/// Destination of `file` inside `project_dir`; test configs go to `output_dir`
pub fn route(file: &DeployableFile, project_dir: &Path, output_dir: &Path) -> PathBuf {
    match file.kind() {
        DeployKind::JavaSource => project_dir.join("src/main/java").join(file.relative_or_name()),
        DeployKind::KotlinSource => project_dir.join("src/main/kotlin").join(file.relative_or_name()),
        DeployKind::GradleLibrary => project_dir.join("libs").join(file.relative_or_name()),
        DeployKind::TestConfig => output_dir.join(TEST_CONFIG_FILE),
        DeployKind::Asset => project_dir.join("src/main/assets").join(file.relative_or_name()),
    }
}

/// `<project>/src/main/jniLibs/<abi>`
pub fn native_library_dir(project_dir: &Path, abi: &str) -> PathBuf {
    project_dir.join("src/main/jniLibs").join(abi)
}
