//! NDK Description
//!
//! Locates the NDK a toolchain compiles against and names its tools.

use std::path::{Path, PathBuf};

use apkforge_core::Architecture;
use tracing::{debug, warn};

use crate::detector::{is_valid_dir, ExternalToolConfig};
use crate::ToolchainError;

/// Stand-in root of a placeholder NDK. Actions invoking its tools fail when
/// they run, not when they are declared.
pub const PLACEHOLDER_NDK_ROOT: &str = "android-ndk-not-configured";

/// Where the NDK of a toolchain came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdkLocation {
    /// Explicitly configured, together with valid JDK, SDK and Gradle paths
    Configured(PathBuf),
    /// Found through the environment or the SDK
    Detected(PathBuf),
    /// Nothing usable; tools resolve under [`PLACEHOLDER_NDK_ROOT`]
    Placeholder,
}

/// An Android NDK installation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidNdk {
    location: NdkLocation,
    /// `Pkg.Revision` from `source.properties`, `"unknown"` if unreadable
    revision: String,
    host_tag: String,
}

impl AndroidNdk {
    /// Use the configured NDK when every tool path is valid, else the
    /// detected default, else a placeholder
    pub fn locate(tools: &ExternalToolConfig) -> Self {
        let location = if tools.all_valid() {
            NdkLocation::Configured(tools.ndk_path.clone())
        } else if is_valid_dir(&tools.ndk_path) {
            NdkLocation::Detected(tools.ndk_path.clone())
        } else {
            warn!("No usable Android NDK, using a placeholder toolchain");
            NdkLocation::Placeholder
        };
        Self::with_location(location)
    }

    pub fn with_location(location: NdkLocation) -> Self {
        let revision = match &location {
            NdkLocation::Configured(path) | NdkLocation::Detected(path) => read_revision(path),
            NdkLocation::Placeholder => "unknown".to_string(),
        };
        debug!("NDK {:?} revision {}", location, revision);
        Self {
            location,
            revision,
            host_tag: detect_host_tag().to_string(),
        }
    }

    pub fn placeholder() -> Self {
        Self::with_location(NdkLocation::Placeholder)
    }

    pub fn location(&self) -> &NdkLocation {
        &self.location
    }

    pub fn is_placeholder(&self) -> bool {
        self.location == NdkLocation::Placeholder
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Major version, `0` when unknown
    pub fn major_version(&self) -> u32 {
        self.revision
            .split('.')
            .next()
            .and_then(|m| m.trim().parse().ok())
            .unwrap_or(0)
    }

    /// NDK root; fails for the placeholder
    pub fn root(&self) -> Result<&Path, ToolchainError> {
        match &self.location {
            NdkLocation::Configured(path) | NdkLocation::Detected(path) => Ok(path),
            NdkLocation::Placeholder => Err(ToolchainError::NotFound(
                "Android NDK is not configured; set NdkPath or ANDROID_NDK_HOME".into(),
            )),
        }
    }

    fn llvm_prebuilt(&self) -> PathBuf {
        self.root()
            .unwrap_or(Path::new(PLACEHOLDER_NDK_ROOT))
            .join("toolchains")
            .join("llvm")
            .join("prebuilt")
            .join(&self.host_tag)
    }

    pub fn clang(&self) -> PathBuf {
        self.llvm_prebuilt().join("bin").join(exe("clang"))
    }

    pub fn clangxx(&self) -> PathBuf {
        self.llvm_prebuilt().join("bin").join(exe("clang++"))
    }

    pub fn llvm_ar(&self) -> PathBuf {
        self.llvm_prebuilt().join("bin").join(exe("llvm-ar"))
    }

    pub fn sysroot(&self) -> PathBuf {
        self.llvm_prebuilt().join("sysroot")
    }

    /// Clang `--target` value, e.g. `aarch64-linux-android21`
    pub fn target_triple(arch: Architecture, api_level: u32) -> String {
        format!("{}{}", arch.ndk_triple(), api_level)
    }
}

fn exe(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

/// Detect the host platform tag
fn detect_host_tag() -> &'static str {
    if cfg!(windows) {
        "windows-x86_64"
    } else if cfg!(target_os = "macos") {
        "darwin-x86_64"
    } else {
        "linux-x86_64"
    }
}

fn read_revision(path: &Path) -> String {
    let Ok(content) = std::fs::read_to_string(path.join("source.properties")) else {
        return "unknown".to_string();
    };
    content
        .lines()
        .filter(|line| line.starts_with("Pkg.Revision"))
        .filter_map(|line| line.split('=').nth(1))
        .map(|v| v.trim().to_string())
        .next()
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_ndk(revision: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("source.properties"),
            format!("Pkg.Desc = Android NDK\nPkg.Revision = {}\n", revision),
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_revision_and_tools() {
        let dir = fake_ndk("19.2.5345600");
        let ndk = AndroidNdk::with_location(NdkLocation::Detected(dir.path().to_path_buf()));
        assert_eq!(ndk.major_version(), 19);
        assert!(ndk.clang().starts_with(dir.path().join("toolchains")));
        assert!(ndk.sysroot().ends_with("sysroot"));
    }

    #[test]
    fn test_placeholder_tools_resolve_under_stand_in_root() {
        let ndk = AndroidNdk::placeholder();
        assert!(ndk.is_placeholder());
        assert_eq!(ndk.major_version(), 0);
        assert!(matches!(ndk.root(), Err(ToolchainError::NotFound(_))));
        assert!(ndk.clang().starts_with(PLACEHOLDER_NDK_ROOT));
        assert!(ndk.llvm_ar().starts_with(PLACEHOLDER_NDK_ROOT));
    }

    #[test]
    fn test_locate_degrades_without_failing() {
        let tools = ExternalToolConfig::default();
        assert!(AndroidNdk::locate(&tools).is_placeholder());

        let dir = fake_ndk("21.0.6113669");
        let tools = ExternalToolConfig {
            ndk_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert_eq!(
            AndroidNdk::locate(&tools).location(),
            &NdkLocation::Detected(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_target_triple() {
        assert_eq!(AndroidNdk::target_triple(Architecture::ARM64, 21), "aarch64-linux-android21");
        assert_eq!(AndroidNdk::target_triple(Architecture::ARMv7, 19), "armv7a-linux-androideabi19");
    }
}
