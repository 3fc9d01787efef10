//! External Tool Resolution
//!
//! Resolves the JDK, Android SDK, Android NDK, Gradle and bundletool
//! locations. Configured values win; every empty value is probed from the
//! environment and common install locations. Nothing here fails: an
//! unresolved tool stays empty and the error is raised on first use.

use std::env;
use std::path::{Path, PathBuf};

use apkforge_core::ExternalToolsSettings;
use glob::{glob, Pattern};
use once_cell::sync::OnceCell;
use tracing::{debug, info};
use which::which;

use crate::ToolchainError;

/// Resolved external tool locations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalToolConfig {
    pub java_path: PathBuf,
    pub sdk_path: PathBuf,
    pub ndk_path: PathBuf,
    pub gradle_path: PathBuf,
    pub bundletool_path: PathBuf,
}

/// A path is valid only when it is non-empty and names an existing directory
pub fn is_valid_dir(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.is_dir()
}

fn exe_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", name)
    } else {
        name.to_string()
    }
}

impl ExternalToolConfig {
    /// JDK, SDK, NDK and Gradle are all usable
    pub fn all_valid(&self) -> bool {
        is_valid_dir(&self.java_path)
            && is_valid_dir(&self.sdk_path)
            && is_valid_dir(&self.ndk_path)
            && is_valid_dir(&self.gradle_path)
    }

    pub fn adb_path(&self) -> Result<PathBuf, ToolchainError> {
        if self.sdk_path.as_os_str().is_empty() {
            return Err(ToolchainError::NotFound("ADB is not found".into()));
        }
        Ok(self.sdk_path.join("platform-tools").join(exe_name("adb")))
    }

    pub fn java_executable(&self) -> Result<PathBuf, ToolchainError> {
        if self.java_path.as_os_str().is_empty() {
            return Err(ToolchainError::NotFound("JDK is not found".into()));
        }
        Ok(self.java_path.join("bin").join(exe_name("java")))
    }

    /// The single `gradle-launcher-*.jar` under `<gradle>/lib`
    pub fn gradle_launcher_jar(&self) -> Option<PathBuf> {
        let mut jars = files_matching(&self.gradle_path.join("lib"), "gradle-launcher-*.jar");
        if jars.len() == 1 {
            jars.pop()
        } else {
            None
        }
    }

    /// bundletool jar, either configured directly or found as the single
    /// `bundletool-all-*.jar` in the configured directory
    pub fn bundletool_jar(&self) -> Result<PathBuf, ToolchainError> {
        let path = &self.bundletool_path;
        if path.is_file() {
            return Ok(path.clone());
        }
        let mut jars = files_matching(path, "bundletool-all-*.jar");
        if jars.len() == 1 {
            if let Some(jar) = jars.pop() {
                return Ok(jar);
            }
        }
        Err(ToolchainError::NotFound(format!("Failed to find bundletool in {:?}", path)))
    }
}

/// Files in `dir` matching the glob `file_pattern`, sorted
fn files_matching(dir: &Path, file_pattern: &str) -> Vec<PathBuf> {
    if !is_valid_dir(dir) {
        return Vec::new();
    }
    let pattern = Path::new(&Pattern::escape(&dir.to_string_lossy())).join(file_pattern);
    let Ok(paths) = glob(&pattern.to_string_lossy()) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = paths.filter_map(Result::ok).filter(|p| p.is_file()).collect();
    files.sort();
    files
}

/// Lazily resolves external tools once per resolver
pub struct ToolResolver {
    settings: ExternalToolsSettings,
    resolved: OnceCell<ExternalToolConfig>,
}

impl ToolResolver {
    pub fn new(settings: ExternalToolsSettings) -> Self {
        Self {
            settings,
            resolved: OnceCell::new(),
        }
    }

    /// Resolved tools, probed on first access
    pub fn tools(&self) -> &ExternalToolConfig {
        self.resolved.get_or_init(|| {
            info!("Resolving external Android tools...");
            let tools = resolve_with(&self.settings, |key| env::var(key).ok());
            debug!("Resolved tools: {:?}", tools);
            tools
        })
    }
}

/// Resolve tools using `lookup` for environment variables
pub fn resolve_with<F>(settings: &ExternalToolsSettings, lookup: F) -> ExternalToolConfig
where
    F: Fn(&str) -> Option<String>,
{
    let from_env = |keys: &[&str]| -> Option<PathBuf> {
        keys.iter()
            .filter_map(|k| lookup(k))
            .find(|v| !v.is_empty())
            .map(PathBuf::from)
    };

    let java_path = configured(&settings.java_path)
        .or_else(|| from_env(&["JAVA_HOME"]))
        .unwrap_or_default();

    let sdk_path = configured(&settings.sdk_path)
        .or_else(|| from_env(&["ANDROID_SDK_ROOT", "ANDROID_HOME"]))
        .or_else(|| sdk_candidates().into_iter().find(|p| is_valid_dir(p)))
        .unwrap_or_default();

    let ndk_path = configured(&settings.ndk_path)
        .or_else(|| from_env(&["ANDROID_NDK_HOME", "ANDROID_NDK_ROOT", "NDK_HOME"]))
        .or_else(|| ndk_in_sdk(&sdk_path))
        .unwrap_or_default();

    let gradle_path = configured(&settings.gradle_path)
        .or_else(|| from_env(&["GRADLE_HOME"]))
        .or_else(gradle_from_path)
        .unwrap_or_default();

    let bundletool_path = configured(&settings.bundletool_path)
        .or_else(|| from_env(&["BUNDLETOOL_PATH"]))
        .unwrap_or_default();

    ExternalToolConfig {
        java_path,
        sdk_path,
        ndk_path,
        gradle_path,
        bundletool_path,
    }
}

fn configured(value: &str) -> Option<PathBuf> {
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

/// Common SDK install locations
fn sdk_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if cfg!(windows) {
        if let Some(local) = dirs::data_local_dir() {
            candidates.push(local.join("Android").join("Sdk"));
        }
    }

    if cfg!(unix) {
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join("Android").join("Sdk"));
            candidates.push(home.join("Library").join("Android").join("sdk"));
        }
        candidates.push(PathBuf::from("/opt/android-sdk"));
    }

    candidates
}

/// `<sdk>/ndk-bundle`, else the newest side-by-side `<sdk>/ndk/<version>`
fn ndk_in_sdk(sdk: &Path) -> Option<PathBuf> {
    if !is_valid_dir(sdk) {
        return None;
    }
    let bundle = sdk.join("ndk-bundle");
    if bundle.is_dir() {
        return Some(bundle);
    }
    std::fs::read_dir(sdk.join("ndk"))
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .max_by_key(|p| version_key(p))
}

/// Numeric components of a `major.minor.build` directory name
fn version_key(path: &Path) -> Vec<u32> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.split('.').map(|part| part.parse().unwrap_or(0)).collect())
        .unwrap_or_default()
}

/// Gradle home derived from a `gradle` launcher on `PATH` (`<home>/bin/gradle`)
fn gradle_from_path() -> Option<PathBuf> {
    let launcher = which("gradle").ok()?;
    let launcher = launcher.canonicalize().unwrap_or(launcher);
    launcher.parent()?.parent().map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_values_win_over_environment() {
        let settings = ExternalToolsSettings {
            java_path: "/configured/jdk".into(),
            ..Default::default()
        };
        let tools = resolve_with(&settings, |key| match key {
            "JAVA_HOME" => Some("/env/jdk".into()),
            "ANDROID_HOME" => Some("/env/sdk".into()),
            "ANDROID_NDK_HOME" => Some(String::new()),
            "ANDROID_NDK_ROOT" => Some("/env/ndk".into()),
            _ => None,
        });
        assert_eq!(tools.java_path, PathBuf::from("/configured/jdk"));
        assert_eq!(tools.sdk_path, PathBuf::from("/env/sdk"));
        assert_eq!(tools.ndk_path, PathBuf::from("/env/ndk"));
        assert!(!tools.all_valid());
    }

    #[test]
    fn test_tool_paths() {
        let tools = ExternalToolConfig {
            sdk_path: "/sdk".into(),
            java_path: "/jdk".into(),
            ..Default::default()
        };
        assert!(tools.adb_path().unwrap().ends_with(exe_name("adb")));
        assert!(tools.java_executable().unwrap().starts_with("/jdk/bin"));
        assert!(ExternalToolConfig::default().adb_path().is_err());
        assert!(ExternalToolConfig::default().java_executable().is_err());
    }

    #[test]
    fn test_empty_path_is_never_valid() {
        assert!(!is_valid_dir(Path::new("")));
        let dir = tempfile::tempdir().unwrap();
        assert!(is_valid_dir(dir.path()));
        assert!(!is_valid_dir(&dir.path().join("missing")));
    }

    #[test]
    fn test_single_launcher_jar_required() {
        let gradle = tempfile::tempdir().unwrap();
        let lib = gradle.path().join("lib");
        std::fs::create_dir_all(&lib).unwrap();
        let tools = ExternalToolConfig {
            gradle_path: gradle.path().to_path_buf(),
            ..Default::default()
        };
        assert_eq!(tools.gradle_launcher_jar(), None);

        std::fs::write(lib.join("gradle-launcher-5.1.1.jar"), b"").unwrap();
        assert_eq!(tools.gradle_launcher_jar(), Some(lib.join("gradle-launcher-5.1.1.jar")));

        std::fs::write(lib.join("gradle-launcher-6.0.jar"), b"").unwrap();
        assert_eq!(tools.gradle_launcher_jar(), None);
    }

    #[test]
    fn test_bundletool_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ExternalToolConfig {
            bundletool_path: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(tools.bundletool_jar().is_err());
        let jar = dir.path().join("bundletool-all-0.10.0.jar");
        std::fs::write(&jar, b"").unwrap();
        assert_eq!(tools.bundletool_jar().unwrap(), jar);
    }

    #[test]
    fn test_side_by_side_ndk_picks_newest() {
        let sdk = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(sdk.path().join("ndk").join("19.2.5345600")).unwrap();
        std::fs::create_dir_all(sdk.path().join("ndk").join("21.0.6113669")).unwrap();
        assert_eq!(ndk_in_sdk(sdk.path()), Some(sdk.path().join("ndk").join("21.0.6113669")));
    }

    #[test]
    fn test_side_by_side_ndk_compares_versions_numerically() {
        let sdk = tempfile::tempdir().unwrap();
        for version in ["9.2.0", "21.0.6113669", "21.0.600"] {
            std::fs::create_dir_all(sdk.path().join("ndk").join(version)).unwrap();
        }
        assert_eq!(ndk_in_sdk(sdk.path()), Some(sdk.path().join("ndk").join("21.0.6113669")));

        let resolved = resolve_with(
            &ExternalToolsSettings {
                sdk_path: sdk.path().to_string_lossy().to_string(),
                ..Default::default()
            },
            |_| None,
        );
        assert_eq!(resolved.ndk_path, sdk.path().join("ndk").join("21.0.6113669"));
    }

    #[test]
    fn test_launcher_glob_ignores_other_jars() {
        let gradle = tempfile::tempdir().unwrap();
        let lib = gradle.path().join("lib");
        std::fs::create_dir_all(lib.join("gradle-launcher-dir.jar")).unwrap();
        std::fs::write(lib.join("gradle-core-5.1.1.jar"), b"").unwrap();
        std::fs::write(lib.join("gradle-launcher-5.1.1.jar"), b"").unwrap();
        assert_eq!(
            files_matching(&lib, "gradle-launcher-*.jar"),
            vec![lib.join("gradle-launcher-5.1.1.jar")]
        );
        assert!(files_matching(Path::new(""), "gradle-launcher-*.jar").is_empty());
    }
}
