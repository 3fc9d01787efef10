//! Build Settings
//!
//! Typed configuration sections read once from the build configuration file:
//! - External tool paths (JDK, SDK, NDK, Gradle, bundletool)
//! - API levels and architecture selection
//! - Export settings and application identity
//!
//! A missing or malformed file is not fatal: every section falls back to its
//! defaults and the problem is logged.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::arch::Architectures;
use crate::error::Result;

/// Default name of the build configuration file
pub const CONFIG_FILE_NAME: &str = "buildconfiguration.json";

/// Lowest API level used when the minimum is left on automatic
pub const DEFAULT_MIN_API_LEVEL: u32 = 19;

/// Target API level used when the target is left on automatic
pub const DEFAULT_TARGET_API_LEVEL: u32 = 28;

/// Paths to external tool installations. Empty means "not configured".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExternalToolsSettings {
    pub java_path: String,
    pub sdk_path: String,
    pub ndk_path: String,
    pub gradle_path: String,
    /// bundletool jar, or a directory holding `bundletool-all-*.jar`
    pub bundletool_path: String,
}

/// API levels; `0` stands for "automatic"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiLevels {
    #[serde(rename = "MinAPILevel")]
    pub min_api_level: u32,
    #[serde(rename = "TargetAPILevel")]
    pub target_api_level: u32,
}

impl ApiLevels {
    /// Minimum API level, never higher than an explicit target level
    pub fn min_api_level(&self) -> u32 {
        if self.min_api_level == 0 {
            return DEFAULT_MIN_API_LEVEL;
        }
        if self.target_api_level == 0 {
            return self.min_api_level;
        }
        self.min_api_level.min(self.target_api_level)
    }

    pub fn resolved_target_api_level(&self) -> u32 {
        if self.target_api_level == 0 {
            DEFAULT_TARGET_API_LEVEL
        } else {
            self.target_api_level
        }
    }
}

/// Output type of the packaging step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TargetType {
    #[default]
    AndroidPackage,
    AndroidAppBundle,
}

impl TargetType {
    pub fn extension(&self) -> &'static str {
        match self {
            TargetType::AndroidPackage => "apk",
            TargetType::AndroidAppBundle => "aab",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ExportSettings {
    pub target_type: TargetType,
    pub export_project: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GeneralSettings {
    pub product_name: String,
    pub version: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            product_name: "Product".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LaunchSettings {
    /// Activity class launched on the device
    pub activity: String,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            activity: "com.apkforge.player.PlayerActivity".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ApplicationIdentifierSection {
    package_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct BundleVersionCodeSection {
    version_code: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ArchitecturesValue {
    Bits(u32),
    Names(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ArchitecturesSection {
    architectures: ArchitecturesValue,
}

/// All build settings consumed by the packaging core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub external_tools: ExternalToolsSettings,
    pub api_levels: ApiLevels,
    pub architectures: Architectures,
    pub export: ExportSettings,
    package_name: String,
    pub bundle_version_code: u32,
    pub general: GeneralSettings,
    pub launch: LaunchSettings,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            external_tools: ExternalToolsSettings::default(),
            api_levels: ApiLevels::default(),
            architectures: Architectures::default(),
            export: ExportSettings::default(),
            package_name: String::new(),
            bundle_version_code: 1,
            general: GeneralSettings::default(),
            launch: LaunchSettings::default(),
        }
    }
}

impl BuildSettings {
    /// Load settings, falling back to defaults when the file is absent or malformed
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!("No build configuration at {:?}, using defaults", path);
            return Self::default();
        }
        match Self::try_load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring malformed build configuration {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Load settings, reporting read and parse errors
    pub fn try_load(path: &Path) -> Result<Self> {
        info!("Loading build configuration from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .map(|e| e == "toml")
            .unwrap_or(false);

        if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)?;
        Ok(Self::from_value(value))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let value: toml::Value = toml::from_str(content)?;
        Ok(Self::from_value(serde_json::to_value(value)?))
    }

    /// Accepts either an array of `$type`-tagged sections or an object keyed by section name
    fn from_value(value: Value) -> Self {
        let mut settings = Self::default();
        match value {
            Value::Array(sections) => {
                for section in sections {
                    let name = section
                        .get("$type")
                        .and_then(Value::as_str)
                        .map(section_name);
                    match name {
                        Some(name) => settings.apply_section(&name, section),
                        None => warn!("Skipping configuration entry without $type"),
                    }
                }
            }
            Value::Object(map) => {
                if let Some(name) = map.get("$type").and_then(Value::as_str).map(section_name) {
                    settings.apply_section(&name, Value::Object(map));
                } else {
                    for (name, section) in map {
                        settings.apply_section(&name, section);
                    }
                }
            }
            other => warn!("Unexpected build configuration root: {}", other),
        }
        settings
    }

    fn apply_section(&mut self, name: &str, value: Value) {
        match name {
            "AndroidExternalTools" => {
                if let Some(tools) = parse_section(name, value) {
                    self.external_tools = tools;
                }
            }
            "AndroidAPILevels" => {
                if let Some(levels) = parse_section(name, value) {
                    self.api_levels = levels;
                }
            }
            "AndroidArchitectures" => {
                if let Some(section) = parse_section::<ArchitecturesSection>(name, value) {
                    self.architectures = match section.architectures {
                        ArchitecturesValue::Bits(bits) => Architectures::from_bits_truncate(bits),
                        ArchitecturesValue::Names(names) => Architectures::parse_list(&names),
                    };
                }
            }
            "AndroidExportSettings" => {
                if let Some(export) = parse_section(name, value) {
                    self.export = export;
                }
            }
            "ApplicationIdentifier" => {
                if let Some(section) = parse_section::<ApplicationIdentifierSection>(name, value) {
                    self.package_name = section.package_name;
                }
            }
            "AndroidBundleVersionCode" => {
                if let Some(section) = parse_section::<BundleVersionCodeSection>(name, value) {
                    self.bundle_version_code = section.version_code;
                }
            }
            "GeneralSettings" => {
                if let Some(general) = parse_section(name, value) {
                    self.general = general;
                }
            }
            "AndroidLaunch" => {
                if let Some(launch) = parse_section(name, value) {
                    self.launch = launch;
                }
            }
            _ => debug!("Ignoring configuration section {}", name),
        }
    }

    /// Application identifier, with a default when none is configured
    pub fn package_name(&self) -> &str {
        if self.package_name.is_empty() {
            "com.apkforge.DefaultPackage"
        } else {
            &self.package_name
        }
    }

    pub fn set_package_name(&mut self, name: impl Into<String>) {
        self.package_name = name.into();
    }

    /// `package/activity` component launched on the device
    pub fn launch_component(&self) -> String {
        format!("{}/{}", self.package_name(), self.launch.activity)
    }

    /// Both the 32-bit and the 64-bit architecture are selected
    pub fn is_fat_apk(&self) -> bool {
        self.architectures.is_fat()
    }

    pub fn build_app_bundle(&self) -> bool {
        self.export.target_type == TargetType::AndroidAppBundle
    }

    pub fn export_project(&self) -> bool {
        self.export.export_project
    }

    /// Package file extension including the dot, empty for exported projects
    pub fn executable_extension(&self) -> &'static str {
        if self.export_project() {
            ""
        } else if self.build_app_bundle() {
            ".aab"
        } else {
            ".apk"
        }
    }

    /// A device run is only possible when a package is produced
    pub fn can_run(&self) -> bool {
        !self.export_project()
    }
}

/// `"Some.Namespace.AndroidAPILevels, Some.Assembly"` -> `"AndroidAPILevels"`
fn section_name(type_name: &str) -> String {
    let qualified = type_name.split(',').next().unwrap_or(type_name).trim();
    qualified.rsplit('.').next().unwrap_or(qualified).to_string()
}

fn parse_section<T: DeserializeOwned>(name: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(section) => Some(section),
        Err(e) => {
            warn!("Ignoring malformed {} section: {}", name, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {
            "$type": "Unity.Build.Android.AndroidExternalTools, Unity.Build.Android",
            "JavaPath": "/opt/jdk",
            "SdkPath": "/opt/sdk",
            "NdkPath": "/opt/ndk",
            "GradlePath": "/opt/gradle"
        },
        {
            "$type": "Unity.Build.Android.AndroidAPILevels, Unity.Build.Android",
            "MinAPILevel": 21,
            "TargetAPILevel": 0
        },
        { "$type": "AndroidArchitectures", "Architectures": "ARM64" },
        { "$type": "AndroidExportSettings", "TargetType": "AndroidAppBundle", "ExportProject": false },
        { "$type": "ApplicationIdentifier", "PackageName": "com.example.game" }
    ]"#;

    #[test]
    fn test_parse_typed_sections() {
        let settings = BuildSettings::from_json_str(SAMPLE).unwrap();
        assert_eq!(settings.external_tools.sdk_path, "/opt/sdk");
        assert_eq!(settings.api_levels.min_api_level(), 21);
        assert_eq!(settings.api_levels.resolved_target_api_level(), DEFAULT_TARGET_API_LEVEL);
        assert_eq!(settings.architectures, Architectures::ARM64);
        assert!(settings.build_app_bundle());
        assert!(!settings.is_fat_apk());
        assert_eq!(settings.package_name(), "com.example.game");
        assert_eq!(settings.executable_extension(), ".aab");
    }

    #[test]
    fn test_malformed_section_keeps_defaults() {
        let json = r#"[
            { "$type": "AndroidAPILevels", "MinAPILevel": "not a number" },
            { "$type": "AndroidArchitectures", "Architectures": 3 }
        ]"#;
        let settings = BuildSettings::from_json_str(json).unwrap();
        assert_eq!(settings.api_levels, ApiLevels::default());
        assert!(settings.is_fat_apk());
    }

    #[test]
    fn test_min_api_clamped_to_target() {
        let levels = ApiLevels { min_api_level: 26, target_api_level: 23 };
        assert_eq!(levels.min_api_level(), 23);
        assert_eq!(ApiLevels::default().min_api_level(), DEFAULT_MIN_API_LEVEL);
    }

    #[test]
    fn test_object_and_toml_shapes() {
        let toml = r#"
            [AndroidExportSettings]
            ExportProject = true

            [ApplicationIdentifier]
            PackageName = "com.example.toml"
        "#;
        let settings = BuildSettings::from_toml_str(toml).unwrap();
        assert!(settings.export_project());
        assert!(!settings.can_run());
        assert_eq!(settings.executable_extension(), "");
        assert_eq!(settings.package_name(), "com.example.toml");
    }

    #[test]
    fn test_missing_or_broken_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(CONFIG_FILE_NAME);
        assert_eq!(BuildSettings::load(&missing), BuildSettings::default());

        std::fs::write(&missing, "{ not json").unwrap();
        let settings = BuildSettings::load(&missing);
        assert_eq!(settings.package_name(), "com.apkforge.DefaultPackage");
        assert_eq!(settings.launch_component(), "com.apkforge.DefaultPackage/com.apkforge.player.PlayerActivity");
    }
}
