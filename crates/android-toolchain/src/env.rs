//! Tool Environment
//!
//! Environment variables handed to Gradle and other JVM tools so they see
//! the same JDK, SDK and NDK the toolchain resolved.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use apkforge_core::Invocation;

use crate::detector::{is_valid_dir, ExternalToolConfig};

/// Environment for child tools
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolEnvironment {
    /// JAVA_HOME
    pub java_home: Option<PathBuf>,
    /// ANDROID_HOME / ANDROID_SDK_ROOT
    pub android_home: Option<PathBuf>,
    /// ANDROID_NDK_HOME
    pub ndk_home: Option<PathBuf>,
    /// Additional PATH entries
    pub path_additions: Vec<PathBuf>,
}

impl ToolEnvironment {
    /// Create from resolved tools; invalid locations are left out
    pub fn from_tools(tools: &ExternalToolConfig) -> Self {
        let mut env = Self::default();

        if is_valid_dir(&tools.java_path) {
            env.java_home = Some(tools.java_path.clone());
            env.path_additions.push(tools.java_path.join("bin"));
        }

        if is_valid_dir(&tools.sdk_path) {
            env.android_home = Some(tools.sdk_path.clone());
            let platform_tools = tools.sdk_path.join("platform-tools");
            if platform_tools.exists() {
                env.path_additions.push(platform_tools);
            }
        }

        if is_valid_dir(&tools.ndk_path) {
            env.ndk_home = Some(tools.ndk_path.clone());
        }

        env
    }

    /// Variables to set, sorted by name; `PATH` extends the host's
    pub fn vars(&self) -> BTreeMap<String, String> {
        self.vars_over_path(&env::var("PATH").unwrap_or_default())
    }

    fn vars_over_path(&self, host_path: &str) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();

        if !self.path_additions.is_empty() {
            vars.insert("PATH".to_string(), self.path_with(host_path));
        }

        if let Some(ref path) = self.java_home {
            vars.insert("JAVA_HOME".to_string(), path.to_string_lossy().to_string());
        }

        if let Some(ref path) = self.android_home {
            let path_str = path.to_string_lossy().to_string();
            vars.insert("ANDROID_HOME".to_string(), path_str.clone());
            vars.insert("ANDROID_SDK_ROOT".to_string(), path_str);
        }

        if let Some(ref path) = self.ndk_home {
            vars.insert("ANDROID_NDK_HOME".to_string(), path.to_string_lossy().to_string());
        }

        vars
    }

    /// PATH with the additions prepended to `original`
    pub fn path_with(&self, original: &str) -> String {
        if self.path_additions.is_empty() {
            return original.to_string();
        }

        let path_sep = if cfg!(windows) { ";" } else { ":" };
        let mut parts: Vec<String> = self
            .path_additions
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect();
        if !original.is_empty() {
            parts.push(original.to_string());
        }
        parts.join(path_sep)
    }

    /// Attach the variables to an invocation
    pub fn apply(&self, mut invocation: Invocation) -> Invocation {
        for (key, value) in self.vars() {
            invocation = invocation.env(key, value);
        }
        invocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_valid_locations_are_exported() {
        let jdk = tempfile::tempdir().unwrap();
        let tools = ExternalToolConfig {
            java_path: jdk.path().to_path_buf(),
            sdk_path: "/missing/sdk".into(),
            ..Default::default()
        };
        let env = ToolEnvironment::from_tools(&tools);
        let vars = env.vars_over_path("/usr/bin");
        assert_eq!(vars.get("JAVA_HOME").map(String::as_str), jdk.path().to_str());
        assert!(!vars.contains_key("ANDROID_HOME"));
        assert_eq!(env.path_additions, vec![jdk.path().join("bin")]);
        assert!(vars["PATH"].starts_with(&*jdk.path().join("bin").to_string_lossy()));
        assert!(vars["PATH"].ends_with("/usr/bin"));
    }

    #[test]
    fn test_sdk_sets_both_names() {
        let env = ToolEnvironment {
            android_home: Some("/sdk".into()),
            ..Default::default()
        };
        let vars = env.vars();
        assert_eq!(vars["ANDROID_HOME"], "/sdk");
        assert_eq!(vars["ANDROID_SDK_ROOT"], "/sdk");

        assert!(!vars.contains_key("PATH"));

        let invocation = env.apply(Invocation::new("gradle"));
        assert_eq!(invocation.env.len(), 2);
    }

    #[test]
    fn test_path_prepends_additions() {
        let env = ToolEnvironment {
            path_additions: vec!["/jdk/bin".into()],
            ..Default::default()
        };
        let sep = if cfg!(windows) { ";" } else { ":" };
        assert_eq!(env.path_with("/usr/bin"), format!("/jdk/bin{}/usr/bin", sep));
        assert_eq!(ToolEnvironment::default().path_with("/usr/bin"), "/usr/bin");
    }
}
