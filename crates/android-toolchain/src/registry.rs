//! Toolchain Registry
//!
//! Memoizes one toolchain per (architecture, role). A toolchain is built the
//! first time its key is requested and shared for the registry's lifetime.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use apkforge_core::{ApiLevels, Architecture, Architectures, BuildSettings};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::compiler::CompilerSettings;
use crate::detector::{ExternalToolConfig, ToolResolver};
use crate::env::ToolEnvironment;
use crate::linker::NativeProgramFormat;
use crate::ndk::AndroidNdk;
use crate::ToolchainError;

/// 64-bit ABIs exist from API 21 on
const MIN_64BIT_API_LEVEL: u32 = 21;

/// Static C++ runtime is linked from this NDK major version on
const STATIC_CPP_RUNTIME_NDK_MAJOR: u32 = 19;

/// Role of a target within a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TargetRole {
    /// Only architecture of a package
    Single,
    /// 32-bit half of a fat package; owns the package project
    Main,
    /// 64-bit half of a fat package; deployed into the main project
    Complementary,
}

impl fmt::Display for TargetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRole::Single => write!(f, "single"),
            TargetRole::Main => write!(f, "main"),
            TargetRole::Complementary => write!(f, "complementary"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolchainKey {
    pub architecture: Architecture,
    pub role: TargetRole,
}

impl ToolchainKey {
    pub fn new(architecture: Architecture, role: TargetRole) -> Self {
        Self { architecture, role }
    }
}

impl fmt::Display for ToolchainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.architecture, self.role)
    }
}

/// Toolchain keys a build needs for an architecture selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPlan {
    Single(ToolchainKey),
    Fat {
        main: ToolchainKey,
        complementary: ToolchainKey,
    },
}

impl TargetPlan {
    /// Fat selections pair ARMv7 as main with ARM64 as complementary
    pub fn from_architectures(architectures: Architectures) -> Result<Self, ToolchainError> {
        if architectures.is_fat() {
            return Ok(TargetPlan::Fat {
                main: ToolchainKey::new(Architecture::ARMv7, TargetRole::Main),
                complementary: ToolchainKey::new(Architecture::ARM64, TargetRole::Complementary),
            });
        }
        match architectures.list().first() {
            Some(&architecture) => Ok(TargetPlan::Single(ToolchainKey::new(architecture, TargetRole::Single))),
            None => Err(ToolchainError::Unsupported("no target architecture selected".into())),
        }
    }

    /// Key owning the package project
    pub fn primary(&self) -> ToolchainKey {
        match self {
            TargetPlan::Single(key) => *key,
            TargetPlan::Fat { main, .. } => *main,
        }
    }

    pub fn complementary(&self) -> Option<ToolchainKey> {
        match self {
            TargetPlan::Single(_) => None,
            TargetPlan::Fat { complementary, .. } => Some(*complementary),
        }
    }

    /// Complementary first, so its library exists before the main package
    pub fn keys(&self) -> Vec<ToolchainKey> {
        match self {
            TargetPlan::Single(key) => vec![*key],
            TargetPlan::Fat { main, complementary } => vec![*complementary, *main],
        }
    }
}

/// Compiler and output formats for one architecture and role
#[derive(Debug)]
pub struct AndroidToolchain {
    pub key: ToolchainKey,
    pub ndk: AndroidNdk,
    pub api_level: u32,
    pub compiler: CompilerSettings,
    pub dynamic_library_format: NativeProgramFormat,
    pub executable_format: NativeProgramFormat,
}

impl AndroidToolchain {
    pub fn new(ndk: AndroidNdk, key: ToolchainKey, api_level: u32, use_static: bool) -> Self {
        let api_level = if key.architecture.is_64bit() {
            api_level.max(MIN_64BIT_API_LEVEL)
        } else {
            api_level
        };
        let static_cpp_runtime = ndk.major_version() >= STATIC_CPP_RUNTIME_NDK_MAJOR;

        let dynamic_library_format = if use_static {
            NativeProgramFormat::static_library()
        } else {
            NativeProgramFormat::dynamic_library(static_cpp_runtime)
        };
        let executable_format = match key.role {
            TargetRole::Complementary => NativeProgramFormat::main_module(static_cpp_runtime),
            TargetRole::Single | TargetRole::Main => NativeProgramFormat::package(static_cpp_runtime),
        };

        Self {
            key,
            compiler: CompilerSettings::new(key.architecture, api_level, use_static),
            ndk,
            api_level,
            dynamic_library_format,
            executable_format,
        }
    }

    pub fn architecture(&self) -> Architecture {
        self.key.architecture
    }

    pub fn role(&self) -> TargetRole {
        self.key.role
    }

    /// Directory under `jniLibs` this toolchain's libraries go to
    pub fn abi_name(&self) -> &'static str {
        self.key.architecture.abi_name()
    }
}

/// Memoized toolchain factory
pub struct ToolchainRegistry {
    resolver: ToolResolver,
    api_levels: ApiLevels,
    toolchains: Mutex<HashMap<ToolchainKey, Arc<AndroidToolchain>>>,
}

impl ToolchainRegistry {
    pub fn new(settings: &BuildSettings) -> Self {
        Self {
            resolver: ToolResolver::new(settings.external_tools.clone()),
            api_levels: settings.api_levels,
            toolchains: Mutex::new(HashMap::new()),
        }
    }

    /// Resolved external tools
    pub fn tools(&self) -> &ExternalToolConfig {
        self.resolver.tools()
    }

    pub fn environment(&self) -> ToolEnvironment {
        ToolEnvironment::from_tools(self.tools())
    }

    pub fn api_levels(&self) -> ApiLevels {
        self.api_levels
    }

    /// Toolchain for `key`, built on first request. `use_static` only
    /// matters for that first request.
    pub fn get_toolchain(&self, use_static: bool, key: ToolchainKey) -> Arc<AndroidToolchain> {
        let mut toolchains = self.toolchains.lock();
        if let Some(toolchain) = toolchains.get(&key) {
            debug!("Reusing toolchain {}", key);
            return Arc::clone(toolchain);
        }

        info!("Creating toolchain {} (static: {})", key, use_static);
        let ndk = AndroidNdk::locate(self.resolver.tools());
        let toolchain = Arc::new(AndroidToolchain::new(
            ndk,
            key,
            self.api_levels.min_api_level(),
            use_static,
        ));
        toolchains.insert(key, Arc::clone(&toolchain));
        toolchain
    }

    /// Number of toolchains created so far
    pub fn len(&self) -> usize {
        self.toolchains.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::FormatKind;

    fn registry() -> ToolchainRegistry {
        let mut settings = BuildSettings::default();
        settings.external_tools.ndk_path = "/definitely/missing/ndk".into();
        settings.external_tools.sdk_path = "/definitely/missing/sdk".into();
        ToolchainRegistry::new(&settings)
    }

    #[test]
    fn test_same_key_returns_cached_instance() {
        let registry = registry();
        let key = ToolchainKey::new(Architecture::ARMv7, TargetRole::Single);
        let first = registry.get_toolchain(false, key);
        let second = registry.get_toolchain(true, key);
        assert!(Arc::ptr_eq(&first, &second));
        // first request decides the formats
        assert_eq!(second.dynamic_library_format.kind, FormatKind::DynamicLibrary);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_different_keys_are_distinct() {
        let registry = registry();
        let keys = [
            ToolchainKey::new(Architecture::ARMv7, TargetRole::Single),
            ToolchainKey::new(Architecture::ARMv7, TargetRole::Main),
            ToolchainKey::new(Architecture::ARM64, TargetRole::Single),
            ToolchainKey::new(Architecture::ARM64, TargetRole::Complementary),
        ];
        let toolchains: Vec<_> = keys.iter().map(|k| registry.get_toolchain(false, *k)).collect();
        for (i, a) in toolchains.iter().enumerate() {
            for b in toolchains.iter().skip(i + 1) {
                assert!(!Arc::ptr_eq(a, b));
            }
        }
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_missing_tools_give_placeholder() {
        let registry = registry();
        let toolchain = registry.get_toolchain(false, ToolchainKey::new(Architecture::ARM64, TargetRole::Single));
        assert!(toolchain.ndk.is_placeholder());
        assert!(toolchain.ndk.root().is_err());
    }

    #[test]
    fn test_formats_follow_role_and_linking() {
        let registry = registry();
        let complementary =
            registry.get_toolchain(true, ToolchainKey::new(Architecture::ARM64, TargetRole::Complementary));
        assert_eq!(complementary.executable_format.kind, FormatKind::MainModule);
        assert_eq!(complementary.dynamic_library_format.extension, "a");
        assert!(complementary.compiler.use_static);
        assert!(complementary.api_level >= 21);

        let main = registry.get_toolchain(false, ToolchainKey::new(Architecture::ARMv7, TargetRole::Main));
        assert_eq!(main.executable_format.kind, FormatKind::Package);
        assert_eq!(main.dynamic_library_format.extension, "so");
        assert_eq!(main.api_level, 19);
        assert_eq!(main.abi_name(), "armeabi-v7a");
    }

    #[test]
    fn test_target_plan() {
        let fat = TargetPlan::from_architectures(Architectures::default()).unwrap();
        assert_eq!(fat.primary(), ToolchainKey::new(Architecture::ARMv7, TargetRole::Main));
        assert_eq!(
            fat.complementary(),
            Some(ToolchainKey::new(Architecture::ARM64, TargetRole::Complementary))
        );
        assert_eq!(fat.keys().len(), 2);

        let single = TargetPlan::from_architectures(Architectures::ARM64).unwrap();
        assert_eq!(single.primary(), ToolchainKey::new(Architecture::ARM64, TargetRole::Single));
        assert_eq!(single.complementary(), None);

        assert!(TargetPlan::from_architectures(Architectures::empty()).is_err());
    }
}
