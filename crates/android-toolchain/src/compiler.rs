//! Compiler Settings
//!
//! Flags handed to the NDK clang for one architecture and API level.

use std::fmt;

use apkforge_core::Architecture;
use serde::{Deserialize, Serialize};

use crate::ndk::AndroidNdk;

/// Build configuration of native code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CodeGen {
    #[default]
    Debug,
    Develop,
    Release,
}

impl CodeGen {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeGen::Debug => "debug",
            CodeGen::Develop => "develop",
            CodeGen::Release => "release",
        }
    }

    /// Only `Release` produces a release package; `Develop` packages as debug
    pub fn is_release(&self) -> bool {
        matches!(self, CodeGen::Release)
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(CodeGen::Debug),
            "develop" | "development" => Some(CodeGen::Develop),
            "release" => Some(CodeGen::Release),
            _ => None,
        }
    }
}

impl fmt::Display for CodeGen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiler configuration owned by a toolchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerSettings {
    pub architecture: Architecture,
    pub api_level: u32,
    /// Adds `-DSTATIC_LINKING` for code linked into a single static entry point
    pub use_static: bool,
    pub position_independent: bool,
}

impl CompilerSettings {
    pub fn new(architecture: Architecture, api_level: u32, use_static: bool) -> Self {
        Self {
            architecture,
            api_level,
            use_static,
            position_independent: true,
        }
    }

    /// Flags for compiling one translation unit
    pub fn flags_for(&self, codegen: CodeGen) -> Vec<String> {
        let mut flags = vec![
            format!("--target={}", AndroidNdk::target_triple(self.architecture, self.api_level)),
            "-DANDROID".to_string(),
            "-ffunction-sections".to_string(),
            "-fdata-sections".to_string(),
        ];

        if self.position_independent {
            flags.push("-fPIC".to_string());
        }

        if self.architecture == Architecture::ARMv7 {
            flags.push("-march=armv7-a".to_string());
            flags.push("-mfloat-abi=softfp".to_string());
            flags.push("-mthumb".to_string());
        }

        match codegen {
            CodeGen::Debug => flags.extend(["-O0".to_string(), "-g".to_string()]),
            CodeGen::Develop => flags.extend(["-O2".to_string(), "-g".to_string()]),
            CodeGen::Release => flags.extend(["-O2".to_string(), "-DNDEBUG".to_string()]),
        }

        // thumb code breaks stepping in the Android Studio debugger
        let mut flags: Vec<String> = flags
            .into_iter()
            .map(|flag| {
                if flag == "-mthumb" && codegen == CodeGen::Debug {
                    "-marm".to_string()
                } else {
                    flag
                }
            })
            .collect();

        if self.use_static {
            flags.push("-DSTATIC_LINKING".to_string());
        }

        flags
    }
}
