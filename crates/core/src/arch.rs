//! Target CPU architectures

use std::fmt;

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Set of selected target architectures
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Architectures: u32 {
        const ARMV7 = 1;
        const ARM64 = 2;
    }
}

impl Default for Architectures {
    fn default() -> Self {
        Architectures::ARMV7 | Architectures::ARM64
    }
}

impl Architectures {
    /// A fat package needs the 32-bit and the 64-bit architecture at once
    pub fn is_fat(&self) -> bool {
        self.contains(Architectures::ARMV7 | Architectures::ARM64)
    }

    /// Selected architectures, 32-bit first
    pub fn list(&self) -> Vec<Architecture> {
        Architecture::all()
            .iter()
            .copied()
            .filter(|a| self.contains(a.flag()))
            .collect()
    }

    /// Parse a `"ARMv7, ARM64"` style list; unknown names are ignored
    pub fn parse_list(s: &str) -> Self {
        s.split([',', '|'])
            .filter_map(|name| Architecture::from_str(name.trim()))
            .fold(Architectures::empty(), |acc, a| acc | a.flag())
    }
}

/// A single target architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Architecture {
    ARMv7,
    ARM64,
}

impl Architecture {
    pub fn all() -> &'static [Architecture] {
        &[Architecture::ARMv7, Architecture::ARM64]
    }

    pub fn flag(&self) -> Architectures {
        match self {
            Architecture::ARMv7 => Architectures::ARMV7,
            Architecture::ARM64 => Architectures::ARM64,
        }
    }

    pub fn is_64bit(&self) -> bool {
        matches!(self, Architecture::ARM64)
    }

    /// Name of the ABI directory inside `jniLibs` and in ABI filters
    pub fn abi_name(&self) -> &'static str {
        match self {
            Architecture::ARMv7 => "armeabi-v7a",
            Architecture::ARM64 => "arm64-v8a",
        }
    }

    /// Clang target triple without the API level suffix
    pub fn ndk_triple(&self) -> &'static str {
        match self {
            Architecture::ARMv7 => "armv7a-linux-androideabi",
            Architecture::ARM64 => "aarch64-linux-android",
        }
    }

    /// Parse from an architecture or ABI name
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "armv7" | "armeabi-v7a" | "arm" => Some(Architecture::ARMv7),
            "arm64" | "arm64-v8a" | "aarch64" => Some(Architecture::ARM64),
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::ARMv7 => write!(f, "ARMv7"),
            Architecture::ARM64 => write!(f, "ARM64"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_bit_is_never_fat() {
        assert!(!Architectures::ARMV7.is_fat());
        assert!(!Architectures::ARM64.is_fat());
        assert!(!Architectures::empty().is_fat());
        assert!((Architectures::ARMV7 | Architectures::ARM64).is_fat());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(Architectures::parse_list("ARMv7, ARM64"), Architectures::default());
        assert_eq!(Architectures::parse_list("arm64-v8a"), Architectures::ARM64);
        assert_eq!(Architectures::parse_list("mips"), Architectures::empty());
        assert_eq!(Architectures::default().list(), vec![Architecture::ARMv7, Architecture::ARM64]);
    }
}
