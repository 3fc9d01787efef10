//! Linker Policies
//!
//! One linker, configured by a policy, covers every output format a toolchain
//! produces: static archives, shared libraries, the complementary main module
//! and the library a package is built around.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::ndk::AndroidNdk;

/// Name of the JNI entry library linked into every package
pub const ENTRY_LIBRARY: &str = "apkforge_android";

/// Kind of a linkable artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ArtifactKind {
    StaticLibrary,
    DynamicLibrary,
    /// Provided by the platform, referenced by name (`-l<name>`)
    System,
}

/// A native build output or an input library
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BuildArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    /// System libraries a static archive needs but does not embed
    pub system_libraries: Vec<BuildArtifact>,
}

impl BuildArtifact {
    pub fn static_library(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::StaticLibrary,
            system_libraries: Vec::new(),
        }
    }

    pub fn dynamic_library(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::DynamicLibrary,
            system_libraries: Vec::new(),
        }
    }

    /// System library by bare name, e.g. `log` or `android`
    pub fn system(name: &str) -> Self {
        Self {
            path: PathBuf::from(name),
            kind: ArtifactKind::System,
            system_libraries: Vec::new(),
        }
    }

    pub fn with_system_libraries(mut self, libraries: Vec<BuildArtifact>) -> Self {
        self.system_libraries = libraries;
        self
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == ArtifactKind::DynamicLibrary
    }

    pub fn is_system(&self) -> bool {
        self.kind == ArtifactKind::System
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Static archive of the JNI entry library
    pub fn is_entry_archive(&self, entry: &str) -> bool {
        self.kind == ArtifactKind::StaticLibrary && self.file_name() == format!("lib{}.a", entry)
    }
}

/// How the linker combines objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    /// `llvm-ar rcs`
    Archive,
    /// `clang++ -shared`
    Shared,
}

/// Behaviour switches of the linker
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LinkerPolicy {
    /// Wrap this entry library's archive in `--whole-archive` so its JNI
    /// exports survive
    pub whole_archive_entry: Option<String>,
    /// Output named `lib<name>.so`; Android only loads `lib*` libraries
    pub main_module_prefix: bool,
    /// Pull in the system libraries recorded on static archives
    pub propagate_system_libraries: bool,
    /// `-static-libstdc++`
    pub static_cpp_runtime: bool,
}

/// Linker of one toolchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linker {
    pub mode: LinkMode,
    pub policy: LinkerPolicy,
}

/// Everything needed to declare one link action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPlan {
    pub executable: PathBuf,
    pub args: Vec<String>,
    /// Objects plus every non-system library
    pub inputs: Vec<PathBuf>,
    pub artifact: BuildArtifact,
}

impl LinkPlan {
    pub fn output(&self) -> &Path {
        &self.artifact.path
    }
}

impl Linker {
    pub fn archive() -> Self {
        Self {
            mode: LinkMode::Archive,
            policy: LinkerPolicy::default(),
        }
    }

    pub fn shared(policy: LinkerPolicy) -> Self {
        Self {
            mode: LinkMode::Shared,
            policy,
        }
    }

    /// Final path of an output requested at `destination`
    pub fn output_path(&self, destination: &Path) -> PathBuf {
        if !self.policy.main_module_prefix {
            return destination.to_path_buf();
        }
        let stem = destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let renamed = destination.with_file_name(format!("lib{}", stem));
        renamed.with_extension("so")
    }

    /// Libraries to link, extended with propagated system libraries
    pub fn required_libraries(&self, libraries: &[BuildArtifact]) -> Vec<BuildArtifact> {
        let mut required = libraries.to_vec();
        if self.policy.propagate_system_libraries {
            for library in libraries.iter().filter(|l| l.kind == ArtifactKind::StaticLibrary) {
                for system in &library.system_libraries {
                    if !required.contains(system) {
                        required.push(system.clone());
                    }
                }
            }
        }
        required
    }

    /// Command line flags for one input library
    pub fn library_flags(&self, library: &BuildArtifact) -> Vec<String> {
        let reference = if library.is_system() {
            format!("-l{}", library.path.to_string_lossy())
        } else {
            library.path.to_string_lossy().to_string()
        };

        let whole_archive = self
            .policy
            .whole_archive_entry
            .as_deref()
            .map(|entry| library.is_entry_archive(entry))
            .unwrap_or(false);

        if whole_archive {
            vec![
                "-Wl,--whole-archive".to_string(),
                reference,
                "-Wl,--no-whole-archive".to_string(),
            ]
        } else {
            vec![reference]
        }
    }

    /// Plan linking `objects` and `libraries` into `destination`
    pub fn plan(
        &self,
        ndk: &AndroidNdk,
        target_flags: &[String],
        destination: &Path,
        objects: &[PathBuf],
        libraries: &[BuildArtifact],
    ) -> LinkPlan {
        let output = self.output_path(destination);
        let mut inputs: Vec<PathBuf> = objects.to_vec();

        match self.mode {
            LinkMode::Archive => {
                let mut args = vec!["rcs".to_string(), output.to_string_lossy().to_string()];
                args.extend(objects.iter().map(|o| o.to_string_lossy().to_string()));

                // system libraries ride along so whoever links this archive links them too
                let mut systems: Vec<BuildArtifact> = Vec::new();
                for library in libraries {
                    let carried = if library.is_system() {
                        vec![library.clone()]
                    } else {
                        library.system_libraries.clone()
                    };
                    for system in carried {
                        if !systems.contains(&system) {
                            systems.push(system);
                        }
                    }
                }

                LinkPlan {
                    executable: ndk.llvm_ar(),
                    args,
                    inputs,
                    artifact: BuildArtifact::static_library(output).with_system_libraries(systems),
                }
            }
            LinkMode::Shared => {
                let soname = output
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();

                let mut args: Vec<String> = target_flags.to_vec();
                args.push("-shared".to_string());
                args.push(format!("-Wl,-soname,{}", soname));
                args.push("-o".to_string());
                args.push(output.to_string_lossy().to_string());
                args.extend(objects.iter().map(|o| o.to_string_lossy().to_string()));

                for library in self.required_libraries(libraries) {
                    args.extend(self.library_flags(&library));
                    if !library.is_system() {
                        inputs.push(library.path.clone());
                    }
                }

                if self.policy.static_cpp_runtime {
                    args.push("-static-libstdc++".to_string());
                }

                LinkPlan {
                    executable: ndk.clangxx(),
                    args,
                    inputs,
                    artifact: BuildArtifact::dynamic_library(output),
                }
            }
        }
    }
}

/// Role of an output format within a toolchain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FormatKind {
    StaticLibrary,
    DynamicLibrary,
    /// Library of the complementary architecture, deployed into the main project
    MainModule,
    /// Library a package project is built around
    Package,
}

/// Output format: extension plus the linker producing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeProgramFormat {
    pub kind: FormatKind,
    pub extension: &'static str,
    pub linker: Linker,
}

impl NativeProgramFormat {
    pub fn static_library() -> Self {
        Self {
            kind: FormatKind::StaticLibrary,
            extension: "a",
            linker: Linker::archive(),
        }
    }

    pub fn dynamic_library(static_cpp_runtime: bool) -> Self {
        Self {
            kind: FormatKind::DynamicLibrary,
            extension: "so",
            linker: Linker::shared(LinkerPolicy {
                static_cpp_runtime,
                ..Default::default()
            }),
        }
    }

    fn entry_module_policy(static_cpp_runtime: bool) -> LinkerPolicy {
        LinkerPolicy {
            whole_archive_entry: Some(ENTRY_LIBRARY.to_string()),
            main_module_prefix: true,
            propagate_system_libraries: true,
            static_cpp_runtime,
        }
    }

    pub fn main_module(static_cpp_runtime: bool) -> Self {
        Self {
            kind: FormatKind::MainModule,
            extension: "so",
            linker: Linker::shared(Self::entry_module_policy(static_cpp_runtime)),
        }
    }

    /// Requested as `<name>.apk`; the linked library itself becomes `lib<name>.so`
    pub fn package(static_cpp_runtime: bool) -> Self {
        Self {
            kind: FormatKind::Package,
            extension: "apk",
            linker: Linker::shared(Self::entry_module_policy(static_cpp_runtime)),
        }
    }

    /// `<dir>/<name>.<extension>`
    pub fn destination(&self, dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.{}", name, self.extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndk::NdkLocation;

    fn ndk() -> AndroidNdk {
        AndroidNdk::with_location(NdkLocation::Detected("/ndk".into()))
    }

    #[test]
    fn test_main_module_rename() {
        let format = NativeProgramFormat::package(true);
        let destination = format.destination(Path::new("out/game"), "game");
        assert_eq!(destination, PathBuf::from("out/game/game.apk"));
        assert_eq!(format.linker.output_path(&destination), PathBuf::from("out/game/libgame.so"));

        let plain = NativeProgramFormat::dynamic_library(false);
        assert_eq!(plain.linker.output_path(Path::new("out/libfoo.so")), PathBuf::from("out/libfoo.so"));
    }

    #[test]
    fn test_system_libraries_propagate_once() {
        let archive = BuildArtifact::static_library("out/libcore.a")
            .with_system_libraries(vec![BuildArtifact::system("log"), BuildArtifact::system("android")]);
        let libraries = vec![archive, BuildArtifact::system("log")];

        let linker = NativeProgramFormat::main_module(true).linker;
        let required = linker.required_libraries(&libraries);
        assert_eq!(required.len(), 3);
        assert_eq!(required[2], BuildArtifact::system("android"));

        let plain = NativeProgramFormat::dynamic_library(true).linker;
        assert_eq!(plain.required_libraries(&libraries).len(), 2);
    }

    #[test]
    fn test_entry_archive_is_whole_archive() {
        let linker = NativeProgramFormat::package(false).linker;
        let entry = BuildArtifact::static_library(format!("out/lib{}.a", ENTRY_LIBRARY));
        assert_eq!(
            linker.library_flags(&entry),
            vec![
                "-Wl,--whole-archive".to_string(),
                format!("out/lib{}.a", ENTRY_LIBRARY),
                "-Wl,--no-whole-archive".to_string(),
            ]
        );
        assert_eq!(linker.library_flags(&BuildArtifact::system("log")), vec!["-llog".to_string()]);
    }

    #[test]
    fn test_archive_plan_records_system_libraries() {
        let format = NativeProgramFormat::static_library();
        let plan = format
            .linker
            .plan(
                &ndk(),
                &[],
                Path::new("out/libcore.a"),
                &[PathBuf::from("obj/a.o")],
                &[BuildArtifact::system("log")],
            );
        assert!(plan.executable.to_string_lossy().contains("llvm-ar"));
        assert_eq!(plan.args[0], "rcs");
        assert_eq!(plan.artifact.system_libraries, vec![BuildArtifact::system("log")]);
        assert_eq!(plan.inputs, vec![PathBuf::from("obj/a.o")]);
    }

    #[test]
    fn test_shared_plan() {
        let format = NativeProgramFormat::main_module(true);
        let archive = BuildArtifact::static_library("out/libcore.a")
            .with_system_libraries(vec![BuildArtifact::system("log")]);
        let plan = format
            .linker
            .plan(
                &ndk(),
                &["--target=aarch64-linux-android21".to_string()],
                Path::new("out/arm64/game.so"),
                &[PathBuf::from("obj/main.o")],
                &[archive],
            );
        assert_eq!(plan.output(), Path::new("out/arm64/libgame.so"));
        assert!(plan.args.contains(&"-Wl,-soname,libgame.so".to_string()));
        assert!(plan.args.contains(&"-llog".to_string()));
        assert_eq!(plan.args.last().map(String::as_str), Some("-static-libstdc++"));
        assert_eq!(plan.inputs, vec![PathBuf::from("obj/main.o"), PathBuf::from("out/libcore.a")]);
        assert!(plan.artifact.is_dynamic());
    }

    #[test]
    fn test_placeholder_ndk_still_plans_link() {
        let format = NativeProgramFormat::dynamic_library(false);
        let plan = format
            .linker
            .plan(&AndroidNdk::placeholder(), &[], Path::new("out/libx.so"), &[], &[]);
        assert!(plan.executable.starts_with(crate::ndk::PLACEHOLDER_NDK_ROOT));
        assert_eq!(plan.output(), Path::new("out/libx.so"));
    }
}
