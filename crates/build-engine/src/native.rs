//! Native Program Actions
//!
//! Describes compiling and linking one native program with a toolchain:
//! one compile action per source, one link action for the output format.

use std::path::{Path, PathBuf};

use apkforge_android_toolchain::{AndroidToolchain, BuildArtifact, CodeGen, FormatKind, NativeProgramFormat};
use tracing::{debug, warn};

use crate::graph::{quoted, Action, BuildGraph};
use crate::BuildError;

/// Output format to link a program with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramOutput {
    /// The toolchain's dynamic library format (`.a` when linking statically)
    Library,
    /// The toolchain's executable format: main module or package library
    Executable,
}

/// Sources and libraries of one native program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeProgram {
    pub name: String,
    pub sources: Vec<PathBuf>,
    pub include_dirs: Vec<PathBuf>,
    pub defines: Vec<String>,
    pub libraries: Vec<BuildArtifact>,
}

impl NativeProgram {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            include_dirs: Vec::new(),
            defines: Vec::new(),
            libraries: Vec::new(),
        }
    }

    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(path.into());
        self
    }

    pub fn include_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_dirs.push(path.into());
        self
    }

    pub fn define(mut self, define: impl Into<String>) -> Self {
        self.defines.push(define.into());
        self
    }

    pub fn library(mut self, library: BuildArtifact) -> Self {
        self.libraries.push(library);
        self
    }
}

fn is_cpp(source: &Path) -> bool {
    matches!(
        source.extension().and_then(|e| e.to_str()),
        Some("cpp") | Some("cc") | Some("cxx")
    )
}

fn join_command(executable: &Path, args: &[String]) -> String {
    let mut line = quoted(executable);
    for arg in args {
        line.push(' ');
        if arg.contains(' ') {
            line.push_str(&format!("\"{}\"", arg));
        } else {
            line.push_str(arg);
        }
    }
    line
}

/// Declare compile and link actions for `program` under `out_dir`.
///
/// Objects go to `<out_dir>/obj/<program>/<source file name>.o`. With a
/// placeholder NDK the actions are still declared; they fail when run.
pub fn setup_native_program(
    graph: &mut BuildGraph,
    toolchain: &AndroidToolchain,
    program: &NativeProgram,
    codegen: CodeGen,
    output: ProgramOutput,
    out_dir: &Path,
) -> Result<BuildArtifact, BuildError> {
    let format: &NativeProgramFormat = match output {
        ProgramOutput::Library => &toolchain.dynamic_library_format,
        ProgramOutput::Executable => &toolchain.executable_format,
    };

    if let Err(e) = toolchain.ndk.root() {
        warn!("{}; building {} [{}] will fail", e, program.name, toolchain.key);
    }

    let mut flags = toolchain.compiler.flags_for(codegen);
    flags.extend(program.defines.iter().map(|d| format!("-D{}", d)));
    flags.extend(program.include_dirs.iter().map(|i| format!("-I{}", i.display())));

    let obj_dir = out_dir.join("obj").join(&program.name);
    let mut objects = Vec::with_capacity(program.sources.len());
    for source in &program.sources {
        let file_name = source.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let object = obj_dir.join(format!("{}.o", file_name));
        let compiler = if is_cpp(source) {
            toolchain.ndk.clangxx()
        } else {
            toolchain.ndk.clang()
        };

        let mut args = flags.clone();
        args.push("-c".to_string());
        args.push(source.display().to_string());
        args.push("-o".to_string());
        args.push(object.display().to_string());

        graph.add_action(
            Action::command(format!("Compile {} [{}]", source.display(), toolchain.key), join_command(&compiler, &args))
                .inputs([source.clone()])
                .outputs([object.clone()]),
        )?;
        objects.push(object);
    }

    // the package library links for the same target as the compiled code
    let target_flags: Vec<String> = flags.iter().filter(|f| f.starts_with("--target=")).cloned().collect();
    let destination = match format.kind {
        FormatKind::StaticLibrary | FormatKind::DynamicLibrary => {
            out_dir.join(format!("lib{}.{}", program.name, format.extension))
        }
        FormatKind::MainModule | FormatKind::Package => format.destination(out_dir, &program.name),
    };
    let plan = format
        .linker
        .plan(&toolchain.ndk, &target_flags, &destination, &objects, &program.libraries);
    debug!("Linking {:?} with {} inputs", plan.output(), plan.inputs.len());

    graph.add_action(
        Action::command(
            format!("Link {} [{}]", plan.output().display(), toolchain.key),
            join_command(&plan.executable, &plan.args),
        )
        .inputs(plan.inputs.clone())
        .outputs([plan.output().to_path_buf()]),
    )?;

    Ok(plan.artifact)
}
