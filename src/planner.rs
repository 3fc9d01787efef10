//! Build planning
//!
//! Wires the toolchain registry, native program actions and the package
//! orchestrator into one build graph for the configured architectures.

use std::path::PathBuf;

use apkforge_android_toolchain::{CodeGen, TargetPlan, ToolchainKey, ToolchainRegistry};
use apkforge_build_engine::{
    deploy_complementary, setup_native_program, AndroidPackage, BuildError, BuildGraph, Deployable, NativeProgram,
    PackageContext, PackageOutput, PackagingParameters, ProgramOutput, ProjectTemplate,
};
use apkforge_core::{BuildSettings, Result};
use tracing::{info, warn};

/// Everything one packaging run needs besides the settings
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub app_name: String,
    pub codegen: CodeGen,
    /// Link the entry library statically into the app library
    pub use_static: bool,
    /// Compiled once per target architecture
    pub program: NativeProgram,
    /// Prebuilt shared libraries deployed next to the app library
    pub native_libraries: Vec<PathBuf>,
    pub support_files: Vec<Deployable>,
    /// Per-toolchain intermediate output
    pub build_dir: PathBuf,
    /// Where the final package lands
    pub target_dir: PathBuf,
    pub template_dir: PathBuf,
}

impl BuildRequest {
    pub fn new(app_name: impl Into<String>, codegen: CodeGen) -> Self {
        let app_name = app_name.into();
        Self {
            program: NativeProgram::new(app_name.clone()),
            app_name,
            codegen,
            use_static: true,
            native_libraries: Vec::new(),
            support_files: Vec::new(),
            build_dir: PathBuf::from("build/intermediate"),
            target_dir: PathBuf::from("build"),
            template_dir: PathBuf::from(crate::DEFAULT_TEMPLATE_DIR),
        }
    }
}

/// Described build, ready to hand to the engine
#[derive(Debug)]
pub struct BuildPlan {
    pub graph: BuildGraph,
    pub toolchains: Vec<ToolchainKey>,
    pub package: PackageOutput,
}

impl BuildPlan {
    pub fn diagnostics(&self) -> &[BuildError] {
        &self.package.diagnostics
    }
}

/// Describe compiling, linking and packaging `request` for `settings`
pub fn plan_build(settings: &BuildSettings, registry: &ToolchainRegistry, request: &BuildRequest) -> Result<BuildPlan> {
    let targets = TargetPlan::from_architectures(settings.architectures)?;
    let template = ProjectTemplate::new(&request.template_dir);
    let mut graph = BuildGraph::new();

    let primary = registry.get_toolchain(request.use_static, targets.primary());
    let library = setup_native_program(
        &mut graph,
        &primary,
        &request.program,
        request.codegen,
        ProgramOutput::Executable,
        &request.build_dir.join(primary.key.to_string()),
    )?;

    let mut package = AndroidPackage::new(primary.clone(), &library.path);
    package.set_packaging_parameters(
        PackagingParameters::new(&request.app_name, request.codegen)
            .with_support_files(request.support_files.iter().cloned()),
    )?;
    for native in &request.native_libraries {
        package.add_deployable(Deployable::NativeLibrary(native.clone()));
    }

    if let Some(key) = targets.complementary() {
        let complementary = registry.get_toolchain(request.use_static, key);
        let module = setup_native_program(
            &mut graph,
            &complementary,
            &request.program,
            request.codegen,
            ProgramOutput::Executable,
            &request.build_dir.join(key.to_string()),
        )?;
        let project_dir = package.project_dir(settings, &request.target_dir)?;
        let deployed = deploy_complementary(&mut graph, &complementary, &module.path, &project_dir)?;
        package.add_required_artifact(deployed);
    }

    let context = PackageContext {
        settings,
        registry,
        template: &template,
    };
    let mut output = package.deploy_to(&mut graph, context, &request.target_dir)?;
    // every toolchain of a registry shares one NDK
    if let Err(e) = primary.ndk.root() {
        output.diagnostics.insert(0, BuildError::Toolchain(e));
    }
    for diagnostic in &output.diagnostics {
        warn!("{}", diagnostic);
    }

    graph.validate().map_err(BuildError::from)?;
    info!("Planned {} actions for {:?}", graph.len(), output.artifact);

    Ok(BuildPlan {
        graph,
        toolchains: targets.keys(),
        package: output,
    })
}

/// Turn the first recorded diagnostic into an error
pub fn strict(mut plan: BuildPlan) -> Result<BuildPlan> {
    if plan.package.diagnostics.is_empty() {
        return Ok(plan);
    }
    Err(plan.package.diagnostics.remove(0).into())
}
