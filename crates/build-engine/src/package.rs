//! Package Orchestrator
//!
//! Turns a linked package library plus its deployables into an installable
//! APK or app bundle (or an exported Gradle project), declaring every copy,
//! generated file and the Gradle invocation in the build graph.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use apkforge_android_toolchain::{
    AndroidToolchain, CodeGen, ExternalToolConfig, TargetRole, ToolchainRegistry, ENTRY_LIBRARY,
};
use apkforge_core::{Architecture, BuildSettings};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::deploy::{native_library_dir, route, DeployKind, Deployable};
use crate::graph::{path_depth, quoted, Action, BuildGraph};
use crate::project::{ProjectTemplate, TemplateTokens, PROJECT_DESCRIPTOR};
use crate::BuildError;

/// Gradle output lines accepted without failing the action
pub const GRADLE_ALLOWED_OUTPUT: [&str; 2] = [":*", "BUILD SUCCESSFUL in *"];

const GRADLE_MAIN_CLASS: &str = "org.gradle.launcher.GradleMain";
const LOCAL_PROPERTIES: &str = "local.properties";
const LIBRARY_PATTERN: &str = r".*lib([\w\d_]+)\.so";
const KOTLIN_CLASSPATH: &str = "        classpath 'org.jetbrains.kotlin:kotlin-gradle-plugin:1.3.11'";
const KOTLIN_PLUGIN: &str = "apply plugin: 'kotlin-android'";

/// What to package; set once per package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagingParameters {
    pub app_name: String,
    pub codegen: CodeGen,
    /// Files shipped with the app, deployed after the package's own deployables
    pub support_files: Vec<Deployable>,
}

impl PackagingParameters {
    pub fn new(app_name: impl Into<String>, codegen: CodeGen) -> Self {
        Self {
            app_name: app_name.into(),
            codegen,
            support_files: Vec::new(),
        }
    }

    pub fn with_support_files(mut self, files: impl IntoIterator<Item = Deployable>) -> Self {
        self.support_files.extend(files);
        self
    }
}

/// Settings, tools and template shared by every package of a build
#[derive(Clone, Copy)]
pub struct PackageContext<'a> {
    pub settings: &'a BuildSettings,
    pub registry: &'a ToolchainRegistry,
    pub template: &'a ProjectTemplate,
}

/// Result of deploying a package
#[derive(Debug)]
pub struct PackageOutput {
    /// Final `.apk`/`.aab`, or the project directory in export mode
    pub artifact: PathBuf,
    pub project_dir: PathBuf,
    /// Gradle task invoked; `None` when the project is only exported
    pub gradle_task: Option<&'static str>,
    /// Problems that did not stop graph construction
    pub diagnostics: Vec<BuildError>,
}

/// A linked package library waiting to be turned into an app
#[derive(Debug)]
pub struct AndroidPackage {
    toolchain: Arc<AndroidToolchain>,
    library: PathBuf,
    deployables: Vec<Deployable>,
    required_artifacts: Vec<PathBuf>,
    parameters: Option<PackagingParameters>,
    packaged: bool,
}

impl AndroidPackage {
    pub fn new(toolchain: Arc<AndroidToolchain>, library: impl Into<PathBuf>) -> Self {
        Self {
            toolchain,
            library: library.into(),
            deployables: Vec::new(),
            required_artifacts: Vec::new(),
            parameters: None,
            packaged: false,
        }
    }

    pub fn toolchain(&self) -> &AndroidToolchain {
        &self.toolchain
    }

    pub fn library(&self) -> &Path {
        &self.library
    }

    pub fn add_deployable(&mut self, deployable: Deployable) {
        self.deployables.push(deployable);
    }

    pub fn deployables(&self) -> &[Deployable] {
        &self.deployables
    }

    /// Extra inputs of the Gradle action, e.g. complementary libraries
    pub fn add_required_artifact(&mut self, path: impl Into<PathBuf>) {
        self.required_artifacts.push(path.into());
    }

    pub fn required_artifacts(&self) -> &[PathBuf] {
        &self.required_artifacts
    }

    pub fn set_packaging_parameters(&mut self, parameters: PackagingParameters) -> Result<(), BuildError> {
        if self.parameters.is_some() || self.packaged {
            return Err(BuildError::InvalidState(format!(
                "Packaging parameters for {:?} are already set",
                self.library
            )));
        }
        self.parameters = Some(parameters);
        Ok(())
    }

    /// Gradle project directory: next to the library, or `<target>/<app>` when exporting
    pub fn project_dir(&self, settings: &BuildSettings, target_dir: &Path) -> Result<PathBuf, BuildError> {
        if settings.export_project() {
            let parameters = self.parameters.as_ref().ok_or_else(|| {
                BuildError::InvalidState("Exported project directory needs packaging parameters".into())
            })?;
            Ok(target_dir.join(&parameters.app_name))
        } else {
            Ok(self.library.parent().unwrap_or(Path::new("")).join("gradle"))
        }
    }

    /// Describe the whole packaging step into `graph`.
    ///
    /// Consumes the packaging parameters; a package deploys once.
    pub fn deploy_to(
        &mut self,
        graph: &mut BuildGraph,
        context: PackageContext<'_>,
        target_dir: &Path,
    ) -> Result<PackageOutput, BuildError> {
        let project_dir = self.project_dir(context.settings, target_dir)?;
        let parameters = self.parameters.take().ok_or_else(|| {
            BuildError::InvalidState(format!("No packaging parameters set for {:?}", self.library))
        })?;
        self.packaged = true;

        let settings = context.settings;
        let export = settings.export_project();
        let bundle = settings.build_app_bundle();
        info!(
            "Packaging {} [{}] into {:?}{}",
            parameters.app_name,
            self.toolchain.key,
            project_dir,
            if export { " (export only)" } else { "" }
        );

        let mut diagnostics = Vec::new();

        // native libraries and support files
        let jni_dir = native_library_dir(&project_dir, self.toolchain.abi_name());
        let deployed_library = graph.add_copy_action(jni_dir.join(file_name(&self.library)), &self.library)?;

        let deployables: Vec<Deployable> = self
            .deployables
            .iter()
            .chain(parameters.support_files.iter())
            .cloned()
            .collect();
        let mut deployed = Vec::with_capacity(deployables.len());
        for deployable in &deployables {
            let destination = match deployable {
                Deployable::File(file) => route(file, &project_dir, target_dir),
                Deployable::NativeLibrary(path) => jni_dir.join(file_name(path)),
            };
            deployed.push(graph.add_copy_action(destination, deployable.path())?);
        }

        // gradle project
        let abi = match abi_filters(self.toolchain.role(), self.toolchain.architecture()) {
            Ok(filters) => filters,
            Err(e) => {
                warn!("{}", e);
                diagnostics.push(e);
                String::new()
            }
        };
        let api_levels = settings.api_levels;
        let uses_kotlin = deployables
            .iter()
            .any(|d| matches!(d, Deployable::File(f) if f.kind() == DeployKind::KotlinSource));
        let tokens = TemplateTokens::new()
            .with("LOADLIBRARIES", load_libraries(&parameters.app_name, &deployables))
            .with("LOWERNAME", parameters.app_name.replace('-', "").to_lowercase())
            .with("APPNAME", parameters.app_name.clone())
            .with("PACKAGENAME", settings.package_name())
            .with("VERSIONCODE", settings.bundle_version_code.to_string())
            .with("VERSIONNAME", settings.general.version.clone())
            .with("MINSDK", api_levels.min_api_level().to_string())
            .with("TARGETSDK", api_levels.resolved_target_api_level().to_string())
            .with("ABIFILTERS", abi)
            .with("DEPENDENCIES", gradle_dependencies(&deployables))
            .with("KOTLINCLASSPATH", if uses_kotlin { KOTLIN_CLASSPATH } else { "" })
            .with("KOTLINPLUGIN", if uses_kotlin { KOTLIN_PLUGIN } else { "" });
        let project = context.template.synthesize(graph, &project_dir, &tokens)?;

        let tools = context.registry.tools();
        let local_properties = project_dir.join(LOCAL_PROPERTIES);
        graph.add_write_text_action(&local_properties, local_properties_content(tools))?;

        if export {
            let mut files = project.files.clone();
            files.push(deployed_library);
            files.extend(deployed);
            files.push(local_properties);
            project.wire_descriptor(graph, &files);
            return Ok(PackageOutput {
                artifact: project_dir.clone(),
                project_dir,
                gradle_task: None,
                diagnostics,
            });
        }

        // gradle invocation
        let task = gradle_task(parameters.codegen, bundle);
        let gradle_output = gradle_output(&project_dir, parameters.codegen, bundle);
        let command = gradle_command(tools, &project_dir, task, &mut diagnostics);

        let mut inputs = self.required_artifacts.clone();
        inputs.push(deployed_library);
        inputs.extend(deployed);
        inputs.extend(parameters.support_files.iter().map(|d| d.path().to_path_buf()));
        graph.add_action(
            Action::command(format!("Build Gradle project [{}]", self.toolchain.key), command)
                .inputs(inputs)
                .outputs([gradle_output.clone()])
                .allowed_output(GRADLE_ALLOWED_OUTPUT)
                .env(context.registry.environment().vars()),
        )?;
        project.wire_dependencies(graph, &gradle_output);
        graph.add_dependency(&gradle_output, &local_properties);

        let artifact_name = format!("{}{}", parameters.app_name, settings.executable_extension());
        let artifact = graph.add_copy_action(target_dir.join(artifact_name), &gradle_output)?;
        debug!("Package artifact {:?}", artifact);

        Ok(PackageOutput {
            artifact,
            project_dir,
            gradle_task: Some(task),
            diagnostics,
        })
    }
}

fn file_name(path: &Path) -> PathBuf {
    path.file_name().map(PathBuf::from).unwrap_or_default()
}

/// Deploy a complementary architecture's library into the primary project.
///
/// The primary descriptor is ordered after the copy so Gradle never runs
/// before every architecture's library is in place. Returns the deployed
/// path, which belongs in the primary package's required artifacts.
pub fn deploy_complementary(
    graph: &mut BuildGraph,
    toolchain: &AndroidToolchain,
    library: &Path,
    primary_project_dir: &Path,
) -> Result<PathBuf, BuildError> {
    if toolchain.role() != TargetRole::Complementary {
        return Err(BuildError::InvalidState(format!(
            "{} is not a complementary toolchain",
            toolchain.key
        )));
    }
    let destination = native_library_dir(primary_project_dir, toolchain.abi_name()).join(file_name(library));
    let deployed = graph.add_copy_action(destination, library)?;
    graph.add_dependency(primary_project_dir.join(PROJECT_DESCRIPTOR), &deployed);
    info!("Deployed complementary library {:?}", deployed);
    Ok(deployed)
}

/// `abiFilters` value for a toolchain
pub fn abi_filters(role: TargetRole, architecture: Architecture) -> Result<String, BuildError> {
    match (role, architecture) {
        (TargetRole::Single, Architecture::ARM64) => Ok("'arm64-v8a'".to_string()),
        (TargetRole::Single, Architecture::ARMv7) => Ok("'armeabi-v7a'".to_string()),
        (TargetRole::Main, Architecture::ARMv7) => Ok("'armeabi-v7a', 'arm64-v8a'".to_string()),
        (role, architecture) => Err(BuildError::UnsupportedConfiguration(format!(
            "No ABI filter for {} toolchain with {}",
            role, architecture
        ))),
    }
}

/// `System.loadLibrary` lines for the activity.
///
/// Without a dynamic entry library everything is linked into the app's own
/// library; otherwise every deployed `lib<name>.so` is loaded.
pub fn load_libraries(app_name: &str, deployables: &[Deployable]) -> String {
    let entry = format!("lib{}.so", ENTRY_LIBRARY);
    let has_entry = deployables
        .iter()
        .any(|d| d.path().to_string_lossy().contains(&entry));
    if !has_entry {
        return load_statement(app_name);
    }

    let pattern = match Regex::new(LIBRARY_PATTERN) {
        Ok(pattern) => pattern,
        Err(e) => {
            warn!("Invalid library pattern: {}", e);
            return String::new();
        }
    };
    deployables
        .iter()
        .filter_map(|d| {
            let path = d.path().to_string_lossy().to_string();
            pattern
                .captures(&path)
                .and_then(|c| c.get(1))
                .map(|m| load_statement(m.as_str()))
        })
        .collect()
}

fn load_statement(name: &str) -> String {
    format!("        System.loadLibrary(\"{}\");\n", name)
}

/// `dependencies { ... }` block for deployed `.aar`/`.jar` files; empty without any
fn gradle_dependencies(deployables: &[Deployable]) -> String {
    let libraries: Vec<String> = deployables
        .iter()
        .filter_map(|d| match d {
            Deployable::File(f) if f.kind() == DeployKind::GradleLibrary => {
                Some(format!("        compile(name:'{}', ext:'{}')\n", f.stem(), f.extension()))
            }
            _ => None,
        })
        .collect();
    if libraries.is_empty() {
        return String::new();
    }
    format!("    dependencies {{\n{}    }}\n", libraries.concat())
}

fn local_properties_content(tools: &ExternalToolConfig) -> String {
    format!(
        "sdk.dir={}\nndk.dir={}\n",
        tools.sdk_path.display(),
        tools.ndk_path.display()
    )
}

/// Gradle task for a configuration; only release code generation builds release
pub fn gradle_task(codegen: CodeGen, bundle: bool) -> &'static str {
    match (bundle, codegen.is_release()) {
        (false, false) => "assembleDebug",
        (false, true) => "assembleRelease",
        (true, false) => "bundleDebug",
        (true, true) => "bundleRelease",
    }
}

/// File Gradle writes for a configuration
pub fn gradle_output(project_dir: &Path, codegen: CodeGen, bundle: bool) -> PathBuf {
    let variant = if codegen.is_release() { "release" } else { "debug" };
    let (kind, extension) = if bundle { ("bundle", "aab") } else { ("apk", "apk") };
    project_dir
        .join("build/outputs")
        .join(kind)
        .join(variant)
        .join(format!("gradle-{}.{}", variant, extension))
}

/// `cd` into the project, run the launcher, `cd` back to the graph root.
/// An absolute project directory has no relative way back, so the launcher
/// runs in a subshell instead. Missing tools still yield a command; the
/// problem lands in `diagnostics`.
fn gradle_command(
    tools: &ExternalToolConfig,
    project_dir: &Path,
    task: &str,
    diagnostics: &mut Vec<BuildError>,
) -> String {
    let java = match tools.java_executable() {
        Ok(java) => java,
        Err(e) => {
            warn!("{}", e);
            diagnostics.push(BuildError::Configuration(e.to_string()));
            PathBuf::from("java")
        }
    };
    let launcher = match tools.gradle_launcher_jar() {
        Some(jar) => jar,
        None => {
            let message = format!("Failed to find gradle launcher jar in {:?}", tools.gradle_path.join("lib"));
            warn!("{}", message);
            diagnostics.push(BuildError::Configuration(message));
            tools.gradle_path.join("lib").join("gradle-launcher.jar")
        }
    };
    let launch = format!(
        "cd {} && {} -classpath {} {} {}",
        quoted(project_dir),
        quoted(&java),
        quoted(&launcher),
        GRADLE_MAIN_CLASS,
        task
    );
    if project_dir.is_absolute() {
        return format!("({})", launch);
    }
    let back = PathBuf::from("../".repeat(path_depth(project_dir)));
    format!("{} && cd {}", launch, quoted(&back))
}
