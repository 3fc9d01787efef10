//! CLI commands for apkforge
//!
//! Provides command-line interface functionality for automation and scripting.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use apkforge_android_toolchain::{is_valid_dir, BuildArtifact, CodeGen, ToolchainRegistry, ENTRY_LIBRARY};
use apkforge_build_engine::{Deployable, DeployableFile};
use apkforge_core::{BuildSettings, ForgeError, SystemProcessRunner};
use apkforge_device_bridge::{parse_logs, DeviceController, LaunchTarget, LogFilter, LogLevel};
use tracing::info;

use crate::planner::{plan_build, strict, BuildPlan, BuildRequest};

/// System libraries the entry archive needs at link time
const ENTRY_SYSTEM_LIBRARIES: [&str; 4] = ["android", "log", "EGL", "GLESv3"];

fn controller(settings: &BuildSettings, serial: Option<&str>) -> Result<DeviceController<SystemProcessRunner>> {
    let registry = ToolchainRegistry::new(settings);
    let mut controller = DeviceController::from_tools(SystemProcessRunner, registry.tools()).map_err(ForgeError::from)?;
    if let Some(serial) = serial {
        controller = controller.with_serial(serial);
    }
    Ok(controller)
}

/// Plan command options
#[derive(Debug, Clone)]
pub struct PlanCommand {
    pub settings: PathBuf,
    pub app_name: String,
    pub codegen: CodeGen,
    pub sources: Vec<PathBuf>,
    pub include_dirs: Vec<PathBuf>,
    /// Static entry archive linked into the app library
    pub entry_library: Option<PathBuf>,
    pub native_libraries: Vec<PathBuf>,
    pub support_files: Vec<PathBuf>,
    pub build_dir: PathBuf,
    pub target_dir: PathBuf,
    pub template_dir: Option<PathBuf>,
    /// Graph JSON destination; stdout when absent
    pub output: Option<PathBuf>,
    pub strict: bool,
}

impl PlanCommand {
    fn request(&self) -> BuildRequest {
        let mut request = BuildRequest::new(&self.app_name, self.codegen);
        request.program.sources.extend(self.sources.iter().cloned());
        request.program.include_dirs.extend(self.include_dirs.iter().cloned());
        if let Some(ref entry) = self.entry_library {
            let systems = ENTRY_SYSTEM_LIBRARIES.iter().map(|name| BuildArtifact::system(name)).collect();
            let library = if entry.extension().map(|e| e == "so").unwrap_or(false) {
                request.use_static = false;
                BuildArtifact::dynamic_library(entry)
            } else {
                BuildArtifact::static_library(entry)
            };
            request.program.libraries.push(library.with_system_libraries(systems));
        }
        request.native_libraries = self.native_libraries.clone();
        if !request.use_static {
            if let Some(ref entry) = self.entry_library {
                request.native_libraries.push(entry.clone());
            }
        }
        request.support_files = self
            .support_files
            .iter()
            .map(|path| Deployable::File(DeployableFile::new(path)))
            .collect();
        request.build_dir = self.build_dir.clone();
        request.target_dir = self.target_dir.clone();
        if let Some(ref dir) = self.template_dir {
            request.template_dir = dir.clone();
        }
        request
    }

    /// Execute the plan command
    pub fn execute(&self) -> Result<BuildPlan> {
        let settings = BuildSettings::load(&self.settings);
        let registry = ToolchainRegistry::new(&settings);

        info!("Planning {} ({})", self.app_name, self.codegen);
        let plan = plan_build(&settings, &registry, &self.request())?;
        let plan = if self.strict { strict(plan)? } else { plan };

        let json = plan.graph.to_json()?;
        match self.output {
            Some(ref path) => {
                std::fs::write(path, json).with_context(|| format!("writing build graph to {:?}", path))?;
                println!("Build graph written to {:?}", path);
            }
            None => println!("{}", json),
        }

        println!("Artifact: {:?}", plan.package.artifact);
        if let Some(task) = plan.package.gradle_task {
            println!("Gradle task: {}", task);
        }
        for diagnostic in plan.diagnostics() {
            println!("warning: {}", diagnostic);
        }
        Ok(plan)
    }
}

/// Run command options
#[derive(Debug, Clone)]
pub struct RunCommand {
    pub settings: PathBuf,
    pub package: PathBuf,
    pub device_serial: Option<String>,
}

impl RunCommand {
    /// Execute the run command
    pub async fn execute(&self) -> Result<()> {
        let settings = BuildSettings::load(&self.settings);
        if !settings.can_run() {
            bail!("Exported projects cannot be run; build {:?} with Gradle first", self.package);
        }

        let controller = controller(&settings, self.device_serial.as_deref())?;
        let target = LaunchTarget::from_settings(&settings);
        info!("Running {:?} as {}", self.package, target.component);
        controller
            .run(&self.package, &target, settings.export.target_type)
            .await
            .map_err(ForgeError::from)?;
        println!("Launched {}", target.component);
        Ok(())
    }
}

/// Test command options
#[derive(Debug, Clone)]
pub struct TestCommand {
    pub settings: PathBuf,
    pub package: PathBuf,
    pub device_serial: Option<String>,
    /// Zero runs a headless test judged by the log marker
    pub timeout: Duration,
    /// Only print log lines at or above this level
    pub min_level: Option<LogLevel>,
    /// Only print log lines with one of these tags
    pub tags: Vec<String>,
    /// Only print log lines containing this text
    pub message_contains: Option<String>,
}

impl TestCommand {
    fn log_filter(&self) -> LogFilter {
        let mut filter = self.min_level.map(LogFilter::min_level).unwrap_or_default();
        for tag in &self.tags {
            filter = filter.with_tag(tag);
        }
        match self.message_contains {
            Some(ref needle) => filter.with_message(needle),
            None => filter,
        }
    }

    /// Execute the test command, returning whether the run succeeded
    pub async fn execute(&self) -> Result<bool> {
        let settings = BuildSettings::load(&self.settings);
        let controller = controller(&settings, self.device_serial.as_deref())?;
        let target = LaunchTarget::from_settings(&settings);

        let output = controller
            .run_test_mode(&self.package, &target, self.timeout)
            .await
            .map_err(ForgeError::from)?;

        let filter = self.log_filter();
        let entries = parse_logs(&output.full_output);
        if entries.is_empty() {
            print!("{}", output.full_output);
        } else {
            for entry in entries.iter().filter(|e| filter.matches(e)) {
                println!("{}", entry.formatted());
            }
        }

        println!(
            "Test run {}",
            if output.succeeded { "succeeded" } else { "failed" }
        );
        Ok(output.succeeded)
    }
}

/// Device list command
#[derive(Debug, Clone)]
pub struct DevicesCommand {
    pub settings: PathBuf,
}

impl DevicesCommand {
    /// List all connected devices
    pub async fn execute(&self) -> Result<()> {
        let settings = BuildSettings::load(&self.settings);
        let devices = controller(&settings, None)?
            .list_devices()
            .await
            .map_err(ForgeError::from)?;

        if devices.is_empty() {
            println!("No devices connected");
        } else {
            println!("Connected devices:");
            for device in devices {
                println!("  {} - {:?}", device.display_name(), device.state);
            }
        }

        Ok(())
    }
}

/// Toolchain check command
#[derive(Debug, Clone)]
pub struct DoctorCommand {
    pub settings: PathBuf,
}

impl DoctorCommand {
    /// Report the resolved external tools
    pub fn execute(&self) -> Result<()> {
        let settings = BuildSettings::load(&self.settings);
        let registry = ToolchainRegistry::new(&settings);
        let tools = registry.tools();

        println!("Android Development Environment Status:");
        println!("========================================");

        let report = |name: &str, path: &Path| {
            if is_valid_dir(path) {
                println!("✓ {}: {:?}", name, path);
            } else {
                println!("✗ {}: Not found", name);
            }
        };
        report("JDK", tools.java_path.as_path());
        report("Android SDK", tools.sdk_path.as_path());
        report("Android NDK", tools.ndk_path.as_path());
        report("Gradle", tools.gradle_path.as_path());

        match tools.gradle_launcher_jar() {
            Some(jar) => println!("✓ Gradle launcher: {:?}", jar),
            None => println!("✗ Gradle launcher: Not found"),
        }
        match tools.bundletool_jar() {
            Ok(jar) => println!("✓ bundletool: {:?}", jar),
            Err(_) => println!("✗ bundletool: Not found"),
        }

        println!();
        println!("Package: {}", settings.package_name());
        println!("Architectures: {:?}", settings.architectures.list());
        println!("Fat APK: {}", settings.is_fat_apk());
        println!("App bundle: {}", settings.build_app_bundle());
        println!("Export project: {}", settings.export_project());
        println!("Entry library: lib{}", ENTRY_LIBRARY);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apkforge_device_bridge::LogEntry;

    #[test]
    fn test_log_filter_combines_options() {
        let command = TestCommand {
            settings: PathBuf::from("apkforge.json"),
            package: PathBuf::from("build/game.apk"),
            device_serial: None,
            timeout: Duration::ZERO,
            min_level: Some(LogLevel::Info),
            tags: vec!["Game".to_string()],
            message_contains: Some("suite".to_string()),
        };
        let filter = command.log_filter();

        let entry = |line: &str| LogEntry::parse(line).unwrap();
        assert!(filter.matches(&entry("10-18 12:00:00.000   1   2 I Game: Test suite: SUCCESS")));
        assert!(!filter.matches(&entry("10-18 12:00:00.000   1   2 I Other: Test suite: SUCCESS")));
        assert!(!filter.matches(&entry("10-18 12:00:00.000   1   2 I Game: frame 12")));
        assert!(!filter.matches(&entry("10-18 12:00:00.000   1   2 D Game: Test suite: SUCCESS")));
    }
}
