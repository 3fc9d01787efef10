//! Device Controller
//!
//! Installs, launches and tests packages on the single attached device. Every
//! step is one adb (or bundletool) invocation through a `ProcessRunner`;
//! success is decided by the classifiers in `markers`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use apkforge_android_toolchain::{ExternalToolConfig, ToolEnvironment};
use apkforge_core::{BuildSettings, Invocation, ProcessOutput, ProcessRunner, TargetType};
use tracing::{debug, info, warn};

use crate::bundletool::Bundletool;
use crate::device::{parse_device_list, Device};
use crate::markers;
use crate::DeviceError;

/// Wait used by test mode when no timeout is given
pub const DEFAULT_TEST_WAIT: Duration = Duration::from_millis(2000);

/// Launcher intent flags: NEW_TASK | RESET_TASK_IF_NEEDED
const LAUNCH_FLAGS: &str = "0x10200000";

/// Installed application identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    pub package_id: String,
    /// `<package>/<activity>`
    pub component: String,
}

impl LaunchTarget {
    pub fn new(package_id: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            component: component.into(),
        }
    }

    pub fn from_settings(settings: &BuildSettings) -> Self {
        Self::new(settings.package_name(), settings.launch_component())
    }
}

/// Controller of one device
pub struct DeviceController<R: ProcessRunner> {
    runner: R,
    adb: PathBuf,
    serial: Option<String>,
    bundletool: Option<Bundletool>,
}

impl<R: ProcessRunner> DeviceController<R> {
    pub fn new(runner: R, adb: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            adb: adb.into(),
            serial: None,
            bundletool: None,
        }
    }

    /// Controller for resolved tools; fails when there is no adb
    pub fn from_tools(runner: R, tools: &ExternalToolConfig) -> Result<Self, DeviceError> {
        let adb = tools.adb_path().map_err(|e| DeviceError::Configuration(e.to_string()))?;
        let mut controller = Self::new(runner, adb);
        if let (Ok(java), Ok(jar)) = (tools.java_executable(), tools.bundletool_jar()) {
            controller.bundletool = Some(Bundletool::new(java, jar).with_environment(ToolEnvironment::from_tools(tools)));
        }
        Ok(controller)
    }

    /// Address a specific device with `-s <serial>`
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    pub fn with_bundletool(mut self, bundletool: Bundletool) -> Self {
        self.bundletool = Some(bundletool);
        self
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb
    }

    fn adb_invocation<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Invocation {
        let mut invocation = Invocation::new(&self.adb);
        if let Some(ref serial) = self.serial {
            invocation = invocation.arg("-s").arg(serial.as_str());
        }
        invocation.args(args)
    }

    async fn adb<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Result<ProcessOutput, DeviceError> {
        let invocation = self.adb_invocation(args);
        debug!("adb {:?}", invocation.args);
        Ok(self.runner.run(&invocation).await?)
    }

    /// adb invocation whose failure only gets logged
    async fn adb_best_effort<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Option<ProcessOutput> {
        match self.adb(args).await {
            Ok(output) => Some(output),
            Err(e) => {
                warn!("Ignoring adb failure: {}", e);
                None
            }
        }
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>, DeviceError> {
        let output = self.adb(["devices", "-l"]).await?;
        Ok(parse_device_list(&output.full_output))
    }

    pub async fn query_installed(&self, package_id: &str) -> Result<bool, DeviceError> {
        let output = self.adb(["shell", "pm", "list", "packages", package_id]).await?;
        Ok(markers::is_package_listed(&output, package_id))
    }

    /// Remove a previous install, which may be signed with another key.
    /// Failures are tolerated: the following install is authoritative.
    pub async fn uninstall_if_installed(&self, package_id: &str) {
        let installed = match self.query_installed(package_id).await {
            Ok(installed) => installed,
            Err(e) => {
                warn!("Could not query installed packages: {}", e);
                return;
            }
        };
        if installed {
            info!("Uninstalling previous {}", package_id);
            if let Some(output) = self.adb_best_effort(["uninstall", package_id]).await {
                debug!("uninstall: {}", output.full_output.trim());
            }
        }
    }

    /// `adb install`; `succeeded` reflects the install marker, not the exit code
    pub async fn install(&self, package: &Path) -> Result<ProcessOutput, DeviceError> {
        info!("Installing {:?}", package);
        let path = package.to_string_lossy();
        let mut output = self.adb(["install", &*path]).await?;
        output.succeeded = markers::install_succeeded(&output);
        Ok(output)
    }

    /// Build an APK set from `bundle` and install it with bundletool
    pub async fn install_bundle(&self, bundle: &Path) -> Result<ProcessOutput, DeviceError> {
        let bundletool = self
            .bundletool
            .as_ref()
            .ok_or_else(|| DeviceError::Configuration("bundletool or JDK is not configured".into()))?;
        let dir = bundle.parent().unwrap_or_else(|| Path::new("."));
        let apks = Bundletool::apks_path(dir);

        info!("Building APK set from {:?}", bundle);
        let mut output = self
            .runner
            .run(&bundletool.build_apks(bundle, &apks).working_dir(dir))
            .await?;
        if !markers::bundletool_succeeded(&output) {
            return Err(DeviceError::ToolInvocation {
                action: "build APKS".into(),
                output: output.full_output,
            });
        }

        info!("Installing APK set {:?}", apks);
        output = self
            .runner
            .run(
                &bundletool
                    .install_apks(&apks, &self.adb, self.serial.as_deref())
                    .working_dir(dir),
            )
            .await?;
        output.succeeded = markers::bundletool_succeeded(&output);
        Ok(output)
    }

    /// Start the launcher activity; success is the process status
    pub async fn launch(&self, component: &str) -> Result<ProcessOutput, DeviceError> {
        info!("Launching {}", component);
        let mut output = self
            .adb([
                "shell",
                "am",
                "start",
                "-a",
                "android.intent.action.MAIN",
                "-c",
                "android.intent.category.LAUNCHER",
                "-f",
                LAUNCH_FLAGS,
                "-S",
                "-n",
                component,
            ])
            .await?;
        output.succeeded = markers::launch_succeeded(&output);
        Ok(output)
    }

    pub async fn clear_logs(&self) {
        self.adb_best_effort(["logcat", "-c"]).await;
    }

    /// `logcat -d`; `None` when logs could not be read
    pub async fn collect_logs(&self) -> Option<ProcessOutput> {
        self.adb_best_effort(["logcat", "-d"]).await
    }

    pub async fn force_stop(&self, package_id: &str) {
        self.adb_best_effort(["shell", "am", "force-stop", package_id]).await;
    }

    /// Reinstall `package` and launch it
    pub async fn run(
        &self,
        package: &Path,
        target: &LaunchTarget,
        target_type: TargetType,
    ) -> Result<ProcessOutput, DeviceError> {
        self.uninstall_if_installed(&target.package_id).await;

        match target_type {
            TargetType::AndroidAppBundle => {
                let output = self.install_bundle(package).await?;
                if !output.succeeded {
                    return Err(DeviceError::ToolInvocation {
                        action: "install APKS".into(),
                        output: output.full_output,
                    });
                }
            }
            TargetType::AndroidPackage => {
                let output = self.install(package).await?;
                if !output.succeeded {
                    return Err(DeviceError::ToolInvocation {
                        action: "install APK".into(),
                        output: output.full_output,
                    });
                }
            }
        }

        let output = self.launch(&target.component).await?;
        if !output.succeeded {
            return Err(DeviceError::ToolInvocation {
                action: "launch APK".into(),
                output: output.full_output,
            });
        }
        Ok(output)
    }

    /// Install, launch, wait, stop and collect logs.
    ///
    /// The app always gets the full wait (`DEFAULT_TEST_WAIT` when `timeout`
    /// is zero) and is force-stopped afterwards. The returned output carries
    /// the collected logs. With a zero timeout the run is a headless test and
    /// passes only if the logs contain the test suite marker; otherwise the
    /// launch result decides.
    pub async fn run_test_mode(
        &self,
        package: &Path,
        target: &LaunchTarget,
        timeout: Duration,
    ) -> Result<ProcessOutput, DeviceError> {
        let installed = self.install(package).await?;
        if !installed.succeeded {
            warn!("Install failed: {}", installed.full_output.trim());
            return Ok(installed);
        }

        self.clear_logs().await;
        let launched = self.launch(&target.component).await?;

        let wait = if timeout.is_zero() { DEFAULT_TEST_WAIT } else { timeout };
        debug!("Letting {} run for {:?}", target.package_id, wait);
        tokio::time::sleep(wait).await;

        self.force_stop(&target.package_id).await;

        let mut output = self.collect_logs().await.unwrap_or_default();
        output.succeeded = if timeout.is_zero() {
            markers::test_suite_succeeded(&output.full_output)
        } else {
            launched.succeeded
        };
        info!("Test run of {} succeeded: {}", target.package_id, output.succeeded);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apkforge_core::ProcessError;
    use parking_lot::Mutex;
    use std::time::Instant;

    /// Answers invocations by the first matching argument fragment and
    /// records every call
    #[derive(Default)]
    struct ScriptedRunner {
        script: Vec<(&'static str, ProcessOutput)>,
        calls: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        fn on(mut self, fragment: &'static str, exit_code: i32, output: &str) -> Self {
            self.script.push((fragment, ProcessOutput::new(exit_code, output)));
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().iter().map(|i| i.args.join(" ")).collect()
        }
    }

    impl ProcessRunner for ScriptedRunner {
        async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
            self.calls.lock().push(invocation.clone());
            let line = invocation.args.join(" ");
            Ok(self
                .script
                .iter()
                .find(|(fragment, _)| line.contains(fragment))
                .map(|(_, output)| output.clone())
                .unwrap_or_else(|| ProcessOutput::new(0, "")))
        }
    }

    fn target() -> LaunchTarget {
        LaunchTarget::new("com.example.game", "com.example.game/com.apkforge.player.PlayerActivity")
    }

    fn controller(runner: ScriptedRunner) -> DeviceController<ScriptedRunner> {
        DeviceController::new(runner, "/sdk/platform-tools/adb")
    }

    #[tokio::test]
    async fn test_install_success_marker() {
        let ok = controller(ScriptedRunner::default().on("install", 0, "Performing Streamed Install\nSuccess\n"));
        assert!(ok.install(Path::new("Game.apk")).await.unwrap().succeeded);

        let failed = controller(ScriptedRunner::default().on("install", 0, "Failure [INSTALL_FAILED_OLDER_SDK]"));
        let output = failed.install(Path::new("Game.apk")).await.unwrap();
        assert!(!output.succeeded);
        assert!(output.contains("INSTALL_FAILED_OLDER_SDK"));
    }

    #[tokio::test]
    async fn test_uninstall_only_when_listed() {
        let runner = ScriptedRunner::default().on("pm list packages", 0, "");
        let device = controller(runner);
        device.uninstall_if_installed("com.example.game").await;
        assert_eq!(device.runner.calls(), vec!["shell pm list packages com.example.game"]);

        let runner = ScriptedRunner::default()
            .on("pm list packages", 0, "package:com.example.game\n")
            .on("uninstall", 1, "Failure [DELETE_FAILED_INTERNAL_ERROR]");
        let device = controller(runner);
        device.uninstall_if_installed("com.example.game").await;
        assert_eq!(device.runner.calls().len(), 2);
        assert_eq!(device.runner.calls()[1], "uninstall com.example.game");
    }

    #[tokio::test]
    async fn test_run_flow_and_launch_command() {
        let runner = ScriptedRunner::default()
            .on("pm list packages", 0, "")
            .on("install", 0, "Success")
            .on("am start", 0, "Starting: Intent");
        let device = controller(runner).with_serial("emulator-5554");
        device
            .run(Path::new("/out/Game.apk"), &target(), TargetType::AndroidPackage)
            .await
            .unwrap();

        let calls = device.runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1], "-s emulator-5554 install /out/Game.apk");
        assert_eq!(
            calls[2],
            "-s emulator-5554 shell am start -a android.intent.action.MAIN -c android.intent.category.LAUNCHER \
             -f 0x10200000 -S -n com.example.game/com.apkforge.player.PlayerActivity"
        );
    }

    #[tokio::test]
    async fn test_run_reports_install_output() {
        let runner = ScriptedRunner::default().on("install", 0, "Failure [INSTALL_FAILED_NO_MATCHING_ABIS]");
        let device = controller(runner);
        match device
            .run(Path::new("/out/Game.apk"), &target(), TargetType::AndroidPackage)
            .await
        {
            Err(DeviceError::ToolInvocation { action, output }) => {
                assert_eq!(action, "install APK");
                assert!(output.contains("INSTALL_FAILED_NO_MATCHING_ABIS"));
            }
            other => panic!("expected install failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_bundle_uses_bundletool() {
        let runner = ScriptedRunner::default()
            .on("build-apks", 0, "WARNING: APK set written")
            .on("install-apks", 0, "");
        let device = controller(runner).with_bundletool(Bundletool::new("java", "bundletool.jar"));
        device
            .run(Path::new("/out/Game.aab"), &target(), TargetType::AndroidAppBundle)
            .await
            .unwrap();
        let calls = device.runner.calls();
        assert!(calls[1].contains("build-apks --bundle=/out/Game.aab --output=/out/bundle.apks --overwrite"));
        assert!(calls[2].contains("install-apks --apks=/out/bundle.apks --adb=/sdk/platform-tools/adb"));

        let failing = controller(ScriptedRunner::default().on("build-apks", 1, "bad bundle"))
            .with_bundletool(Bundletool::new("java", "bundletool.jar"));
        assert!(matches!(
            failing.run(Path::new("/out/Game.aab"), &target(), TargetType::AndroidAppBundle).await,
            Err(DeviceError::ToolInvocation { .. })
        ));
    }

    #[tokio::test]
    async fn test_bundle_without_bundletool_is_configuration_error() {
        let device = controller(ScriptedRunner::default());
        assert!(matches!(
            device.install_bundle(Path::new("/out/Game.aab")).await,
            Err(DeviceError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_timeout_uses_log_marker() {
        let runner = ScriptedRunner::default()
            .on("install", 0, "Success")
            .on("am start", 255, "Error: crashed")
            .on("logcat -d", 0, "I/Tests: Test suite: SUCCESS\n");
        let device = controller(runner);
        let output = device
            .run_test_mode(Path::new("/out/Game.apk"), &target(), Duration::ZERO)
            .await
            .unwrap();
        assert!(output.succeeded);

        let calls = device.runner.calls();
        assert_eq!(calls[1], "logcat -c");
        assert_eq!(calls[3], "shell am force-stop com.example.game");
        assert_eq!(calls[4], "logcat -d");

        let runner = ScriptedRunner::default()
            .on("install", 0, "Success")
            .on("logcat -d", 0, "I/Tests: Test suite: FAILURE\n");
        let output = controller(runner)
            .run_test_mode(Path::new("/out/Game.apk"), &target(), Duration::ZERO)
            .await
            .unwrap();
        assert!(!output.succeeded);
    }

    #[tokio::test]
    async fn test_timeout_waits_and_keeps_launch_result() {
        let runner = ScriptedRunner::default()
            .on("install", 0, "Success")
            .on("am start", 0, "Starting")
            .on("logcat -d", 0, "no marker here");
        let device = controller(runner);
        let started = Instant::now();
        let output = device
            .run_test_mode(Path::new("/out/Game.apk"), &target(), Duration::from_millis(150))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(output.succeeded);
        assert_eq!(output.full_output, "no marker here");
    }

    #[tokio::test]
    async fn test_failed_install_stops_test_mode() {
        let runner = ScriptedRunner::default().on("install", 0, "Failure [INSTALL_FAILED_INVALID_APK]");
        let device = controller(runner);
        let output = device
            .run_test_mode(Path::new("/out/Game.apk"), &target(), Duration::ZERO)
            .await
            .unwrap();
        assert!(!output.succeeded);
        assert_eq!(device.runner.calls().len(), 1);
    }

    #[test]
    fn test_from_tools_requires_sdk() {
        assert!(matches!(
            DeviceController::from_tools(ScriptedRunner::default(), &ExternalToolConfig::default()),
            Err(DeviceError::Configuration(_))
        ));
    }
}
