//! bundletool Invocations
//!
//! App bundles are turned into an APK set on the host and installed through
//! bundletool, which drives adb itself.

use std::path::{Path, PathBuf};

use apkforge_android_toolchain::ToolEnvironment;
use apkforge_core::Invocation;

/// APK set written next to the bundle
pub const APKS_FILE_NAME: &str = "bundle.apks";

/// bundletool run through a JVM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundletool {
    java: PathBuf,
    jar: PathBuf,
    environment: ToolEnvironment,
}

impl Bundletool {
    pub fn new(java: impl Into<PathBuf>, jar: impl Into<PathBuf>) -> Self {
        Self {
            java: java.into(),
            jar: jar.into(),
            environment: ToolEnvironment::default(),
        }
    }

    /// JDK and SDK variables every bundletool run gets
    pub fn with_environment(mut self, environment: ToolEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn apks_path(dir: &Path) -> PathBuf {
        dir.join(APKS_FILE_NAME)
    }

    fn invocation(&self, subcommand: &str) -> Invocation {
        self.environment.apply(
            Invocation::new(&self.java)
                .arg("-jar")
                .arg(self.jar.to_string_lossy())
                .arg(subcommand),
        )
    }

    /// `build-apks --bundle=<aab> --output=<apks> --overwrite`
    pub fn build_apks(&self, bundle: &Path, output: &Path) -> Invocation {
        self.invocation("build-apks")
            .arg(format!("--bundle={}", bundle.display()))
            .arg(format!("--output={}", output.display()))
            .arg("--overwrite")
    }

    /// `install-apks --apks=<apks> --adb=<adb>`
    pub fn install_apks(&self, apks: &Path, adb: &Path, serial: Option<&str>) -> Invocation {
        let invocation = self
            .invocation("install-apks")
            .arg(format!("--apks={}", apks.display()))
            .arg(format!("--adb={}", adb.display()));
        match serial {
            Some(serial) => invocation.arg(format!("--device-id={}", serial)),
            None => invocation,
        }
    }
}
