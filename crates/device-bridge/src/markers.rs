//! Success Markers
//!
//! Every "did it work" decision about device tool output lives here. The
//! checks are literal, case-sensitive substring matches on the combined
//! output; downstream tooling relies on these exact markers.

use apkforge_core::ProcessOutput;

/// Printed by `adb install` on success
pub const INSTALL_SUCCESS: &str = "Success";

/// Logged by a headless test run that passed
pub const TEST_SUITE_SUCCESS: &str = "Test suite: SUCCESS";

/// `adb shell pm list packages <id>` output names the package
pub fn is_package_listed(output: &ProcessOutput, package_id: &str) -> bool {
    output.contains(package_id)
}

/// `adb install` succeeded; warnings on stderr do not matter, only the marker
pub fn install_succeeded(output: &ProcessOutput) -> bool {
    output.contains(INSTALL_SUCCESS)
}

/// `adb shell am start` succeeded, judged by the process itself
pub fn launch_succeeded(output: &ProcessOutput) -> bool {
    output.succeeded
}

/// bundletool may write to stderr on success, so only the exit code counts
pub fn bundletool_succeeded(output: &ProcessOutput) -> bool {
    output.exit_code == Some(0)
}

/// Collected logs report a passing test suite
pub fn test_suite_succeeded(logs: &str) -> bool {
    logs.contains(TEST_SUITE_SUCCESS)
}
