//! apkforge - Android packaging and deployment orchestrator
//!
//! Turns natively compiled programs into installable Android packages by
//! describing a build graph for an external engine, and drives a device to
//! install, launch and test the result.
//!
//! ## Architecture
//!
//! apkforge is organized into specialized crates:
//!
//! - `apkforge-core`: Build settings, error taxonomy and the process runner
//! - `apkforge-android-toolchain`: Tool resolution, compiler flags, linker policies and the toolchain registry
//! - `apkforge-build-engine`: Build graph description, project synthesis and packaging
//! - `apkforge-device-bridge`: Install, launch and test-mode runs over adb

#![warn(clippy::all)]

pub mod commands;
pub mod planner;

// Re-export main components for library usage
pub use apkforge_android_toolchain as toolchain;
pub use apkforge_build_engine as build;
pub use apkforge_core as core;
pub use apkforge_device_bridge as device;

pub use planner::{plan_build, strict, BuildPlan, BuildRequest};

/// Gradle project template shipped with the crate
pub const DEFAULT_TEMPLATE_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/templates/android");

/// Prelude module for convenient imports
pub mod prelude {
    pub use apkforge_android_toolchain::{CodeGen, ToolchainRegistry};
    pub use apkforge_build_engine::{BuildGraph, Deployable, DeployableFile, NativeProgram};
    pub use apkforge_core::{BuildSettings, SystemProcessRunner};
    pub use apkforge_device_bridge::{DeviceController, LaunchTarget};

    pub use crate::planner::{plan_build, BuildRequest};
}
