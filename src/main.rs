//! apkforge - Android packaging and deployment orchestrator
//!
//! Command-line entry point: plans package builds and drives a device.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use apkforge::commands::{DevicesCommand, DoctorCommand, PlanCommand, RunCommand, TestCommand};
use apkforge::core::config::CONFIG_FILE_NAME;
use apkforge::core::ForgeError;
use apkforge::device::LogLevel;
use apkforge::toolchain::CodeGen;

/// Application name
pub const APP_NAME: &str = "apkforge";

/// Android packaging and deployment orchestrator
#[derive(Parser, Debug)]
#[command(name = "apkforge", author, version, about = "Android packaging and deployment orchestrator", long_about = None)]
struct Cli {
    /// Build configuration file (JSON or TOML)
    #[arg(long, global = true, default_value = CONFIG_FILE_NAME)]
    settings: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Describe the build graph for packaging an app
    Plan {
        #[arg(long, help = "Application name")]
        app: String,
        #[arg(long, default_value = "debug", value_parser = parse_codegen)]
        config: CodeGen,
        #[arg(long = "source", help = "Native source file, repeatable")]
        sources: Vec<PathBuf>,
        #[arg(long = "include", help = "Include directory, repeatable")]
        include_dirs: Vec<PathBuf>,
        #[arg(long, help = "Entry library (.a links statically, .so is deployed)")]
        entry_library: Option<PathBuf>,
        #[arg(long = "native-library", help = "Prebuilt shared library to deploy, repeatable")]
        native_libraries: Vec<PathBuf>,
        #[arg(long = "support-file", help = "File shipped with the app, repeatable")]
        support_files: Vec<PathBuf>,
        #[arg(long, default_value = "build/intermediate")]
        build_dir: PathBuf,
        #[arg(long, default_value = "build")]
        target_dir: PathBuf,
        #[arg(long, help = "Gradle project template directory")]
        template: Option<PathBuf>,
        #[arg(long, help = "Write the build graph JSON here instead of stdout")]
        output: Option<PathBuf>,
        #[arg(long, help = "Fail on unsupported configurations instead of warning")]
        strict: bool,
    },
    /// Reinstall a package and launch it
    Run {
        package: PathBuf,
        #[arg(long, help = "Device serial when several are attached")]
        serial: Option<String>,
    },
    /// Run a package in test mode and report the result
    Test {
        package: PathBuf,
        #[arg(long)]
        serial: Option<String>,
        #[arg(long, default_value_t = 0, help = "Milliseconds to let the app run; 0 runs a headless test")]
        timeout_ms: u64,
        #[arg(long, value_parser = parse_level, help = "Minimum log level to print (V, D, I, W, E, F)")]
        min_level: Option<LogLevel>,
        #[arg(long = "tag", help = "Only print log lines with this tag, repeatable")]
        tags: Vec<String>,
        #[arg(long, help = "Only print log lines containing this text")]
        grep: Option<String>,
    },
    /// List attached devices
    Devices,
    /// Check the external Android tools
    Doctor,
}

fn parse_codegen(s: &str) -> Result<CodeGen, String> {
    CodeGen::from_str(s).ok_or_else(|| format!("unknown configuration '{}'", s))
}

fn parse_level(s: &str) -> Result<LogLevel, String> {
    s.chars()
        .next()
        .and_then(|c| LogLevel::from_char(c.to_ascii_uppercase()))
        .ok_or_else(|| format!("unknown log level '{}'", s))
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    debug!("{} v{}", APP_NAME, apkforge::core::VERSION);

    if let Err(e) = dispatch(cli).await {
        match e.downcast_ref::<ForgeError>() {
            Some(forge) => error!("{}", forge.user_message()),
            None => error!("{:#}", e),
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Plan {
            app,
            config,
            sources,
            include_dirs,
            entry_library,
            native_libraries,
            support_files,
            build_dir,
            target_dir,
            template,
            output,
            strict,
        } => {
            PlanCommand {
                settings: cli.settings,
                app_name: app,
                codegen: config,
                sources,
                include_dirs,
                entry_library,
                native_libraries,
                support_files,
                build_dir,
                target_dir,
                template_dir: template,
                output,
                strict,
            }
            .execute()?;
        }
        Command::Run { package, serial } => {
            RunCommand {
                settings: cli.settings,
                package,
                device_serial: serial,
            }
            .execute()
            .await?;
        }
        Command::Test {
            package,
            serial,
            timeout_ms,
            min_level,
            tags,
            grep,
        } => {
            let succeeded = TestCommand {
                settings: cli.settings,
                package,
                device_serial: serial,
                timeout: Duration::from_millis(timeout_ms),
                min_level,
                tags,
                message_contains: grep,
            }
            .execute()
            .await?;
            if !succeeded {
                return Err(anyhow!("Test run failed"));
            }
        }
        Command::Devices => {
            DevicesCommand { settings: cli.settings }.execute().await?;
        }
        Command::Doctor => {
            DoctorCommand { settings: cli.settings }.execute()?;
        }
    }

    Ok(())
}
