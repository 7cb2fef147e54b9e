//! CLI for Android emulator and Apple simulator automation.
//!
//! # Usage
//!
//! ```bash
//! # List Android virtual devices
//! devicekit android list
//!
//! # Create and boot one
//! devicekit android create Pixel_2 "system-images;android-29;google_apis;x86"
//! devicekit android boot Pixel_2 --headless
//!
//! # List Apple simulators
//! devicekit apple list
//!
//! # Run a test app on whatever matches
//! devicekit test DeviceTests.apk --latest --shutdown
//! devicekit test DeviceTests.app --runtime ios --device-type iphone
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use devicekit_core::android::adb::Adb;
use devicekit_core::android::avd::{AvdManager, CreateVirtualDeviceOptions};
use devicekit_core::android::emulator::{BootOptions, BootOutcome, EmulatorManager};
use devicekit_core::apple::simctl::SimulatorControl;
use devicekit_core::testing::{
    AndroidTestRunner, AppleTestRunner, TestRunOptions, TestRunSummary,
};

/// Manage Android virtual devices and Apple simulators.
#[derive(Parser)]
#[command(name = "devicekit")]
#[command(about = "Manage mobile virtual devices and run test apps on them")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Work with Android virtual devices
    Android {
        #[command(subcommand)]
        command: AndroidCommand,
    },
    /// Work with Apple simulators
    Apple {
        #[command(subcommand)]
        command: AppleCommand,
    },
    /// Install a test app on a matching device, run it and report results
    Test(TestArgs),
}

#[derive(Subcommand)]
enum AndroidCommand {
    /// List the registered virtual devices
    List {
        /// Path to the Android SDK directory
        #[arg(long, env = "ANDROID_HOME")]
        sdk: Option<PathBuf>,
    },
    /// List the creatable hardware profiles
    Profiles {
        #[arg(long, env = "ANDROID_HOME")]
        sdk: Option<PathBuf>,
    },
    /// List the installed platform targets
    Targets {
        #[arg(long, env = "ANDROID_HOME")]
        sdk: Option<PathBuf>,
    },
    /// Create a new virtual device
    Create {
        /// Name of the new virtual device
        name: String,
        /// System-image package to back it with
        package: String,
        /// Replace an existing virtual device with the same name
        #[arg(long)]
        replace: bool,
        #[arg(long, env = "ANDROID_HOME")]
        sdk: Option<PathBuf>,
    },
    /// Delete a virtual device
    Delete {
        /// Name of the virtual device
        name: String,
        #[arg(long, env = "ANDROID_HOME")]
        sdk: Option<PathBuf>,
    },
    /// Boot a virtual device and wait for adb to connect
    Boot {
        /// Name of the virtual device
        name: String,
        /// Run without a window or boot animation
        #[arg(long)]
        headless: bool,
        /// Disable snapshot load/save
        #[arg(long)]
        no_snapshots: bool,
        /// Factory-wipe user data before booting
        #[arg(long)]
        wipe_data: bool,
        #[arg(long, env = "ANDROID_HOME")]
        sdk: Option<PathBuf>,
    },
    /// Shut down a running virtual device by serial
    Shutdown {
        /// The device serial (e.g. emulator-5554)
        serial: String,
        #[arg(long, env = "ANDROID_HOME")]
        sdk: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AppleCommand {
    /// List the simulators
    List,
    /// Boot a simulator
    Boot {
        /// The simulator udid
        udid: String,
    },
    /// Shut down a simulator
    Shutdown {
        /// The simulator udid
        udid: String,
    },
    /// Erase a simulator back to factory state
    Erase {
        /// The simulator udid
        udid: String,
    },
}

#[derive(Args)]
struct TestArgs {
    /// The app to install and test: an .apk file or an .app bundle
    app: PathBuf,

    /// Path of the results file on the device
    #[arg(long, default_value = "TestResults.trx")]
    device_results: String,

    /// Where to save the pulled results file on the host
    #[arg(long)]
    output_results: Option<PathBuf>,

    /// The runtime to use when looking for a device (android, wear, tv /
    /// ios, watchos, tvos)
    #[arg(long)]
    runtime: Option<String>,

    /// The runtime version: an API level on Android, major[.minor] on Apple
    #[arg(long)]
    version: Option<String>,

    /// Use the newest version among the filtered devices
    #[arg(long)]
    latest: bool,

    /// The device type to filter by (phone, tablet, tv, watch)
    #[arg(long)]
    device_type: Option<String>,

    /// An exact device name or identifier; bypasses the other filters
    #[arg(long)]
    device_name: Option<String>,

    /// Reset the device to a clean state before the tests
    #[arg(long)]
    reset: bool,

    /// Shut the device down after the tests
    #[arg(long)]
    shutdown: bool,

    /// Path to the Android SDK directory
    #[arg(long, env = "ANDROID_HOME")]
    sdk: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    match run(cli.command, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Command, cancel: &CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Android { command } => run_android(command, cancel).await,
        Command::Apple { command } => run_apple(command, cancel).await,
        Command::Test(args) => run_test(args, cancel).await,
    }
}

async fn run_android(
    command: AndroidCommand,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        AndroidCommand::List { sdk } => {
            let manager = AvdManager::new(sdk.as_deref())?;
            for device in manager.list_virtual_devices(cancel).await? {
                println!(
                    "{}\t{}\t{} {}\t{}",
                    device.id,
                    device.name,
                    device.runtime(),
                    device.version(),
                    device.device_type
                );
            }
        }
        AndroidCommand::Profiles { sdk } => {
            let manager = AvdManager::new(sdk.as_deref())?;
            for profile in manager.list_device_profiles(cancel).await? {
                println!("{profile}");
            }
        }
        AndroidCommand::Targets { sdk } => {
            let manager = AvdManager::new(sdk.as_deref())?;
            for target in manager.list_targets(cancel).await? {
                println!("{target}");
            }
        }
        AndroidCommand::Create {
            name,
            package,
            replace,
            sdk,
        } => {
            let manager = AvdManager::new(sdk.as_deref())?;
            let options = CreateVirtualDeviceOptions { overwrite: replace };
            let outcome = manager.create(&name, &package, options, cancel).await?;
            info!(?outcome, name, "create finished");
        }
        AndroidCommand::Delete { name, sdk } => {
            let manager = AvdManager::new(sdk.as_deref())?;
            let outcome = manager.delete(&name, cancel).await?;
            info!(?outcome, name, "delete finished");
        }
        AndroidCommand::Boot {
            name,
            headless,
            no_snapshots,
            wipe_data,
            sdk,
        } => {
            let manager = EmulatorManager::new(sdk.as_deref())?;
            let options = BootOptions {
                headless,
                no_snapshots,
                wipe_data,
            };
            match manager.boot(&name, options, cancel).await? {
                BootOutcome::Booted { console_port, .. } => {
                    println!("emulator-{console_port}");
                }
                BootOutcome::AlreadyRunning => {
                    info!(name, "virtual device already has a running instance");
                }
            }
        }
        AndroidCommand::Shutdown { serial, sdk } => {
            let adb = Adb::new(sdk.as_deref())?;
            adb.shutdown_virtual_device(&serial, cancel).await?;
        }
    }
    Ok(())
}

async fn run_apple(
    command: AppleCommand,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let simctl = SimulatorControl::new();
    match command {
        AppleCommand::List => {
            for simulator in simctl.list_simulators(cancel).await? {
                println!(
                    "{}\t{}\t{} {}\t{}",
                    simulator.udid, simulator.name, simulator.runtime, simulator.version,
                    simulator.state
                );
            }
        }
        AppleCommand::Boot { udid } => simctl.boot(&udid, cancel).await?,
        AppleCommand::Shutdown { udid } => simctl.shutdown(&udid, cancel).await?,
        AppleCommand::Erase { udid } => simctl.erase(&udid, cancel).await?,
    }
    Ok(())
}

async fn run_test(
    args: TestArgs,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = TestRunOptions {
        device_results: Some(args.device_results),
        output_results: args.output_results,
        runtime: args.runtime,
        version: args.version,
        latest: args.latest,
        device_type: args.device_type,
        device_name: args.device_name,
        reset: args.reset,
        shutdown: args.shutdown,
    };

    let extension = args
        .app
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);

    let summary = match extension.as_deref() {
        Some("apk") => {
            let runner = AndroidTestRunner::new(args.sdk.as_deref())?;
            runner.run(&args.app, &options, cancel).await?
        }
        Some("app") => {
            let runner = AppleTestRunner::new();
            runner.run(&args.app, &options, cancel).await?
        }
        _ => {
            return Err(format!(
                "unsupported app '{}': expected an .apk file or an .app bundle",
                args.app.display()
            )
            .into());
        }
    };

    report(&summary);
    if summary.all_passed() {
        Ok(())
    } else {
        Err(format!("{} test(s) failed", summary.failed.len()).into())
    }
}

fn report(summary: &TestRunSummary) {
    println!(
        "Tests run: {} Passed: {} Failed: {} Skipped: {}",
        summary.total(),
        summary.passed.len(),
        summary.failed.len(),
        summary.skipped.len()
    );
    for name in &summary.failed {
        println!("  failed: {name}");
    }
}
