//! Orchestrated test runs on Android virtual devices.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::android::adb::{Adb, LogcatOptions};
use crate::android::avd::AvdManager;
use crate::android::aapt::Aapt;
use crate::android::device::{DeviceType, VirtualDevice};
use crate::android::emulator::{BootOptions, BootOutcome, EmulatorManager};
use crate::process::OutputLine;
use crate::testing::options::{android_device_types, parse_android_runtime, parse_api_level};
use crate::testing::results::{TestResultsParser, TestRunSummary};
use crate::testing::{TestRunError, TestRunOptions};

/// Runs a test APK on a selected Android virtual device.
pub struct AndroidTestRunner {
    avd: AvdManager,
    emulator: EmulatorManager,
    aapt: Aapt,
    adb: Adb,
}

impl AndroidTestRunner {
    pub fn new(sdk_root: Option<&Path>) -> Result<Self, TestRunError> {
        Ok(Self {
            avd: AvdManager::new(sdk_root)?,
            emulator: EmulatorManager::new(sdk_root)?,
            aapt: Aapt::new(sdk_root)?,
            adb: Adb::new(sdk_root)?,
        })
    }

    /// Selects a device, installs the APK, runs it to completion and cleans
    /// up. Uninstall and shutdown are attempted even when an earlier step
    /// failed; their failures are logged but never mask the original error.
    pub async fn run(
        &self,
        app: &Path,
        options: &TestRunOptions,
        cancel: &CancellationToken,
    ) -> Result<TestRunSummary, TestRunError> {
        let manifest = self.aapt.android_manifest(app, cancel).await?;
        let package = manifest
            .package_name()
            .ok_or(TestRunError::MissingPackageName)?
            .to_string();
        let activity = manifest
            .main_launcher_activity()
            .ok_or(TestRunError::MissingLauncherActivity)?
            .to_string();

        info!(package, "running tests");
        info!(activity, "detected main launcher activity");

        let runtime = parse_android_runtime(options.runtime.as_deref())?;
        let types = android_device_types(options.device_type.as_deref(), runtime)?;
        let api_level = parse_api_level(options.version.as_deref())?;
        let latest = options.latest || api_level == 0;

        let device = self
            .select_virtual_device(
                options.device_name.as_deref(),
                &types,
                api_level,
                latest,
                cancel,
            )
            .await?;
        info!(
            name = %device.name,
            id = %device.id,
            runtime = %device.runtime(),
            version = %device.version(),
            "using virtual device"
        );

        let mut serial = None;
        let outcome = self
            .run_on_device(&device, app, &package, &activity, options, &mut serial, cancel)
            .await;

        if options.shutdown {
            if let Some(serial) = serial.as_deref() {
                if let Err(err) = self.adb.shutdown_virtual_device(serial, cancel).await {
                    warn!(serial, error = %err, "failed to shut down the virtual device");
                }
            }
        }

        outcome
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_on_device(
        &self,
        device: &VirtualDevice,
        app: &Path,
        package: &str,
        activity: &str,
        options: &TestRunOptions,
        serial_slot: &mut Option<String>,
        cancel: &CancellationToken,
    ) -> Result<TestRunSummary, TestRunError> {
        if options.reset {
            if let Some(running) = self.adb.find_device_for_avd(&device.id, cancel).await? {
                self.adb
                    .shutdown_virtual_device(&running.serial, cancel)
                    .await?;
            }
            self.avd.reset(&device.id, cancel).await?;
        }

        let boot_options = BootOptions {
            wipe_data: options.reset,
            ..Default::default()
        };
        let serial = match self.emulator.boot(&device.id, boot_options, cancel).await? {
            BootOutcome::Booted { console_port, .. } => {
                let serial = format!("emulator-{console_port}");
                debug!(serial, console_port, "virtual device booted");
                serial
            }
            BootOutcome::AlreadyRunning => {
                let running = self
                    .adb
                    .find_device_for_avd(&device.id, cancel)
                    .await?
                    .ok_or_else(|| TestRunError::BootedDeviceNotFound {
                        name: device.name.clone(),
                    })?;
                debug!(serial = %running.serial, "virtual device was already booted");
                running.serial
            }
        };
        *serial_slot = Some(serial.clone());

        self.adb.install_app(&serial, app, cancel).await?;

        let outcome = self
            .exercise_app(&serial, package, activity, options, cancel)
            .await;

        if let Err(err) = self.adb.uninstall_app(&serial, package, cancel).await {
            warn!(serial, error = %err, "failed to uninstall the test app");
        }

        outcome
    }

    /// Launches the app while streaming logcat through the results parser;
    /// the summary marker stops the stream. Then pulls the results file when
    /// one was requested.
    async fn exercise_app(
        &self,
        serial: &str,
        package: &str,
        activity: &str,
        options: &TestRunOptions,
        cancel: &CancellationToken,
    ) -> Result<TestRunSummary, TestRunError> {
        self.adb.clear_logcat(serial, cancel).await?;

        let mut parser = TestResultsParser::new();
        let stream = cancel.child_token();
        let stop = stream.clone();
        let observer = |line: &OutputLine| {
            parser.parse_line(
                &line.data,
                |event| info!("{}", event.message),
                || stop.cancel(),
            );
        };

        let component = format!("{package}/{activity}");
        let logcat = self
            .adb
            .logcat(serial, LogcatOptions::default(), observer, &stream);
        let launch = async {
            let launched = self.adb.launch_activity(serial, &component, cancel).await;
            if launched.is_err() {
                // Stop following the log so the join below cannot hang; the
                // launch error is the one that propagates.
                stream.cancel();
            }
            launched
        };

        let (logcat_outcome, launch_outcome) = tokio::join!(logcat, launch);
        launch_outcome?;
        logcat_outcome?;

        if let Some(device_results) = options.device_results.as_deref() {
            let dest = options
                .output_results
                .clone()
                .unwrap_or_else(|| default_output_path(device_results));
            info!(dest = %dest.display(), "copying test results from the virtual device");

            let data_dir = self.adb.data_directory(serial, package, cancel).await?;
            let remote = format!(
                "{}/{}",
                data_dir.trim_end_matches('/'),
                device_results.replace('\\', "/")
            );
            if self.adb.path_exists(serial, package, &remote, cancel).await? {
                self.adb
                    .pull_file(serial, package, &remote, &dest, true, cancel)
                    .await?;
            } else {
                info!("no test results found");
            }
        } else {
            info!("no device results path configured");
        }

        Ok(parser.summary())
    }

    /// Applies the device-selection rules: an explicit name matches id or
    /// display name directly; otherwise filter by type, then either the
    /// newest API level at or above the floor, or an exact level.
    async fn select_virtual_device(
        &self,
        name: Option<&str>,
        types: &[DeviceType],
        api_level: u32,
        use_latest: bool,
        cancel: &CancellationToken,
    ) -> Result<VirtualDevice, TestRunError> {
        let devices = self.avd.list_virtual_devices(cancel).await?;

        if let Some(name) = name {
            return devices
                .into_iter()
                .find(|device| device.id == name || device.name == name)
                .ok_or_else(|| TestRunError::NoMatchingDevice {
                    pattern: format!("'{name}'"),
                });
        }

        let available: Vec<VirtualDevice> = devices
            .into_iter()
            .filter(|device| types.contains(&device.device_type))
            .collect();
        for device in &available {
            debug!(
                name = %device.name,
                id = %device.id,
                api_level = device.api_level,
                "candidate virtual device"
            );
        }

        let (matching, pattern) = if use_latest {
            let newest = available
                .iter()
                .filter(|device| device.api_level >= api_level)
                .map(|device| device.api_level)
                .max();
            let pattern = match newest {
                Some(newest) if api_level == 0 => format!("[{newest}]"),
                _ => format!("[{api_level})"),
            };
            let matching: Vec<VirtualDevice> = match newest {
                Some(newest) => available
                    .into_iter()
                    .filter(|device| device.api_level == newest)
                    .collect(),
                None => Vec::new(),
            };
            (matching, pattern)
        } else {
            (
                available
                    .into_iter()
                    .filter(|device| device.api_level == api_level)
                    .collect(),
                format!("[{api_level}]"),
            )
        };

        matching
            .into_iter()
            .next()
            .ok_or(TestRunError::NoMatchingDevice { pattern })
    }
}

fn default_output_path(device_results: &str) -> PathBuf {
    let name = device_results
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(device_results);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_path_uses_the_file_name() {
        assert_eq!(
            default_output_path("TestResults.trx"),
            PathBuf::from("TestResults.trx")
        );
        assert_eq!(
            default_output_path("results/nested/TestResults.trx"),
            PathBuf::from("TestResults.trx")
        );
        assert_eq!(
            default_output_path("results\\TestResults.trx"),
            PathBuf::from("TestResults.trx")
        );
    }
}
