//! Interface to the `adb` device bridge.
//!
//! Every per-device operation first confirms the target serial appears in a
//! freshly queried device list and fails fast with
//! [`AndroidError::DeviceNotFound`] otherwise. Nothing is cached: the set of
//! connected devices is external, mutable state that other processes change
//! at any time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::android::device::{ConnectedDevice, ConnectedDeviceState};
use crate::android::{sdk, AndroidError};
use crate::process::{OutputLine, ProcessError, ProcessResult, ProcessRunner};

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Options for [`Adb::logcat`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogcatOptions {
    /// Dump the existing buffer and exit instead of following.
    pub dump_only: bool,
}

/// Wrapper around the `adb` tool.
pub struct Adb {
    runner: ProcessRunner,
    adb: PathBuf,
}

impl Adb {
    pub fn new(sdk_root: Option<&Path>) -> Result<Self, AndroidError> {
        let root = sdk::find_sdk_root(sdk_root)?;
        let adb = sdk::find_tool(&root, "platform-tools/adb")
            .ok_or(AndroidError::ToolNotFound { tool: "adb" })?;
        Ok(Self {
            runner: ProcessRunner::new(),
            adb,
        })
    }

    /// Freshly queries the connected-device list.
    pub async fn list_devices(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<ConnectedDevice>, AndroidError> {
        debug!("searching for connected devices");

        let result = self.runner.run(&self.adb, &["devices"], cancel).await?;
        Ok(parse_device_list(&result))
    }

    /// Looks up one device by serial in a fresh listing.
    pub async fn device(
        &self,
        serial: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ConnectedDevice>, AndroidError> {
        let devices = self.list_devices(cancel).await?;
        Ok(devices
            .into_iter()
            .find(|device| device.serial.eq_ignore_ascii_case(serial)))
    }

    /// Reads the AVD id backing an emulator serial via the emulator console.
    ///
    /// Returns `None` when the console produced no output (a physical
    /// device); anything else must be the id line followed by `OK`.
    pub async fn avd_id_for(
        &self,
        serial: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, AndroidError> {
        info!(serial, "reading virtual device id");

        self.ensure_device_visible(serial, cancel).await?;

        let result = self
            .runner
            .run(&self.adb, &["-s", serial, "emu", "avd", "name"], cancel)
            .await?;

        let lines: Vec<&str> = result
            .stdout_lines()
            .filter(|line| !line.trim().is_empty())
            .collect();
        if lines.is_empty() {
            return Ok(None);
        }
        if lines.len() < 2 || !lines[1].trim().eq_ignore_ascii_case("OK") {
            return Err(AndroidError::UnexpectedOutput(format!(
                "unable to read the virtual device id for '{serial}'"
            )));
        }
        Ok(Some(lines[0].trim().to_string()))
    }

    /// Finds the connected device that is running the given AVD, if any.
    pub async fn find_device_for_avd(
        &self,
        avd_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<ConnectedDevice>, AndroidError> {
        for device in self.list_devices(cancel).await? {
            if let Some(id) = self.avd_id_for(&device.serial, cancel).await? {
                if id.eq_ignore_ascii_case(avd_id) {
                    return Ok(Some(device));
                }
            }
        }
        Ok(None)
    }

    /// Streams the device log, forwarding every line to `observer`.
    ///
    /// The stream runs until the device closes it or `cancel` fires; a
    /// canceled stream is the expected way to stop following and returns the
    /// output captured so far as success.
    pub async fn logcat(
        &self,
        serial: &str,
        options: LogcatOptions,
        observer: impl FnMut(&OutputLine) + Send,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, AndroidError> {
        info!(serial, "starting logcat");

        self.ensure_device_visible(serial, cancel).await?;

        let mut args = vec!["-s", serial, "logcat"];
        if options.dump_only {
            args.push("-d");
        }

        match self
            .runner
            .run_observed(&self.adb, &args, observer, cancel)
            .await
        {
            Ok(result) => Ok(result),
            Err(ProcessError::Canceled { result, .. }) => Ok(result),
            Err(err) => Err(err.into()),
        }
    }

    /// Clears the device log buffer.
    pub async fn clear_logcat(
        &self,
        serial: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AndroidError> {
        info!(serial, "clearing logcat");

        self.ensure_device_visible(serial, cancel).await?;
        self.runner
            .run(&self.adb, &["-s", serial, "logcat", "--clear"], cancel)
            .await?;
        Ok(())
    }

    /// Starts an activity by its `package/activity` component name.
    pub async fn launch_activity(
        &self,
        serial: &str,
        activity: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AndroidError> {
        info!(serial, activity, "launching activity");

        self.ensure_device_visible(serial, cancel).await?;
        self.runner
            .run(
                &self.adb,
                &["-s", serial, "shell", "am", "start", "-n", activity],
                cancel,
            )
            .await?;
        Ok(())
    }

    /// Installs an APK onto the device.
    pub async fn install_app(
        &self,
        serial: &str,
        app_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), AndroidError> {
        if !app_path.is_file() {
            return Err(AndroidError::MissingApp {
                path: app_path.to_path_buf(),
            });
        }

        info!(serial, app = %app_path.display(), "installing app");

        self.ensure_device_visible(serial, cancel).await?;
        let app = app_path.display().to_string();
        self.runner
            .run(&self.adb, &["-s", serial, "install", &app], cancel)
            .await?;
        Ok(())
    }

    /// Uninstalls a package from the device.
    pub async fn uninstall_app(
        &self,
        serial: &str,
        package: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AndroidError> {
        info!(serial, package, "uninstalling app");

        self.ensure_device_visible(serial, cancel).await?;
        self.runner
            .run(&self.adb, &["-s", serial, "uninstall", package], cancel)
            .await?;
        Ok(())
    }

    /// Kills a running emulator and polls the device list until its serial
    /// disappears. Bounded only by the caller's cancellation.
    pub async fn shutdown_virtual_device(
        &self,
        serial: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AndroidError> {
        info!(serial, "shutting down virtual device");

        self.ensure_device_visible(serial, cancel).await?;
        self.runner
            .run(&self.adb, &["-s", serial, "emu", "kill"], cancel)
            .await?;

        while self.is_device_visible(serial, cancel).await? {
            tokio::select! {
                _ = cancel.cancelled() => return Err(AndroidError::Interrupted),
                _ = tokio::time::sleep(SHUTDOWN_POLL_INTERVAL) => {}
            }
        }
        Ok(())
    }

    /// Runs a shell command on the device.
    pub async fn run_shell_command(
        &self,
        serial: &str,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, AndroidError> {
        info!(serial, command, "running shell command");

        self.ensure_device_visible(serial, cancel).await?;
        Ok(self
            .runner
            .run(&self.adb, &["-s", serial, "shell", command], cancel)
            .await?)
    }

    /// Runs a shell command with the identity of an installed debuggable app.
    pub async fn run_as_app(
        &self,
        serial: &str,
        package: &str,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, AndroidError> {
        let command = format!("run-as \"{package}\" {command}");
        self.run_shell_command(serial, &command, cancel).await
    }

    /// The app's private files directory on the device.
    pub async fn data_directory(
        &self,
        serial: &str,
        package: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AndroidError> {
        info!(serial, package, "retrieving app data directory");

        let result = self.run_as_app(serial, package, "pwd", cancel).await?;
        let root = result.combined_output().trim().to_string();
        Ok(format!("{root}/files"))
    }

    /// Whether a path exists inside the app's sandbox.
    pub async fn path_exists(
        &self,
        serial: &str,
        package: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, AndroidError> {
        debug!(serial, package, path, "checking device path");

        let command = format!("ls \"{path}\"");
        match self.run_as_app(serial, package, &command, cancel).await {
            Ok(_) => Ok(true),
            Err(AndroidError::Process(ProcessError::Failed { result, .. }))
                if result.line_count() == 1 && result.contains("No such file or directory") =>
            {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Copies a file out of the app's sandbox to the host.
    ///
    /// `adb pull` cannot reach into the app sandbox, so the file is staged
    /// through a uniquely named `/sdcard/Download` path first and the staging
    /// copy removed afterwards.
    pub async fn pull_file(
        &self,
        serial: &str,
        package: &str,
        source: &str,
        dest: &Path,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<(), AndroidError> {
        info!(serial, source, dest = %dest.display(), "pulling file from device");

        if dest.exists() {
            if !overwrite {
                return Err(AndroidError::DestinationExists {
                    path: dest.to_path_buf(),
                });
            }
            tokio::fs::remove_file(dest).await?;
        }

        let staging = format!("/sdcard/Download/{}", Uuid::new_v4());

        let copy = format!("cp \"{source}\" \"{staging}\"");
        self.run_as_app(serial, package, &copy, cancel).await?;

        let dest = dest.display().to_string();
        self.runner
            .run(&self.adb, &["-s", serial, "pull", &staging, &dest], cancel)
            .await?;

        let remove = format!("rm \"{staging}\"");
        self.run_as_app(serial, package, &remove, cancel).await?;
        Ok(())
    }

    async fn ensure_device_visible(
        &self,
        serial: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AndroidError> {
        if self.is_device_visible(serial, cancel).await? {
            Ok(())
        } else {
            Err(AndroidError::DeviceNotFound {
                serial: serial.to_string(),
            })
        }
    }

    async fn is_device_visible(
        &self,
        serial: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, AndroidError> {
        let devices = self.list_devices(cancel).await?;
        Ok(devices
            .iter()
            .any(|device| device.serial.eq_ignore_ascii_case(serial)))
    }
}

/// Parses `adb devices` output: one `serial<TAB>state` row per device.
fn parse_device_list(result: &ProcessResult) -> Vec<ConnectedDevice> {
    let mut devices = Vec::new();
    for line in result.stdout_lines() {
        if !line.contains('\t') {
            continue;
        }
        let parts: Vec<&str> = line.split('\t').filter(|part| !part.is_empty()).collect();
        let [serial, state, ..] = parts[..] else {
            continue;
        };
        let state = match state.trim().to_lowercase().as_str() {
            "device" => ConnectedDeviceState::Connected,
            "offline" => ConnectedDeviceState::Disconnected,
            _ => ConnectedDeviceState::Unknown,
        };
        devices.push(ConnectedDevice {
            serial: serial.trim().to_string(),
            state,
        });
    }
    devices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::OutputSource;
    use chrono::Utc;

    fn result_from(lines: &[&str]) -> ProcessResult {
        let lines = lines
            .iter()
            .map(|data| OutputLine {
                data: data.to_string(),
                elapsed: Duration::from_millis(1),
                source: OutputSource::Stdout,
            })
            .collect::<Vec<_>>();
        ProcessResult::from_parts(lines, 0, Utc::now(), Duration::from_millis(3))
    }

    #[test]
    fn device_list_parses_serial_and_state() {
        let result = result_from(&[
            "List of devices attached",
            "emulator-5554\tdevice",
            "R58M123ABC\toffline",
            "0123456789\tno device",
        ]);

        let devices = parse_device_list(&result);
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].serial, "emulator-5554");
        assert_eq!(devices[0].state, ConnectedDeviceState::Connected);
        assert_eq!(devices[0].console_port(), Some(5554));
        assert_eq!(devices[1].state, ConnectedDeviceState::Disconnected);
        assert_eq!(devices[2].state, ConnectedDeviceState::Unknown);
    }

    #[test]
    fn device_list_ignores_rows_without_tabs() {
        let result = result_from(&["List of devices attached", "", "* daemon started *"]);
        assert!(parse_device_list(&result).is_empty());
    }
}
