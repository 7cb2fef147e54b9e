//! Interface to the `emulator` launcher.
//!
//! Booting watches the launcher's stdout for two milestones in sequence: the
//! console-port announcement, then the guest's "Adb connected" line. At the
//! second milestone the invocation is stopped - only the launcher process is
//! killed; the emulator it started keeps running detached - and the captured
//! port is returned without waiting for the emulator itself to exit.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::android::{sdk, AndroidError};
use crate::process::{OutputLine, ProcessError, ProcessRunner};

static CONSOLE_LISTENING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"emulator: control console listening on port (\d+), ADB on port (\d+)")
        .expect("valid regex")
});
static ADB_CONNECTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"emulator: onGuestSendCommand: \[(.+)\] Adb connected, start proxing data")
        .expect("valid regex")
});

/// The launcher's literal complaint when the AVD already has a running
/// instance. Fragile against tool version changes, matched only here.
const ALREADY_RUNNING_TEXT: &str =
    "Running multiple emulators with the same AVD is an experimental feature";

/// Options for [`EmulatorManager::boot`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BootOptions {
    /// Run without a window or boot animation.
    pub headless: bool,
    /// Disable snapshot load/save.
    pub no_snapshots: bool,
    /// Factory-wipe user data before booting.
    pub wipe_data: bool,
}

/// Result of a boot request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// The emulator came up and adb connected to it.
    Booted { console_port: u16, adb_port: u16 },
    /// The AVD already had a running instance; the boot is a no-op.
    AlreadyRunning,
}

/// Wrapper around the `emulator` launcher tool.
pub struct EmulatorManager {
    runner: ProcessRunner,
    emulator: PathBuf,
}

impl EmulatorManager {
    pub fn new(sdk_root: Option<&Path>) -> Result<Self, AndroidError> {
        let root = sdk::find_sdk_root(sdk_root)?;
        let emulator = sdk::find_tool(&root, "emulator/emulator")
            .ok_or(AndroidError::ToolNotFound { tool: "emulator" })?;
        Ok(Self {
            runner: ProcessRunner::new(),
            emulator,
        })
    }

    /// Lists the AVD names the launcher knows about.
    pub async fn list_avds(&self, cancel: &CancellationToken) -> Result<Vec<String>, AndroidError> {
        info!("retrieving virtual devices");

        let result = self.runner.run(&self.emulator, &["-list-avds"], cancel).await?;
        Ok(result
            .stdout_lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Boots a virtual device and returns once adb has connected to it.
    pub async fn boot(
        &self,
        avd_id: &str,
        options: BootOptions,
        cancel: &CancellationToken,
    ) -> Result<BootOutcome, AndroidError> {
        info!(avd_id, "booting virtual device");

        let mut args = vec!["-avd", avd_id, "-verbose"];
        if options.headless {
            args.extend(["-no-boot-anim", "-no-window"]);
        }
        if options.no_snapshots {
            args.push("-no-snapshot");
        }
        if options.wipe_data {
            args.push("-wipe-data");
        }

        // The milestone token stops the invocation once boot is observed;
        // chaining it off the caller's token keeps external cancellation
        // working unchanged.
        let milestone = cancel.child_token();
        let stop = milestone.clone();
        let mut ports: Option<(u16, u16)> = None;

        let observer = |line: &OutputLine| {
            if line.is_error() {
                return;
            }
            if ports.is_none() {
                if let Some(caps) = CONSOLE_LISTENING_RE.captures(&line.data) {
                    ports = caps[1].parse().ok().zip(caps[2].parse().ok());
                }
            } else if ADB_CONNECTED_RE.is_match(&line.data) {
                stop.cancel();
            }
        };

        match self
            .runner
            .run_observed(&self.emulator, &args, observer, &milestone)
            .await
        {
            // The launcher exiting cleanly on its own also counts, as long
            // as the milestones were seen.
            Ok(_) => {}
            Err(ProcessError::Canceled { .. }) if !cancel.is_cancelled() => {}
            Err(ProcessError::Failed { result, .. }) if result.contains(ALREADY_RUNNING_TEXT) => {
                debug!(avd_id, "virtual device already has a running instance");
                return Ok(BootOutcome::AlreadyRunning);
            }
            Err(err) => return Err(err.into()),
        }

        let Some((console_port, adb_port)) = ports else {
            return Err(AndroidError::UnexpectedOutput(format!(
                "emulator did not announce a console port for '{avd_id}'"
            )));
        };
        debug!(console_port, adb_port, "virtual device booted");
        Ok(BootOutcome::Booted {
            console_port,
            adb_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_listening_line_captures_both_ports() {
        let caps = CONSOLE_LISTENING_RE
            .captures("emulator: control console listening on port 5554, ADB on port 5555")
            .unwrap();
        assert_eq!(&caps[1], "5554");
        assert_eq!(&caps[2], "5555");
    }

    #[test]
    fn adb_connected_line_matches() {
        assert!(ADB_CONNECTED_RE.is_match(
            "emulator: onGuestSendCommand: [127.0.0.1:39402] Adb connected, start proxing data"
        ));
        assert!(!ADB_CONNECTED_RE.is_match("emulator: some other verbose chatter"));
    }
}
