//! Interface to Apple's `xcrun simctl` command-line tool.
//!
//! Simulator state is polled fresh for every operation - the CoreSimulator
//! registry is shared, external state that Xcode and other tools mutate at
//! will. Boot and shutdown issue the transition and then poll the device's
//! state on a fixed interval until the terminal state is observed or the
//! caller cancels.
//!
//! # Example
//!
//! ```no_run
//! use devicekit_core::apple::simctl::SimulatorControl;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let simctl = SimulatorControl::new();
//!     let cancel = CancellationToken::new();
//!     for simulator in simctl.list_simulators(&cancel).await.unwrap() {
//!         println!("{}: {} ({})", simulator.name, simulator.udid, simulator.state);
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::apple::plist::PListFile;
use crate::apple::simulator::{
    Simulator, SimulatorAvailability, SimulatorRuntime, SimulatorState,
};
use crate::apple::SimctlError;
use crate::process::{OutputLine, ProcessResult, ProcessRunner};
use crate::version::Version;

const XCRUN: &str = "/usr/bin/xcrun";
const STATE_POLL_INTERVAL: Duration = Duration::from_secs(1);

static RUNTIME_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"com\.apple\.CoreSimulator\.SimRuntime\.(.+)-(\d+)-(\d+)").expect("valid regex")
});

/// Options for [`SimulatorControl::launch_app`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchAppOptions {
    /// Attach to the app's console and stream its output.
    pub capture_output: bool,
}

/// The JSON payload of `simctl list devices --json`: runtimes keyed by their
/// CoreSimulator identifier, each with a list of devices.
#[derive(Deserialize)]
struct DeviceListPayload {
    devices: HashMap<String, Vec<DevicePayload>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevicePayload {
    udid: String,
    name: String,
    #[serde(default)]
    state: Option<String>,
    /// Pre-Xcode 10.1 field, e.g. `"(available)"`.
    #[serde(default)]
    availability: Option<String>,
    /// Modern field; a bool in current Xcode, a `"YES"`/`"true"` string in
    /// older releases.
    #[serde(default)]
    is_available: Option<AvailableFlag>,
    #[serde(default)]
    data_path: Option<PathBuf>,
    #[serde(default)]
    log_path: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AvailableFlag {
    Bool(bool),
    Text(String),
}

impl DevicePayload {
    fn is_available(&self) -> bool {
        if self.availability.as_deref() == Some("(available)") {
            return true;
        }
        match &self.is_available {
            Some(AvailableFlag::Bool(value)) => *value,
            Some(AvailableFlag::Text(text)) => text == "YES" || text == "true",
            None => false,
        }
    }
}

/// Wrapper around `xcrun simctl`.
pub struct SimulatorControl {
    runner: ProcessRunner,
    xcrun: PathBuf,
}

impl Default for SimulatorControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatorControl {
    pub fn new() -> Self {
        Self {
            runner: ProcessRunner::new(),
            xcrun: PathBuf::from(XCRUN),
        }
    }

    /// The platform version of the installed SDK for a runtime.
    pub async fn default_version(
        &self,
        runtime: SimulatorRuntime,
        cancel: &CancellationToken,
    ) -> Result<Version, SimctlError> {
        info!(%runtime, "retrieving the default version");

        let sdk = match runtime {
            SimulatorRuntime::TvOs => "appletvos",
            SimulatorRuntime::WatchOs => "watchos",
            SimulatorRuntime::Ios => "iphoneos",
        };

        let result = self
            .runner
            .run(
                &self.xcrun,
                &["--sdk", sdk, "--show-sdk-platform-version"],
                cancel,
            )
            .await?;

        let text = result.stdout();
        text.trim()
            .parse()
            .map_err(|_| SimctlError::InvalidVersion { text })
    }

    /// Freshly queries every simulator known to CoreSimulator.
    pub async fn list_simulators(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Simulator>, SimctlError> {
        info!("retrieving all the simulators");

        let result = self
            .runner
            .run(
                &self.xcrun,
                &["simctl", "list", "devices", "--json"],
                cancel,
            )
            .await?;

        parse_simulator_list(&result.stdout())
    }

    /// Looks up one simulator by udid in a fresh listing.
    pub async fn simulator(
        &self,
        udid: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Simulator>, SimctlError> {
        debug!(udid, "retrieving simulator");

        let result = self
            .runner
            .run(
                &self.xcrun,
                &["simctl", "list", "devices", udid, "--json"],
                cancel,
            )
            .await?;

        let mut simulators = parse_simulator_list(&result.stdout())?;
        if simulators.len() > 1 {
            debug!(udid, count = simulators.len(), "more than one simulator matched, using the first");
        }
        Ok(if simulators.is_empty() {
            None
        } else {
            Some(simulators.swap_remove(0))
        })
    }

    /// Boots a simulator and waits for it to reach the Booted state.
    /// Already-booted simulators are left untouched.
    pub async fn boot(&self, udid: &str, cancel: &CancellationToken) -> Result<(), SimctlError> {
        info!(udid, "booting simulator");

        let simulator = self.require_simulator(udid, cancel).await?;
        if simulator.state == SimulatorState::Booted {
            return Ok(());
        }

        self.runner
            .run(&self.xcrun, &["simctl", "boot", udid], cancel)
            .await?;
        self.ensure_state(udid, SimulatorState::Booted, cancel).await
    }

    /// Shuts a simulator down and waits for it to reach the Shutdown state.
    /// Already-shutdown simulators are left untouched.
    pub async fn shutdown(&self, udid: &str, cancel: &CancellationToken) -> Result<(), SimctlError> {
        info!(udid, "shutting down simulator");

        let simulator = self.require_simulator(udid, cancel).await?;
        if simulator.state == SimulatorState::Shutdown {
            return Ok(());
        }

        self.runner
            .run(&self.xcrun, &["simctl", "shutdown", udid], cancel)
            .await?;
        self.ensure_state(udid, SimulatorState::Shutdown, cancel)
            .await
    }

    /// Erases a simulator back to factory state, shutting it down first when
    /// it is booted.
    pub async fn erase(&self, udid: &str, cancel: &CancellationToken) -> Result<(), SimctlError> {
        info!(udid, "erasing simulator");

        let simulator = self.require_simulator(udid, cancel).await?;
        if simulator.state == SimulatorState::Booted {
            self.shutdown(udid, cancel).await?;
        }

        self.runner
            .run(&self.xcrun, &["simctl", "erase", udid], cancel)
            .await?;
        Ok(())
    }

    /// Installs an app bundle onto a simulator.
    pub async fn install_app(
        &self,
        udid: &str,
        app_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), SimctlError> {
        if !app_path.is_dir() {
            return Err(SimctlError::MissingApp {
                path: app_path.to_path_buf(),
            });
        }

        info!(udid, app = %app_path.display(), "installing app");

        self.require_simulator(udid, cancel).await?;
        let app = app_path.display().to_string();
        self.runner
            .run(&self.xcrun, &["simctl", "install", udid, &app], cancel)
            .await?;
        Ok(())
    }

    /// Uninstalls an app from a simulator.
    pub async fn uninstall_app(
        &self,
        udid: &str,
        bundle_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SimctlError> {
        info!(udid, bundle_id, "uninstalling app");

        self.require_simulator(udid, cancel).await?;
        self.runner
            .run(
                &self.xcrun,
                &["simctl", "uninstall", udid, bundle_id],
                cancel,
            )
            .await?;
        Ok(())
    }

    /// Launches an app, optionally streaming its console output through the
    /// observer.
    ///
    /// With output capture the invocation follows the app's console until
    /// the app exits or `cancel` fires; cancellation surfaces as
    /// [`ProcessError::Canceled`](crate::process::ProcessError::Canceled)
    /// carrying the output streamed so far.
    pub async fn launch_app(
        &self,
        udid: &str,
        bundle_id: &str,
        options: LaunchAppOptions,
        observer: impl FnMut(&OutputLine) + Send,
        cancel: &CancellationToken,
    ) -> Result<ProcessResult, SimctlError> {
        info!(udid, bundle_id, "launching app");

        self.require_simulator(udid, cancel).await?;

        let mut args = vec!["simctl", "launch"];
        if options.capture_output {
            args.push("--console");
        }
        args.extend([udid, bundle_id]);

        Ok(self
            .runner
            .run_observed(&self.xcrun, &args, observer, cancel)
            .await?)
    }

    /// Terminates a running app. A simulator that is not booted has no
    /// running apps, so nothing is done.
    pub async fn terminate_app(
        &self,
        udid: &str,
        bundle_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), SimctlError> {
        info!(udid, bundle_id, "terminating app");

        let simulator = self.require_simulator(udid, cancel).await?;
        if simulator.state != SimulatorState::Booted {
            return Ok(());
        }

        self.runner
            .run(
                &self.xcrun,
                &["simctl", "terminate", udid, bundle_id],
                cancel,
            )
            .await?;
        Ok(())
    }

    /// The app's data container directory, found by scanning the
    /// container-manager metadata plists for the bundle identifier.
    pub async fn data_directory(
        &self,
        udid: &str,
        bundle_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, SimctlError> {
        info!(udid, bundle_id, "retrieving app data directory");

        let simulator = self.require_simulator(udid, cancel).await?;
        let data_path = simulator
            .data_path
            .ok_or_else(|| SimctlError::MissingDataPath {
                udid: udid.to_string(),
            })?;

        let containers = data_path
            .join("Containers")
            .join("Data")
            .join("Application");
        let mut entries = tokio::fs::read_dir(&containers).await?;
        while let Some(entry) = entries.next_entry().await? {
            let container = entry.path();
            let metadata = container.join(".com.apple.mobile_container_manager.metadata.plist");
            if !metadata.is_file() {
                continue;
            }
            let plist = PListFile::load(&metadata, cancel).await?;
            if plist.string_value("MCMMetadataIdentifier") == Some(bundle_id) {
                return Ok(container);
            }
        }

        Err(SimctlError::AppNotFound {
            bundle_id: bundle_id.to_string(),
            udid: udid.to_string(),
        })
    }

    /// The installed app bundle path, found by scanning the bundle
    /// containers' `Info.plist`s for the bundle identifier.
    pub async fn installed_app_path(
        &self,
        udid: &str,
        bundle_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, SimctlError> {
        info!(udid, bundle_id, "retrieving installed app path");

        let simulator = self.require_simulator(udid, cancel).await?;
        let data_path = simulator
            .data_path
            .ok_or_else(|| SimctlError::MissingDataPath {
                udid: udid.to_string(),
            })?;

        let containers = data_path
            .join("Containers")
            .join("Bundle")
            .join("Application");
        let mut entries = tokio::fs::read_dir(&containers).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(app_path) = single_app_bundle(&entry.path()).await? else {
                continue;
            };
            let plist = PListFile::load(&app_path.join("Info.plist"), cancel).await?;
            if plist.bundle_identifier() == Some(bundle_id) {
                return Ok(app_path);
            }
        }

        Err(SimctlError::AppNotFound {
            bundle_id: bundle_id.to_string(),
            udid: udid.to_string(),
        })
    }

    async fn require_simulator(
        &self,
        udid: &str,
        cancel: &CancellationToken,
    ) -> Result<Simulator, SimctlError> {
        self.simulator(udid, cancel)
            .await?
            .ok_or_else(|| SimctlError::SimulatorNotFound {
                udid: udid.to_string(),
            })
    }

    async fn ensure_state(
        &self,
        udid: &str,
        target: SimulatorState,
        cancel: &CancellationToken,
    ) -> Result<(), SimctlError> {
        loop {
            let simulator = self.require_simulator(udid, cancel).await?;
            if simulator.state == target {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(SimctlError::Interrupted),
                _ = tokio::time::sleep(STATE_POLL_INTERVAL) => {}
            }
        }
    }
}

/// Parses the `simctl list devices --json` payload into simulator records.
///
/// Runtimes whose key does not match the CoreSimulator naming convention are
/// skipped, since neither their OS nor version can be derived.
pub fn parse_simulator_list(json: &str) -> Result<Vec<Simulator>, SimctlError> {
    let payload: DeviceListPayload = serde_json::from_str(json)?;

    let mut simulators = Vec::new();
    for (runtime_key, devices) in payload.devices {
        let Some(caps) = RUNTIME_KEY_RE.captures(&runtime_key) else {
            debug!(runtime_key, "skipping unknown simulator runtime");
            continue;
        };

        let runtime = match &caps[1] {
            "watchOS" => SimulatorRuntime::WatchOs,
            "tvOS" => SimulatorRuntime::TvOs,
            _ => SimulatorRuntime::Ios,
        };
        let version = Version::new(
            caps[2].parse().unwrap_or(0),
            caps[3].parse().unwrap_or(0),
        );

        for device in devices {
            let state = match device.state.as_deref() {
                Some("Booted") => SimulatorState::Booted,
                Some("Shutdown") => SimulatorState::Shutdown,
                _ => SimulatorState::Unknown,
            };
            let availability = if device.is_available() {
                SimulatorAvailability::Available
            } else {
                SimulatorAvailability::Unavailable
            };

            simulators.push(Simulator {
                udid: device.udid,
                name: device.name,
                runtime,
                version,
                state,
                availability,
                data_path: device.data_path,
                log_path: device.log_path,
            });
        }
    }

    Ok(simulators)
}

async fn single_app_bundle(container: &Path) -> Result<Option<PathBuf>, SimctlError> {
    let mut found = None;
    let mut entries = tokio::fs::read_dir(container).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("app") && path.is_dir() {
            if found.is_some() {
                return Ok(None);
            }
            found = Some(path);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apple::simulator::SimulatorDeviceType;

    const SAMPLE_DEVICE_LIST: &str = r#"{
        "devices": {
            "com.apple.CoreSimulator.SimRuntime.iOS-13-2": [
                {
                    "udid": "A1B2C3D4-E5F6-7890-ABCD-EF1234567890",
                    "name": "iPhone 11 Pro",
                    "state": "Booted",
                    "isAvailable": true,
                    "dataPath": "/sims/A1B2/data",
                    "logPath": "/sims/A1B2/logs"
                },
                {
                    "udid": "B2C3D4E5-F6A7-8901-BCDE-F12345678901",
                    "name": "iPad Air",
                    "state": "Shutdown",
                    "isAvailable": false
                }
            ],
            "com.apple.CoreSimulator.SimRuntime.watchOS-6-1": [
                {
                    "udid": "C3D4E5F6-A7B8-9012-CDEF-123456789012",
                    "name": "Apple Watch Series 5 - 44mm",
                    "state": "Shutdown",
                    "availability": "(available)"
                }
            ],
            "com.apple.CoreSimulator.SimRuntime.unknown": [
                {
                    "udid": "D4E5F6A7-B8C9-0123-DEF1-234567890123",
                    "name": "Mystery",
                    "state": "Shutdown"
                }
            ]
        }
    }"#;

    #[test]
    fn parses_devices_across_runtimes() {
        let mut simulators = parse_simulator_list(SAMPLE_DEVICE_LIST).unwrap();
        simulators.sort_by(|a, b| a.name.cmp(&b.name));

        // The unknown runtime key is skipped.
        assert_eq!(simulators.len(), 3);

        let watch = &simulators[0];
        assert_eq!(watch.runtime, SimulatorRuntime::WatchOs);
        assert_eq!(watch.version, Version::new(6, 1));
        assert_eq!(watch.device_type(), SimulatorDeviceType::AppleWatch);
        assert_eq!(watch.availability, SimulatorAvailability::Available);
    }

    #[test]
    fn parses_state_and_paths() {
        let simulators = parse_simulator_list(SAMPLE_DEVICE_LIST).unwrap();
        let booted = simulators
            .iter()
            .find(|s| s.state == SimulatorState::Booted)
            .unwrap();
        assert_eq!(booted.name, "iPhone 11 Pro");
        assert_eq!(booted.version, Version::new(13, 2));
        assert_eq!(booted.data_path.as_deref(), Some(Path::new("/sims/A1B2/data")));
        assert_eq!(booted.log_path.as_deref(), Some(Path::new("/sims/A1B2/logs")));
    }

    #[test]
    fn availability_accepts_bool_string_and_legacy_forms() {
        let json = r#"{
            "devices": {
                "com.apple.CoreSimulator.SimRuntime.iOS-12-4": [
                    {"udid": "a", "name": "iPhone A", "state": "Shutdown", "isAvailable": "YES"},
                    {"udid": "b", "name": "iPhone B", "state": "Shutdown", "isAvailable": "no"},
                    {"udid": "c", "name": "iPhone C", "state": "Shutdown"}
                ]
            }
        }"#;
        let mut simulators = parse_simulator_list(json).unwrap();
        simulators.sort_by(|a, b| a.udid.cmp(&b.udid));
        assert_eq!(simulators[0].availability, SimulatorAvailability::Available);
        assert_eq!(simulators[1].availability, SimulatorAvailability::Unavailable);
        assert_eq!(simulators[2].availability, SimulatorAvailability::Unavailable);
    }

    #[test]
    fn empty_device_list_parses() {
        let simulators = parse_simulator_list(r#"{"devices": {}}"#).unwrap();
        assert!(simulators.is_empty());
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(
            parse_simulator_list("not json"),
            Err(SimctlError::Json(_))
        ));
    }

    #[test]
    fn missing_devices_key_is_a_parse_error() {
        assert!(parse_simulator_list(r#"{"something_else": []}"#).is_err());
    }
}
