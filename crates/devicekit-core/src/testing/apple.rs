//! Orchestrated test runs on Apple simulators.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::apple::plist::PListFile;
use crate::apple::simctl::{LaunchAppOptions, SimulatorControl};
use crate::apple::simulator::{
    Simulator, SimulatorDeviceType, SimulatorRuntime, SimulatorState,
};
use crate::apple::SimctlError;
use crate::process::{OutputLine, ProcessError};
use crate::testing::options::{parse_simulator_runtime, parse_simulator_type};
use crate::testing::results::{TestResultsParser, TestRunSummary};
use crate::testing::{TestRunError, TestRunOptions};
use crate::version::Version;

/// Runs a test app bundle on a selected Apple simulator.
pub struct AppleTestRunner {
    simctl: SimulatorControl,
}

impl Default for AppleTestRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl AppleTestRunner {
    pub fn new() -> Self {
        Self {
            simctl: SimulatorControl::new(),
        }
    }

    /// Selects a simulator, installs the app bundle, runs it to completion
    /// and cleans up. Uninstall and shutdown are attempted even when an
    /// earlier step failed; their failures are logged but never mask the
    /// original error.
    pub async fn run(
        &self,
        app: &Path,
        options: &TestRunOptions,
        cancel: &CancellationToken,
    ) -> Result<TestRunSummary, TestRunError> {
        let plist = PListFile::load(&app.join("Info.plist"), cancel)
            .await
            .map_err(TestRunError::Apple)?;
        let bundle_id = plist
            .bundle_identifier()
            .ok_or(TestRunError::MissingBundleIdentifier)?
            .to_string();

        info!(bundle_id, "running tests");

        let device_type = parse_simulator_type(options.device_type.as_deref())?;
        let runtime = parse_simulator_runtime(options.runtime.as_deref())?;
        let version = self
            .resolve_version(options.version.as_deref(), runtime, cancel)
            .await?;

        info!(%device_type, %runtime, %version, "looking for an available simulator");
        let candidates = self
            .matching_simulators(
                device_type,
                runtime,
                version,
                options.latest,
                options.device_name.as_deref(),
                cancel,
            )
            .await?;

        // Prefer a simulator that is already booted.
        let simulator = candidates
            .iter()
            .find(|simulator| simulator.state == SimulatorState::Booted)
            .or_else(|| candidates.first())
            .cloned()
            .ok_or_else(|| TestRunError::NoMatchingDevice {
                pattern: format!("[{version}]"),
            })?;
        info!(
            name = %simulator.name,
            runtime = %simulator.runtime,
            version = %simulator.version,
            udid = %simulator.udid,
            "using simulator"
        );

        let outcome = self
            .run_on_simulator(&simulator, app, &bundle_id, options, cancel)
            .await;

        if options.shutdown {
            if let Err(err) = self.simctl.shutdown(&simulator.udid, cancel).await {
                warn!(udid = %simulator.udid, error = %err, "failed to shut down the simulator");
            }
        }

        outcome
    }

    async fn run_on_simulator(
        &self,
        simulator: &Simulator,
        app: &Path,
        bundle_id: &str,
        options: &TestRunOptions,
        cancel: &CancellationToken,
    ) -> Result<TestRunSummary, TestRunError> {
        if options.reset {
            self.simctl.erase(&simulator.udid, cancel).await?;
        }

        self.simctl.boot(&simulator.udid, cancel).await?;
        self.simctl.install_app(&simulator.udid, app, cancel).await?;

        let outcome = self
            .exercise_app(simulator, bundle_id, options, cancel)
            .await;

        if let Err(err) = self
            .simctl
            .uninstall_app(&simulator.udid, bundle_id, cancel)
            .await
        {
            warn!(udid = %simulator.udid, error = %err, "failed to uninstall the test app");
        }

        outcome
    }

    /// Launches the app with console capture streamed through the results
    /// parser; the summary marker stops the stream and the app is then
    /// terminated. Then copies the results file out of the app's data
    /// container when one was requested.
    async fn exercise_app(
        &self,
        simulator: &Simulator,
        bundle_id: &str,
        options: &TestRunOptions,
        cancel: &CancellationToken,
    ) -> Result<TestRunSummary, TestRunError> {
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

        let launch = self
            .simctl
            .launch_app(
                &simulator.udid,
                bundle_id,
                LaunchAppOptions {
                    capture_output: true,
                },
                observer,
                &stream,
            )
            .await;

        match launch {
            // The app exited on its own and the console stream ended.
            Ok(_) => {}
            // The summary marker stopped the stream; the app is still
            // running and needs to be terminated.
            Err(SimctlError::Process(ProcessError::Canceled { .. })) if !cancel.is_cancelled() => {
                self.simctl
                    .terminate_app(&simulator.udid, bundle_id, cancel)
                    .await?;
            }
            Err(err) => return Err(err.into()),
        }

        if let Some(device_results) = options.device_results.as_deref() {
            let dest = options
                .output_results
                .clone()
                .unwrap_or_else(|| default_output_path(device_results));
            info!(dest = %dest.display(), "copying test results from the simulator");

            let data_dir = self
                .simctl
                .data_directory(&simulator.udid, bundle_id, cancel)
                .await?;
            let results = data_dir.join("Documents").join(device_results);
            if results.is_file() {
                tokio::fs::copy(&results, &dest).await?;
            } else {
                info!("no test results found");
            }
        } else {
            info!("no device results path configured");
        }

        Ok(parser.summary())
    }

    async fn resolve_version(
        &self,
        text: Option<&str>,
        runtime: SimulatorRuntime,
        cancel: &CancellationToken,
    ) -> Result<Version, TestRunError> {
        let word = text.map(|t| t.trim().to_lowercase());
        match word.as_deref() {
            None | Some("") | Some("default") => Ok(self
                .simctl
                .default_version(runtime, cancel)
                .await
                .map_err(TestRunError::Apple)?),
            Some(word) => word
                .parse()
                .map_err(|_| TestRunError::InvalidVersion {
                    text: word.to_string(),
                }),
        }
    }

    /// Applies the simulator-selection rules: available simulators of the
    /// requested runtime and hardware class, then either versions within
    /// `[floor, nextMajor)` or an exact version. An explicit name matches
    /// name or udid directly.
    async fn matching_simulators(
        &self,
        device_type: SimulatorDeviceType,
        runtime: SimulatorRuntime,
        version: Version,
        use_latest: bool,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Simulator>, TestRunError> {
        let simulators = self.simctl.list_simulators(cancel).await?;

        if let Some(name) = name {
            let matching: Vec<Simulator> = simulators
                .into_iter()
                .filter(|simulator| simulator.name == name || simulator.udid == name)
                .collect();
            if matching.is_empty() {
                return Err(TestRunError::NoMatchingDevice {
                    pattern: format!("'{name}'"),
                });
            }
            return Ok(matching);
        }

        let available: Vec<Simulator> = simulators
            .into_iter()
            .filter(|simulator| {
                simulator.is_available()
                    && simulator.runtime == runtime
                    && simulator.device_type() == device_type
            })
            .collect();
        for simulator in &available {
            debug!(
                name = %simulator.name,
                version = %simulator.version,
                udid = %simulator.udid,
                "candidate simulator"
            );
        }

        let (matching, pattern) = if use_latest {
            let floor = version;
            let ceiling = version.next_major();
            (
                available
                    .into_iter()
                    .filter(|simulator| {
                        simulator.version >= floor && simulator.version < ceiling
                    })
                    .collect::<Vec<Simulator>>(),
                format!("[{floor}, {ceiling})"),
            )
        } else {
            (
                available
                    .into_iter()
                    .filter(|simulator| simulator.version == version)
                    .collect(),
                format!("[{version}]"),
            )
        };

        if matching.is_empty() {
            return Err(TestRunError::NoMatchingDevice { pattern });
        }
        Ok(matching)
    }
}

fn default_output_path(device_results: &str) -> PathBuf {
    let name = device_results
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(device_results);
    PathBuf::from(name)
}
