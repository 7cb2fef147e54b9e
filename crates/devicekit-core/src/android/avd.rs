//! Interface to the `avdmanager` tool.
//!
//! Manages the SDK's registry of named virtual devices. Listings re-query
//! the tool every call - the registry is externally mutable and never cached
//! here. Create and delete are idempotent: the tool's "already exists" /
//! "does not exist" failures are intercepted and reported as explicit
//! outcome variants instead of errors.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::android::config::VirtualDeviceConfig;
use crate::android::device::{DeviceProfile, DeviceTarget, VirtualDevice};
use crate::android::{sdk, AndroidError};
use crate::process::{ProcessError, ProcessResult, ProcessRunner};

static AVD_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*Path:\s*(.+)").expect("valid regex"));

/// Literal fragments of the tool's English error text. Matching on these is
/// fragile against avdmanager version or locale changes; both phrases are
/// intercepted in exactly one place each.
const ALREADY_EXISTS_TEXT: &str = "already exists";
const DOES_NOT_EXIST_TEXT: &str = "does not exist";

/// Where avdmanager lives, by SDK generation.
const AVDMANAGER_LOCATIONS: [&str; 2] = [
    "cmdline-tools/latest/bin/avdmanager",
    "tools/bin/avdmanager",
];

/// Options for [`AvdManager::create`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateVirtualDeviceOptions {
    /// Replace an existing AVD with the same name.
    pub overwrite: bool,
}

/// Result of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// The AVD was already present; treated as success.
    AlreadyExists,
}

/// Result of an idempotent delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The AVD was already absent; treated as success.
    NotPresent,
}

/// Wrapper around the `avdmanager` tool.
#[derive(Debug)]
pub struct AvdManager {
    runner: ProcessRunner,
    avdmanager: PathBuf,
}

impl AvdManager {
    pub fn new(sdk_root: Option<&Path>) -> Result<Self, AndroidError> {
        let root = sdk::find_sdk_root(sdk_root)?;
        let avdmanager = AVDMANAGER_LOCATIONS
            .iter()
            .find_map(|location| sdk::find_tool(&root, location))
            .ok_or(AndroidError::ToolNotFound { tool: "avdmanager" })?;
        Ok(Self {
            runner: ProcessRunner::new(),
            avdmanager,
        })
    }

    /// Lists the creatable hardware profiles.
    pub async fn list_device_profiles(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<DeviceProfile>, AndroidError> {
        info!("retrieving device profiles");

        let result = self
            .runner
            .run(&self.avdmanager, &["list", "device", "-c"], cancel)
            .await?;

        Ok(list_results(&result)
            .map(|id| DeviceProfile { id: id.to_string() })
            .collect())
    }

    /// Lists the installed platform targets.
    pub async fn list_targets(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<DeviceTarget>, AndroidError> {
        info!("retrieving device targets");

        let result = self
            .runner
            .run(&self.avdmanager, &["list", "target", "-c"], cancel)
            .await?;

        Ok(list_results(&result)
            .map(|id| DeviceTarget { id: id.to_string() })
            .collect())
    }

    /// Lists the registered virtual devices by reading each AVD's
    /// `config.ini` from the paths the tool reports.
    pub async fn list_virtual_devices(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<VirtualDevice>, AndroidError> {
        info!("retrieving virtual devices");

        let result = self
            .runner
            .run(&self.avdmanager, &["list", "avd"], cancel)
            .await?;

        let mut devices = Vec::new();
        for line in list_results(&result) {
            let Some(caps) = AVD_PATH_RE.captures(line) else {
                continue;
            };
            let path = Path::new(caps.get(1).map_or("", |m| m.as_str()));
            if path.is_dir() && path.join("config.ini").is_file() {
                let config = VirtualDeviceConfig::load(path).await?;
                devices.push(config.to_virtual_device()?);
            }
        }
        Ok(devices)
    }

    /// Creates a virtual device from a system-image package.
    ///
    /// The tool's interactive "create a custom hardware profile?" question is
    /// answered with `no`.
    pub async fn create(
        &self,
        name: &str,
        package: &str,
        options: CreateVirtualDeviceOptions,
        cancel: &CancellationToken,
    ) -> Result<CreateOutcome, AndroidError> {
        info!(name, package, "creating virtual device");

        let mut args = vec!["create", "avd", "--name", name, "--package", package];
        if options.overwrite {
            args.push("--force");
        }

        match self
            .runner
            .run_with_input(&self.avdmanager, &args, "no", cancel)
            .await
        {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(ProcessError::Failed { result, .. }) if result.contains(ALREADY_EXISTS_TEXT) => {
                debug!(name, "virtual device already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Deletes a virtual device.
    pub async fn delete(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<DeleteOutcome, AndroidError> {
        info!(name, "deleting virtual device");

        match self
            .runner
            .run(&self.avdmanager, &["delete", "avd", "--name", name], cancel)
            .await
        {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(ProcessError::Failed { result, .. }) if result.contains(DOES_NOT_EXIST_TEXT) => {
                debug!(name, "virtual device does not exist");
                Ok(DeleteOutcome::NotPresent)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Renames a virtual device.
    pub async fn rename(
        &self,
        name: &str,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AndroidError> {
        info!(name, new_name, "renaming virtual device");

        self.runner
            .run(
                &self.avdmanager,
                &["move", "avd", "--name", name, "--rename", new_name],
                cancel,
            )
            .await?;
        Ok(())
    }

    /// Moves a virtual device's data directory.
    pub async fn relocate(
        &self,
        name: &str,
        new_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), AndroidError> {
        info!(name, path = %new_path.display(), "moving virtual device");

        let new_path = new_path.display().to_string();
        self.runner
            .run(
                &self.avdmanager,
                &["move", "avd", "--name", name, "--path", &new_path],
                cancel,
            )
            .await?;
        Ok(())
    }

    /// Resets a virtual device to a clean state by removing the mutable
    /// runtime state from its data directory. The emulator recreates these
    /// files on the next boot.
    pub async fn reset(&self, id: &str, cancel: &CancellationToken) -> Result<(), AndroidError> {
        info!(id, "resetting virtual device");

        let device = self
            .list_virtual_devices(cancel)
            .await?
            .into_iter()
            .find(|device| device.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| AndroidError::AvdNotFound { id: id.to_string() })?;

        for file in [
            "userdata-qemu.img",
            "userdata-qemu.img.qcow2",
            "cache.img",
            "cache.img.qcow2",
        ] {
            let path = device.path.join(file);
            if path.is_file() {
                tokio::fs::remove_file(&path).await?;
            }
        }

        let snapshots = device.path.join("snapshots");
        if snapshots.is_dir() {
            tokio::fs::remove_dir_all(&snapshots).await?;
        }
        Ok(())
    }
}

/// Filters tool chatter out of a listing.
///
/// Skipped entirely: blank lines, `[`-prefixed progress bars and `Loading`
/// lines. `Parsing ...package.xml` lines sometimes arrive merged with real
/// output, so anything after the last `package.xml` is kept.
fn list_results(result: &ProcessResult) -> impl Iterator<Item = &str> {
    const PACKAGE_XML: &str = "package.xml";

    result.stdout_lines().filter_map(|line| {
        if line.trim().is_empty() || line.starts_with('[') || line.starts_with("Loading ") {
            return None;
        }
        if line.starts_with("Parsing ") {
            if line.ends_with(PACKAGE_XML) {
                return None;
            }
            let index = line.rfind(PACKAGE_XML)?;
            let rest = &line[index + PACKAGE_XML.len()..];
            if rest.trim().is_empty() {
                return None;
            }
            return Some(rest);
        }
        Some(line)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{OutputLine, OutputSource};
    use chrono::Utc;
    use std::time::Duration;

    fn result_from(lines: &[&str]) -> ProcessResult {
        let lines = lines
            .iter()
            .enumerate()
            .map(|(index, data)| OutputLine {
                data: data.to_string(),
                elapsed: Duration::from_millis(index as u64),
                source: OutputSource::Stdout,
            })
            .collect::<Vec<_>>();
        ProcessResult::from_parts(lines, 0, Utc::now(), Duration::from_millis(10))
    }

    #[test]
    fn listing_skips_progress_and_loading_chatter() {
        let result = result_from(&[
            "[=======     ] 25% Fetch remote repository",
            "Loading local repository...",
            "",
            "pixel",
            "pixel_xl",
        ]);
        let rows: Vec<&str> = list_results(&result).collect();
        assert_eq!(rows, vec!["pixel", "pixel_xl"]);
    }

    #[test]
    fn listing_recovers_rows_merged_with_parsing_noise() {
        let result = result_from(&[
            "Parsing /sdk/add-ons/addon-google_apis/package.xml",
            "Parsing /sdk/platforms/android-29/package.xmlpixel_3a",
        ]);
        let rows: Vec<&str> = list_results(&result).collect();
        assert_eq!(rows, vec!["pixel_3a"]);
    }

    #[test]
    fn listing_drops_parsing_rows_with_nothing_after_the_marker() {
        let result = result_from(&["Parsing /sdk/platforms/android-29/package.xml   "]);
        assert_eq!(list_results(&result).count(), 0);
    }
}
