//! Android device records and the pure lookups derived from them.
//!
//! A [`VirtualDevice`] is a persisted AVD configuration; a
//! [`ConnectedDevice`] is an entry in `adb devices`. Version, runtime and
//! console port are never stored - they are standalone lookup functions of
//! the API level, the device type and the serial respectively.

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::version::Version;

static EMULATOR_SERIAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"emulator-(\d+)").expect("valid regex"));

/// The hardware profile class of a virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceType {
    Phone,
    Tablet,
    Tv,
    Wearable,
    Unknown,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceType::Phone => "Phone",
            DeviceType::Tablet => "Tablet",
            DeviceType::Tv => "TV",
            DeviceType::Wearable => "Wearable",
            DeviceType::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// The Android platform flavor a device runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VirtualDeviceRuntime {
    Android,
    AndroidWear,
    AndroidTv,
}

impl fmt::Display for VirtualDeviceRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VirtualDeviceRuntime::Android => "Android",
            VirtualDeviceRuntime::AndroidWear => "Android Wear",
            VirtualDeviceRuntime::AndroidTv => "Android TV",
        };
        f.write_str(name)
    }
}

/// Connectivity state reported by `adb devices`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectedDeviceState {
    Connected,
    Disconnected,
    Unknown,
}

/// A named, persisted Android virtual device configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VirtualDevice {
    /// The AVD id (the `avdid` config key, or the directory stem).
    pub id: String,
    /// Human-readable display name.
    pub name: String,
    /// Normalized system-image package identifier.
    pub package: String,
    /// Hardware profile class.
    pub device_type: DeviceType,
    /// Android API level; 0 when it could not be derived.
    pub api_level: u32,
    /// Path to the AVD data directory.
    pub path: PathBuf,
}

impl VirtualDevice {
    /// The OS release this device runs, looked up from the API level.
    pub fn version(&self) -> Version {
        android_release(self.api_level)
    }

    /// The platform flavor, looked up from the device type.
    pub fn runtime(&self) -> VirtualDeviceRuntime {
        runtime_for_type(self.device_type)
    }
}

impl fmt::Display for VirtualDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A row from `avdmanager list device -c`: a creatable hardware profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    pub id: String,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A row from `avdmanager list target -c`: an installed platform target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceTarget {
    pub id: String,
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A device visible to `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectedDevice {
    pub serial: String,
    pub state: ConnectedDeviceState,
}

impl ConnectedDevice {
    /// The emulator console port, when the serial encodes one.
    pub fn console_port(&self) -> Option<u16> {
        console_port_from_serial(&self.serial)
    }
}

impl fmt::Display for ConnectedDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serial)
    }
}

/// Extracts the console port from an `emulator-<port>` serial.
pub fn console_port_from_serial(serial: &str) -> Option<u16> {
    EMULATOR_SERIAL_RE
        .captures(serial)
        .and_then(|caps| caps[1].parse().ok())
}

/// The platform flavor for a device type.
pub fn runtime_for_type(device_type: DeviceType) -> VirtualDeviceRuntime {
    match device_type {
        DeviceType::Wearable => VirtualDeviceRuntime::AndroidWear,
        DeviceType::Tv => VirtualDeviceRuntime::AndroidTv,
        _ => VirtualDeviceRuntime::Android,
    }
}

/// The Android release for an API level.
///
/// Level 20 maps to 4.4, the release that preceded Wear's own numbering.
/// Unknown levels map to 0.0.
pub fn android_release(api_level: u32) -> Version {
    match api_level {
        1 => Version::new(1, 0),
        2 => Version::new(1, 1),
        3 => Version::new(1, 5),
        4 => Version::new(1, 6),
        5 => Version::new(2, 0),
        6 => Version::with_patch(2, 0, 1),
        7 => Version::new(2, 1),
        8 => Version::new(2, 2),
        9 => Version::new(2, 3),
        10 => Version::with_patch(2, 3, 3),
        11 => Version::new(3, 0),
        12 => Version::new(3, 1),
        13 => Version::new(3, 2),
        14 => Version::new(4, 0),
        15 => Version::with_patch(4, 0, 3),
        16 => Version::new(4, 1),
        17 => Version::new(4, 2),
        18 => Version::new(4, 3),
        19 => Version::new(4, 4),
        20 => Version::new(4, 4),
        21 => Version::new(5, 0),
        22 => Version::new(5, 1),
        23 => Version::new(6, 0),
        24 => Version::new(7, 0),
        25 => Version::new(7, 1),
        26 => Version::new(8, 0),
        27 => Version::new(8, 1),
        28 => Version::new(9, 0),
        29 => Version::new(10, 0),
        30 => Version::new(11, 0),
        _ => Version::ZERO,
    }
}
