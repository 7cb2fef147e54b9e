//! Test-run options and the word tables that resolve them to typed filters.

use std::path::PathBuf;

use crate::android::device::{DeviceType, VirtualDeviceRuntime};
use crate::apple::simulator::{SimulatorDeviceType, SimulatorRuntime};
use crate::testing::TestRunError;

/// Caller options for one orchestrated test run.
#[derive(Debug, Clone, Default)]
pub struct TestRunOptions {
    /// Path of the results file on the device, relative to the app's data
    /// directory (Android) or its `Documents` directory (Apple).
    pub device_results: Option<String>,
    /// Where to put the pulled results file on the host. Defaults to the
    /// device file's name in the working directory.
    pub output_results: Option<PathBuf>,
    /// Requested runtime word (e.g. `android`, `wear`, `ios`, `tvos`).
    pub runtime: Option<String>,
    /// Requested version: an API level on Android, `<major>[.<minor>]` on
    /// Apple.
    pub version: Option<String>,
    /// Pick the newest version among the filtered candidates at or above
    /// the requested floor.
    pub latest: bool,
    /// Requested device-type word (e.g. `phone`, `tablet`, `tv`, `watch`).
    pub device_type: Option<String>,
    /// Exact device name or id; bypasses the type/version filters.
    pub device_name: Option<String>,
    /// Reset the device to a clean state before the run.
    pub reset: bool,
    /// Shut the device down after the run.
    pub shutdown: bool,
}

fn normalized(text: Option<&str>) -> Option<String> {
    let text = text?.trim().to_lowercase();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub(crate) fn parse_android_runtime(
    text: Option<&str>,
) -> Result<VirtualDeviceRuntime, TestRunError> {
    let Some(word) = normalized(text) else {
        return Ok(VirtualDeviceRuntime::Android);
    };
    match word.as_str() {
        "android" => Ok(VirtualDeviceRuntime::Android),
        "watch" | "wear" | "androidwear" | "wearable" => Ok(VirtualDeviceRuntime::AndroidWear),
        "tv" | "androidtv" => Ok(VirtualDeviceRuntime::AndroidTv),
        _ => Err(TestRunError::UnknownRuntime { text: word }),
    }
}

pub(crate) fn android_device_types(
    text: Option<&str>,
    runtime: VirtualDeviceRuntime,
) -> Result<Vec<DeviceType>, TestRunError> {
    let fallback = || match runtime {
        VirtualDeviceRuntime::Android => vec![DeviceType::Phone, DeviceType::Tablet],
        VirtualDeviceRuntime::AndroidWear => vec![DeviceType::Wearable],
        VirtualDeviceRuntime::AndroidTv => vec![DeviceType::Tv],
    };

    let Some(word) = normalized(text) else {
        return Ok(fallback());
    };
    match word.as_str() {
        "phone" => Ok(vec![DeviceType::Phone]),
        "tab" | "tablet" => Ok(vec![DeviceType::Tablet]),
        "tv" => Ok(vec![DeviceType::Tv]),
        "watch" | "wear" | "wearable" => Ok(vec![DeviceType::Wearable]),
        _ => Err(TestRunError::UnknownDeviceType { text: word }),
    }
}

/// Parses the requested Android API level; absent means "any" (level 0).
pub(crate) fn parse_api_level(text: Option<&str>) -> Result<u32, TestRunError> {
    let Some(word) = normalized(text) else {
        return Ok(0);
    };
    word.parse()
        .map_err(|_| TestRunError::InvalidVersion { text: word })
}

pub(crate) fn parse_simulator_runtime(
    text: Option<&str>,
) -> Result<SimulatorRuntime, TestRunError> {
    let Some(word) = normalized(text) else {
        return Ok(SimulatorRuntime::Ios);
    };
    match word.as_str() {
        "ios" => Ok(SimulatorRuntime::Ios),
        "watchos" => Ok(SimulatorRuntime::WatchOs),
        "tvos" => Ok(SimulatorRuntime::TvOs),
        _ => Err(TestRunError::UnknownRuntime { text: word }),
    }
}

pub(crate) fn parse_simulator_type(
    text: Option<&str>,
) -> Result<SimulatorDeviceType, TestRunError> {
    let Some(word) = normalized(text) else {
        return Ok(SimulatorDeviceType::IPhone);
    };
    match word.as_str() {
        "iphone" | "phone" => Ok(SimulatorDeviceType::IPhone),
        "ipad" | "tablet" => Ok(SimulatorDeviceType::IPad),
        "ipod" => Ok(SimulatorDeviceType::IPod),
        "tv" | "appletv" => Ok(SimulatorDeviceType::AppleTv),
        "watch" | "applewatch" => Ok(SimulatorDeviceType::AppleWatch),
        _ => Err(TestRunError::UnknownDeviceType { text: word }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn android_runtime_words() {
        assert_eq!(
            parse_android_runtime(None).unwrap(),
            VirtualDeviceRuntime::Android
        );
        assert_eq!(
            parse_android_runtime(Some(" Wear ")).unwrap(),
            VirtualDeviceRuntime::AndroidWear
        );
        assert_eq!(
            parse_android_runtime(Some("tv")).unwrap(),
            VirtualDeviceRuntime::AndroidTv
        );
        assert!(parse_android_runtime(Some("windows")).is_err());
    }

    #[test]
    fn android_device_type_falls_back_to_the_runtime() {
        assert_eq!(
            android_device_types(None, VirtualDeviceRuntime::Android).unwrap(),
            vec![DeviceType::Phone, DeviceType::Tablet]
        );
        assert_eq!(
            android_device_types(None, VirtualDeviceRuntime::AndroidWear).unwrap(),
            vec![DeviceType::Wearable]
        );
        assert_eq!(
            android_device_types(Some("tablet"), VirtualDeviceRuntime::Android).unwrap(),
            vec![DeviceType::Tablet]
        );
        assert!(android_device_types(Some("fridge"), VirtualDeviceRuntime::Android).is_err());
    }

    #[test]
    fn api_level_parses_or_defaults_to_zero() {
        assert_eq!(parse_api_level(None).unwrap(), 0);
        assert_eq!(parse_api_level(Some("29")).unwrap(), 29);
        assert!(parse_api_level(Some("10.0")).is_err());
    }

    #[test]
    fn simulator_words() {
        assert_eq!(
            parse_simulator_runtime(None).unwrap(),
            SimulatorRuntime::Ios
        );
        assert_eq!(
            parse_simulator_runtime(Some("tvOS")).unwrap(),
            SimulatorRuntime::TvOs
        );
        assert_eq!(
            parse_simulator_type(Some("tablet")).unwrap(),
            SimulatorDeviceType::IPad
        );
        assert_eq!(
            parse_simulator_type(None).unwrap(),
            SimulatorDeviceType::IPhone
        );
        assert!(parse_simulator_type(Some("fridge")).is_err());
    }
}
