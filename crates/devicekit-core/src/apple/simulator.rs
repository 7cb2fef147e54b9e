//! Apple simulator records.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::version::Version;

/// The OS family a simulator runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimulatorRuntime {
    Ios,
    WatchOs,
    TvOs,
}

impl fmt::Display for SimulatorRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulatorRuntime::Ios => "iOS",
            SimulatorRuntime::WatchOs => "watchOS",
            SimulatorRuntime::TvOs => "tvOS",
        };
        f.write_str(name)
    }
}

/// Lifecycle state reported by `simctl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimulatorState {
    Booted,
    Shutdown,
    Unknown,
}

impl fmt::Display for SimulatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulatorState::Booted => "Booted",
            SimulatorState::Shutdown => "Shutdown",
            SimulatorState::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Whether the simulator's runtime is usable on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimulatorAvailability {
    Available,
    Unavailable,
}

impl fmt::Display for SimulatorAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulatorAvailability::Available => "available",
            SimulatorAvailability::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// The hardware class, derived from the simulator's display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimulatorDeviceType {
    IPhone,
    IPad,
    IPod,
    AppleWatch,
    AppleTv,
    Unknown,
}

impl fmt::Display for SimulatorDeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimulatorDeviceType::IPhone => "iPhone",
            SimulatorDeviceType::IPad => "iPad",
            SimulatorDeviceType::IPod => "iPod",
            SimulatorDeviceType::AppleWatch => "Apple Watch",
            SimulatorDeviceType::AppleTv => "Apple TV",
            SimulatorDeviceType::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// One simulator instance as reported by `simctl list devices`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Simulator {
    pub udid: String,
    pub name: String,
    pub runtime: SimulatorRuntime,
    pub version: Version,
    pub state: SimulatorState,
    pub availability: SimulatorAvailability,
    pub data_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
}

impl Simulator {
    /// The hardware class, looked up from the name prefix.
    pub fn device_type(&self) -> SimulatorDeviceType {
        device_type_for_name(&self.name)
    }

    pub fn is_available(&self) -> bool {
        self.availability == SimulatorAvailability::Available
    }
}

impl fmt::Display for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) [{}]",
            self.name, self.version, self.availability
        )
    }
}

/// Derives the hardware class from a simulator display name.
pub fn device_type_for_name(name: &str) -> SimulatorDeviceType {
    let lowered = name.to_lowercase();
    if lowered.starts_with("iphone") {
        SimulatorDeviceType::IPhone
    } else if lowered.starts_with("ipad") {
        SimulatorDeviceType::IPad
    } else if lowered.starts_with("ipod") {
        SimulatorDeviceType::IPod
    } else if lowered.starts_with("apple watch") {
        SimulatorDeviceType::AppleWatch
    } else if lowered.starts_with("apple tv") {
        SimulatorDeviceType::AppleTv
    } else {
        SimulatorDeviceType::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_type_follows_name_prefix() {
        assert_eq!(device_type_for_name("iPhone 15 Pro"), SimulatorDeviceType::IPhone);
        assert_eq!(device_type_for_name("iPad Air (5th generation)"), SimulatorDeviceType::IPad);
        assert_eq!(device_type_for_name("iPod touch (7th generation)"), SimulatorDeviceType::IPod);
        assert_eq!(
            device_type_for_name("Apple Watch Series 9 (45mm)"),
            SimulatorDeviceType::AppleWatch
        );
        assert_eq!(device_type_for_name("Apple TV 4K"), SimulatorDeviceType::AppleTv);
        assert_eq!(device_type_for_name("HomePod"), SimulatorDeviceType::Unknown);
    }

    #[test]
    fn device_type_is_case_insensitive() {
        assert_eq!(device_type_for_name("IPHONE 8"), SimulatorDeviceType::IPhone);
    }
}
