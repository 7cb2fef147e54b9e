//! Android virtual device lifecycle management.
//!
//! Wrappers around the Android SDK command-line tools:
//!
//! - [`avd::AvdManager`] - `avdmanager`, for creating/deleting/listing AVDs
//! - [`emulator::EmulatorManager`] - `emulator`, for booting AVDs
//! - [`adb::Adb`] - `adb`, for talking to running devices
//! - [`aapt::Aapt`] - `aapt`, for reading compiled application manifests
//!
//! Device state lives in the SDK's registry and in the emulator process, both
//! of which other tools mutate freely; every listing here re-queries that
//! external state instead of caching it.

pub mod aapt;
pub mod adb;
pub mod avd;
pub mod config;
pub mod device;
pub mod emulator;
pub mod manifest;
pub mod sdk;

use std::path::PathBuf;

use thiserror::Error;

use crate::process::ProcessError;

/// Errors from the Android tool wrappers.
#[derive(Error, Debug)]
pub enum AndroidError {
    /// An SDK root was given explicitly but does not exist.
    #[error("android sdk directory '{}' is invalid", path.display())]
    InvalidSdkRoot { path: PathBuf },

    /// No SDK root could be resolved from the hint, the environment, or the
    /// well-known install locations.
    #[error("unable to locate the android sdk; set ANDROID_HOME or ANDROID_SDK_ROOT")]
    SdkRootNotFound,

    /// The SDK was found but the named tool was not inside it.
    #[error("unable to locate {tool}; set ANDROID_HOME or ANDROID_SDK_ROOT")]
    ToolNotFound { tool: &'static str },

    /// The requested serial is not in the freshly queried device list.
    #[error("unable to find device '{serial}'")]
    DeviceNotFound { serial: String },

    /// The requested AVD is not in the freshly queried AVD list.
    #[error("unable to find virtual device '{id}'")]
    AvdNotFound { id: String },

    /// The app to install does not exist on disk.
    #[error("unable to find the app '{}'", path.display())]
    MissingApp { path: PathBuf },

    /// A pull destination exists and overwriting was not requested.
    #[error("file '{}' already exists", path.display())]
    DestinationExists { path: PathBuf },

    /// A config.ini was read but no virtual device id could be derived.
    #[error("invalid config.ini at '{}': unable to determine the virtual device id", path.display())]
    MissingDeviceId { path: PathBuf },

    /// A tool produced output this crate does not know how to interpret.
    #[error("{0}")]
    UnexpectedOutput(String),

    /// A convergence loop was canceled by the caller.
    #[error("operation canceled")]
    Interrupted,

    #[error(transparent)]
    Manifest(#[from] manifest::ManifestError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
