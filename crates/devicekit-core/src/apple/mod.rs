//! Apple simulator lifecycle management.
//!
//! Wrappers around `xcrun simctl` for listing, booting and shutting down
//! simulators and managing apps on them, plus a property-list reader for
//! resolving app bundle identifiers.
//!
//! Requires Xcode; everything here shells out to `/usr/bin/xcrun`.

pub mod plist;
pub mod simctl;
pub mod simulator;

use thiserror::Error;

use crate::process::ProcessError;

/// Errors from the Apple tool wrappers.
#[derive(Error, Debug)]
pub enum SimctlError {
    /// The requested udid is not in the freshly queried simulator list.
    #[error("unable to find simulator '{udid}'")]
    SimulatorNotFound { udid: String },

    /// The simulator exists but reports no data directory.
    #[error("unable to find the data path for simulator '{udid}'")]
    MissingDataPath { udid: String },

    /// No installed app with the bundle identifier was found.
    #[error("unable to find app '{bundle_id}' on simulator '{udid}'")]
    AppNotFound { bundle_id: String, udid: String },

    /// The app bundle to install does not exist on disk.
    #[error("unable to find the app '{}'", path.display())]
    MissingApp { path: std::path::PathBuf },

    /// A tool emitted a version string that does not parse.
    #[error("unable to parse version from '{text}'")]
    InvalidVersion { text: String },

    /// A convergence loop was canceled by the caller.
    #[error("operation canceled")]
    Interrupted,

    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plist parse error: {0}")]
    Plist(#[from] ::plist::Error),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
