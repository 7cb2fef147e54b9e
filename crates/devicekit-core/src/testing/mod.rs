//! Orchestrated test runs.
//!
//! Composes the lifecycle managers with the streaming results parser: select
//! a device, boot it, install the app, stream its log output until the test
//! summary appears, pull the results file, then clean up. Uninstall and
//! shutdown are always attempted, and their own failures never replace an
//! earlier error.

pub mod android;
pub mod apple;
pub mod options;
pub mod results;

pub use android::AndroidTestRunner;
pub use apple::AppleTestRunner;
pub use options::TestRunOptions;
pub use results::{TestEvent, TestEventKind, TestResultsParser, TestRunSummary};

use thiserror::Error;

use crate::android::AndroidError;
use crate::apple::SimctlError;

/// Errors from the orchestrated test-run workflow.
#[derive(Error, Debug)]
pub enum TestRunError {
    #[error("unable to determine the package name for the app")]
    MissingPackageName,

    #[error("unable to determine the main launcher activity for the app")]
    MissingLauncherActivity,

    #[error("unable to determine the bundle identifier for the app")]
    MissingBundleIdentifier,

    #[error("unable to determine the runtime for '{text}'")]
    UnknownRuntime { text: String },

    #[error("unable to determine the device type for '{text}'")]
    UnknownDeviceType { text: String },

    #[error("unable to determine the version for '{text}'")]
    InvalidVersion { text: String },

    /// No device or simulator survived the type/runtime/version filters.
    #[error("unable to find any devices that match {pattern}")]
    NoMatchingDevice { pattern: String },

    /// The tool reported a running instance but adb cannot see it.
    #[error("virtual device '{name}' is already booted but could not be found")]
    BootedDeviceNotFound { name: String },

    #[error(transparent)]
    Android(#[from] AndroidError),

    #[error(transparent)]
    Apple(#[from] SimctlError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
