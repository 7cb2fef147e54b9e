//! # devicekit-core
//!
//! Core library for Android emulator and Apple simulator automation.
//!
//! This crate manages the lifecycle of mobile virtual devices and automates
//! installing and running a test app on a selected device, by driving the
//! platform SDK command-line tools and parsing their output.
//!
//! ## Modules
//!
//! - [`process`] - Async external-process engine: output capture, observers,
//!   cancellation, exit-code normalization
//! - [`android`] - `avdmanager`/`emulator`/`adb`/`aapt` wrappers, AVD config
//!   parsing and the manifest-dump parser
//! - [`apple`] - `xcrun simctl` wrapper and property-list reading
//! - [`testing`] - The orchestrated test-run workflow and the streaming
//!   test-marker parser
//! - [`version`] - Dotted version numbers used across both platforms
//!
//! ## External Dependencies
//!
//! The Android side needs an Android SDK (located via `ANDROID_HOME` /
//! `ANDROID_SDK_ROOT` or an explicit root); the Apple side needs Xcode for
//! `xcrun simctl`.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use devicekit_core::testing::{AndroidTestRunner, TestRunOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runner = AndroidTestRunner::new(None).expect("android sdk");
//!     let options = TestRunOptions {
//!         device_results: Some("TestResults.trx".into()),
//!         shutdown: true,
//!         ..Default::default()
//!     };
//!     let summary = runner
//!         .run(Path::new("DeviceTests.apk"), &options, &CancellationToken::new())
//!         .await
//!         .expect("test run");
//!     println!("{} passed, {} failed", summary.passed.len(), summary.failed.len());
//! }
//! ```

pub mod android;
pub mod apple;
pub mod process;
pub mod testing;
pub mod version;
