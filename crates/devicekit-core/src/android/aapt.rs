//! Interface to the `aapt` build tool.
//!
//! Only one capability is needed here: dumping the compiled
//! `AndroidManifest.xml` out of an APK so the test workflow can learn the
//! package name and launcher activity.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::android::manifest::{parse_xml_tree, AndroidManifest};
use crate::android::{sdk, AndroidError};
use crate::process::ProcessRunner;

/// Wrapper around the `aapt` tool from the newest installed build-tools.
pub struct Aapt {
    runner: ProcessRunner,
    aapt: PathBuf,
}

impl Aapt {
    /// Locates `aapt` under the SDK root (explicit hint, environment, or
    /// well-known locations).
    pub fn new(sdk_root: Option<&Path>) -> Result<Self, AndroidError> {
        let root = sdk::find_sdk_root(sdk_root)?;
        let aapt = sdk::find_build_tool(&root, "aapt")
            .ok_or(AndroidError::ToolNotFound { tool: "aapt" })?;
        Ok(Self {
            runner: ProcessRunner::new(),
            aapt,
        })
    }

    /// Dumps and parses the manifest of the given APK.
    pub async fn android_manifest(
        &self,
        apk: &Path,
        cancel: &CancellationToken,
    ) -> Result<AndroidManifest, AndroidError> {
        info!(apk = %apk.display(), "loading AndroidManifest.xml");

        let apk = apk.display().to_string();
        let result = self
            .runner
            .run(
                &self.aapt,
                &["dump", "xmltree", &apk, "AndroidManifest.xml"],
                cancel,
            )
            .await?;

        Ok(AndroidManifest::new(parse_xml_tree(
            &result.combined_output(),
        )?))
    }
}
