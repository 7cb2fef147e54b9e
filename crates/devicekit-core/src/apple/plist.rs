//! Reading property-list files.
//!
//! The `plist` crate handles both XML and binary plists directly. For
//! anything it cannot read, the file is converted through
//! `plutil -convert xml1` and parsed from the converted output.

use std::io::Cursor;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::apple::SimctlError;
use crate::process::ProcessRunner;

/// A parsed property list.
#[derive(Debug, Clone)]
pub struct PListFile {
    value: plist::Value,
}

impl PListFile {
    /// Loads and parses a plist file, converting via `plutil` on a parse
    /// failure.
    pub async fn load(path: &Path, cancel: &CancellationToken) -> Result<Self, SimctlError> {
        debug!(path = %path.display(), "loading plist");

        match plist::Value::from_file(path) {
            Ok(value) => Ok(Self { value }),
            Err(original) => {
                trace!(error = %original, "unable to read plist directly, converting with plutil");

                let runner = ProcessRunner::new();
                let path = path.display().to_string();
                let result = runner
                    .run(
                        Path::new("plutil"),
                        &["-convert", "xml1", "-o", "-", &path],
                        cancel,
                    )
                    .await?;

                let value = plist::Value::from_reader_xml(Cursor::new(result.stdout()))?;
                Ok(Self { value })
            }
        }
    }

    /// Builds a plist from already-parsed data.
    pub fn from_value(value: plist::Value) -> Self {
        Self { value }
    }

    /// The string value stored under a top-level key.
    pub fn string_value(&self, key: &str) -> Option<&str> {
        self.value.as_dictionary()?.get(key)?.as_string()
    }

    /// The `CFBundleIdentifier` value.
    pub fn bundle_identifier(&self) -> Option<&str> {
        self.string_value("CFBundleIdentifier")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleIdentifier</key>
    <string>net.dot.devicetests</string>
    <key>CFBundleName</key>
    <string>DeviceTests</string>
</dict>
</plist>
"#;

    fn parsed() -> PListFile {
        let value = plist::Value::from_reader_xml(Cursor::new(INFO_PLIST)).unwrap();
        PListFile::from_value(value)
    }

    #[test]
    fn reads_string_values() {
        let plist = parsed();
        assert_eq!(plist.string_value("CFBundleName"), Some("DeviceTests"));
        assert_eq!(plist.string_value("Missing"), None);
    }

    #[test]
    fn reads_the_bundle_identifier() {
        assert_eq!(parsed().bundle_identifier(), Some("net.dot.devicetests"));
    }

    #[tokio::test]
    async fn load_parses_xml_plists_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Info.plist");
        std::fs::write(&path, INFO_PLIST).unwrap();

        let plist = PListFile::load(&path, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(plist.bundle_identifier(), Some("net.dot.devicetests"));
    }
}
