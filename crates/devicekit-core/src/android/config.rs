//! Parsing of AVD `config.ini` files.
//!
//! The file is a flat `key=value` list. Keys are matched case-insensitively
//! by lower-casing them at parse time, and the last occurrence of a duplicate
//! key wins. A [`VirtualDeviceConfig`] parses the file once at construction
//! into an immutable map and derives a [`VirtualDevice`] from it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::android::device::{DeviceType, VirtualDevice};
use crate::android::AndroidError;

static SYSTEM_IMAGE_API_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"android-(\d+)").expect("valid regex"));

/// The density bucket that maps one hardware pixel to one density-independent
/// pixel, and the dp threshold above which a screen counts as a tablet.
const BASELINE_DENSITY: f64 = 160.0;
const TABLET_MIN_DP: f64 = 600.0;

/// Parses `key=value` config text into a map.
///
/// Blank lines are skipped, keys are lower-cased, and for duplicate keys the
/// last occurrence wins. Lines that do not split into exactly one key and one
/// non-empty value are ignored.
pub fn parse_config(contents: &str) -> HashMap<String, String> {
    let mut properties = HashMap::new();
    for line in contents.split(['\r', '\n']) {
        if line.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split('=').filter(|part| !part.is_empty()).collect();
        if let [key, value] = parts[..] {
            properties.insert(key.to_lowercase(), value.to_string());
        }
    }
    properties
}

/// Classifies the hardware profile from config properties.
///
/// Explicit tag ids map directly to TV/Wearable. The generic tags fall back
/// to a size heuristic: a screen whose smaller side is at least 600dp is a
/// tablet. An unrecognized or missing tag is [`DeviceType::Unknown`].
pub fn classify_device_type(properties: &HashMap<String, String>) -> DeviceType {
    let Some(tag) = properties.get("tag.id") else {
        return DeviceType::Unknown;
    };

    match tag.trim().to_lowercase().as_str() {
        "android-tv" => DeviceType::Tv,
        "android-wear" => DeviceType::Wearable,
        "default" | "google_apis" | "google_apis_playstore" => match lcd_dimensions(properties) {
            Some((width, height, density))
                if f64::from(width.min(height)) / (density / BASELINE_DENSITY) >= TABLET_MIN_DP =>
            {
                DeviceType::Tablet
            }
            _ => DeviceType::Phone,
        },
        _ => DeviceType::Unknown,
    }
}

/// Reads `hw.lcd.width`/`hw.lcd.height`/`hw.lcd.density`. Width and height
/// are required; density falls back to the baseline when absent or
/// unparsable.
fn lcd_dimensions(properties: &HashMap<String, String>) -> Option<(u32, u32, f64)> {
    let width: u32 = properties.get("hw.lcd.width")?.trim().parse().ok()?;
    let height: u32 = properties.get("hw.lcd.height")?.trim().parse().ok()?;
    let density: f64 = properties
        .get("hw.lcd.density")
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(BASELINE_DENSITY);
    Some((width, height, density))
}

/// An AVD's `config.ini`, parsed once into an immutable property map.
#[derive(Debug, Clone)]
pub struct VirtualDeviceConfig {
    avd_path: PathBuf,
    properties: HashMap<String, String>,
}

impl VirtualDeviceConfig {
    /// Loads `<avd_path>/config.ini`.
    pub async fn load(avd_path: impl Into<PathBuf>) -> Result<Self, AndroidError> {
        let avd_path = avd_path.into();
        let config_path = avd_path.join("config.ini");
        debug!(path = %config_path.display(), "loading config.ini");
        let contents = tokio::fs::read_to_string(&config_path).await?;
        Ok(Self::from_contents(avd_path, &contents))
    }

    /// Builds a config from already-read file contents.
    pub fn from_contents(avd_path: impl Into<PathBuf>, contents: &str) -> Self {
        Self {
            avd_path: avd_path.into(),
            properties: parse_config(contents),
        }
    }

    /// Looks up a property by case-insensitive key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(&key.to_lowercase()).map(String::as_str)
    }

    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Derives the typed virtual device record from the parsed properties.
    pub fn to_virtual_device(&self) -> Result<VirtualDevice, AndroidError> {
        let id = self
            .get("avdid")
            .map(str::to_owned)
            .or_else(|| {
                self.avd_path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AndroidError::MissingDeviceId {
                path: self.avd_path.clone(),
            })?;

        let name = self
            .get("avd.ini.displayname")
            .map(str::to_owned)
            .unwrap_or_else(|| id.clone());

        let raw_package = self.get("image.sysdir.1").unwrap_or_default();
        let package_parts: Vec<&str> = raw_package
            .split(['\\', '/', ';'])
            .filter(|part| !part.is_empty())
            .collect();
        let package = package_parts.join(";");

        // The image path has the shape system-images/android-<N>/<tag>/<abi>;
        // anything else leaves the API level unknown.
        let api_level = if package_parts.len() == 4 {
            SYSTEM_IMAGE_API_RE
                .captures(package_parts[1])
                .and_then(|caps| caps[1].parse().ok())
                .unwrap_or(0)
        } else {
            0
        };

        Ok(VirtualDevice {
            id,
            name,
            package,
            device_type: classify_device_type(&self.properties),
            api_level,
            path: self.avd_path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn keys_are_lower_cased_and_last_duplicate_wins() {
        let parsed = parse_config("AvdId=first\r\navdid=second\nAVDID=third\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["avdid"], "third");
    }

    #[test]
    fn blank_and_malformed_lines_are_skipped() {
        let parsed = parse_config("\n\nkey=value\nnovalue=\njust-noise\na=b=c\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["key"], "value");
    }

    #[test]
    fn tv_tag_always_wins_over_dimensions() {
        let properties = props(&[
            ("tag.id", "android-tv"),
            ("hw.lcd.width", "320"),
            ("hw.lcd.height", "320"),
            ("hw.lcd.density", "160"),
        ]);
        assert_eq!(classify_device_type(&properties), DeviceType::Tv);
    }

    #[test]
    fn wear_tag_maps_to_wearable() {
        let properties = props(&[("tag.id", "android-wear")]);
        assert_eq!(classify_device_type(&properties), DeviceType::Wearable);
    }

    #[test]
    fn large_screen_is_a_tablet() {
        // 1200 / (240 / 160) = 800dp >= 600dp
        let properties = props(&[
            ("tag.id", "google_apis"),
            ("hw.lcd.width", "1920"),
            ("hw.lcd.height", "1200"),
            ("hw.lcd.density", "240"),
        ]);
        assert_eq!(classify_device_type(&properties), DeviceType::Tablet);
    }

    #[test]
    fn dense_screen_is_a_phone() {
        // 1080 / (420 / 160) = 411dp < 600dp
        let properties = props(&[
            ("tag.id", "default"),
            ("hw.lcd.width", "1080"),
            ("hw.lcd.height", "1920"),
            ("hw.lcd.density", "420"),
        ]);
        assert_eq!(classify_device_type(&properties), DeviceType::Phone);
    }

    #[test]
    fn missing_dimensions_default_to_phone() {
        let properties = props(&[("tag.id", "google_apis")]);
        assert_eq!(classify_device_type(&properties), DeviceType::Phone);
    }

    #[test]
    fn unparsable_density_falls_back_to_baseline() {
        // 800 / (garbage -> 160 / 160) = 800dp
        let properties = props(&[
            ("tag.id", "default"),
            ("hw.lcd.width", "800"),
            ("hw.lcd.height", "1280"),
            ("hw.lcd.density", "garbage"),
        ]);
        assert_eq!(classify_device_type(&properties), DeviceType::Tablet);
    }

    #[test]
    fn unrecognized_tag_is_unknown() {
        let properties = props(&[("tag.id", "chromeos")]);
        assert_eq!(classify_device_type(&properties), DeviceType::Unknown);
        assert_eq!(classify_device_type(&HashMap::new()), DeviceType::Unknown);
    }

    #[test]
    fn id_falls_back_to_the_directory_stem() {
        let config = VirtualDeviceConfig::from_contents(
            "/avds/pixel_2_q_10_0_-_api_29.avd",
            "hw.lcd.width=1080\n",
        );
        let device = config.to_virtual_device().unwrap();
        assert_eq!(device.id, "pixel_2_q_10_0_-_api_29");
        assert_eq!(device.name, "pixel_2_q_10_0_-_api_29");
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let config = VirtualDeviceConfig::from_contents("/avds/x.avd", "AvdId=Pixel_2\n");
        assert_eq!(config.get("AVDID"), Some("Pixel_2"));
        assert_eq!(config.get("avdid"), Some("Pixel_2"));
    }
}
