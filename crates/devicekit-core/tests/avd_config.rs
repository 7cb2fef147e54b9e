//! End-to-end tests for config.ini parsing into virtual device records.

use devicekit_core::android::config::VirtualDeviceConfig;
use devicekit_core::android::device::{DeviceType, VirtualDeviceRuntime};
use devicekit_core::version::Version;

const PIXEL_2_CONFIG: &str = "\
AvdId=Pixel_2
PlayStore.enabled=false
avd.ini.displayname=Pixel 2
abi.type=x86
hw.cpu.arch=x86
hw.device.manufacturer=Google
hw.device.name=pixel_2
image.sysdir.1=system-images/android-29/google_apis/x86/
tag.display=Google APIs
tag.id=google_apis
";

#[test]
fn pixel_2_config_builds_the_expected_device() {
    let config = VirtualDeviceConfig::from_contents("/avds/Pixel_2.avd", PIXEL_2_CONFIG);
    let device = config.to_virtual_device().unwrap();

    assert_eq!(device.id, "Pixel_2");
    assert_eq!(device.name, "Pixel 2");
    assert_eq!(device.api_level, 29);
    assert_eq!(device.device_type, DeviceType::Phone);
    assert_eq!(device.runtime(), VirtualDeviceRuntime::Android);
    assert_eq!(device.version(), Version::new(10, 0));
    assert_eq!(device.package, "system-images;android-29;google_apis;x86");
}

#[test]
fn tablet_dimensions_change_the_classification() {
    let contents = format!(
        "{PIXEL_2_CONFIG}hw.lcd.width=1920\nhw.lcd.height=1200\nhw.lcd.density=240\n"
    );
    let config = VirtualDeviceConfig::from_contents("/avds/Tab.avd", &contents);
    let device = config.to_virtual_device().unwrap();
    assert_eq!(device.device_type, DeviceType::Tablet);
}

#[test]
fn wear_tag_drives_type_and_runtime() {
    let contents = "\
avdid=Wear_Round
image.sysdir.1=system-images/android-28/android-wear/x86/
tag.id=android-wear
";
    let config = VirtualDeviceConfig::from_contents("/avds/Wear_Round.avd", contents);
    let device = config.to_virtual_device().unwrap();

    assert_eq!(device.device_type, DeviceType::Wearable);
    assert_eq!(device.runtime(), VirtualDeviceRuntime::AndroidWear);
    assert_eq!(device.api_level, 28);
    assert_eq!(device.version(), Version::new(9, 0));
}

#[test]
fn malformed_image_path_leaves_the_api_level_unknown() {
    let contents = "\
avdid=Odd
image.sysdir.1=platforms/android-29/
tag.id=google_apis
";
    let config = VirtualDeviceConfig::from_contents("/avds/Odd.avd", contents);
    let device = config.to_virtual_device().unwrap();

    assert_eq!(device.api_level, 0);
    assert_eq!(device.version(), Version::ZERO);
}

#[tokio::test]
async fn load_reads_the_config_from_the_avd_directory() {
    let dir = tempfile::tempdir().unwrap();
    let avd_dir = dir.path().join("Pixel_2.avd");
    std::fs::create_dir_all(&avd_dir).unwrap();
    std::fs::write(avd_dir.join("config.ini"), PIXEL_2_CONFIG).unwrap();

    let config = VirtualDeviceConfig::load(&avd_dir).await.unwrap();
    let device = config.to_virtual_device().unwrap();
    assert_eq!(device.id, "Pixel_2");
    assert_eq!(device.path, avd_dir);
}

#[tokio::test]
async fn load_fails_for_a_missing_config() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("Nope.avd");
    assert!(VirtualDeviceConfig::load(&missing).await.is_err());
}
