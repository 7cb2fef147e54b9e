//! Integration tests for the manifest-dump parser against a realistic
//! `aapt dump xmltree` capture.

use devicekit_core::android::manifest::{
    parse_xml_tree, AndroidManifest, ManifestError, ANDROID_NAMESPACE, XMLNS_NAMESPACE,
};

const MANIFEST_DUMP: &str = r#"N: android=http://schemas.android.com/apk/res/android
  E: manifest (line=2)
    A: android:versionCode(0x0101021b)=(type 0x10)0x1
    A: android:versionName(0x0101021c)="1.0.1.0" (Raw: "1.0.1.0")
    A: android:compileSdkVersion(0x01010572)=(type 0x10)0x1d
    A: android:compileSdkVersionCodename(0x01010573)="10" (Raw: "10")
    A: package="net.dot.devicetests" (Raw: "net.dot.devicetests")
    A: platformBuildVersionCode=(type 0x10)0x1d
    A: platformBuildVersionName=(type 0x10)0xa
    E: uses-sdk (line=7)
      A: android:minSdkVersion(0x0101020c)=(type 0x10)0x13
      A: android:targetSdkVersion(0x01010270)=(type 0x10)0x1d
    E: uses-permission (line=11)
      A: android:name(0x01010003)="android.permission.INTERNET" (Raw: "android.permission.INTERNET")
    E: uses-permission (line=12)
      A: android:name(0x01010003)="android.permission.ACCESS_NETWORK_STATE" (Raw: "android.permission.ACCESS_NETWORK_STATE")
    E: application (line=14)
      A: android:label(0x01010001)=@0x7f0c001b
      A: android:name(0x01010003)="android.app.Application" (Raw: "android.app.Application")
      A: android:debuggable(0x0101000f)=(type 0x12)0xffffffff
      E: activity (line=18)
        A: android:name(0x01010003)="crc64.SettingsActivity" (Raw: "crc64.SettingsActivity")
        E: intent-filter (line=19)
          E: action (line=20)
            A: android:name(0x01010003)="android.intent.action.VIEW" (Raw: "android.intent.action.VIEW")
          E: category (line=21)
            A: android:name(0x01010003)="android.intent.category.DEFAULT" (Raw: "android.intent.category.DEFAULT")
      E: activity (line=24)
        A: android:theme(0x01010000)=@0x7f0d0006
        A: android:name(0x01010003)="crc640ec207abc449b2ca.MainActivity" (Raw: "crc640ec207abc449b2ca.MainActivity")
        A: android:launchMode(0x0101001d)=(type 0x10)0x2
        E: intent-filter (line=28)
          E: action (line=29)
            A: android:name(0x01010003)="android.intent.action.MAIN" (Raw: "android.intent.action.MAIN")
          E: category (line=31)
            A: android:name(0x01010003)="android.intent.category.LAUNCHER" (Raw: "android.intent.category.LAUNCHER")
      E: provider (line=34)
        A: android:name(0x01010003)="mono.MonoRuntimeProvider" (Raw: "mono.MonoRuntimeProvider")
"#;

#[test]
fn parses_the_full_dump() {
    let doc = parse_xml_tree(MANIFEST_DUMP).unwrap();
    let root = doc.root().unwrap();

    assert_eq!(root.name, "manifest");
    assert_eq!(
        root.attribute_ns(XMLNS_NAMESPACE, "android"),
        Some(ANDROID_NAMESPACE)
    );
    assert_eq!(root.attribute("package"), Some("net.dot.devicetests"));
    assert_eq!(
        root.attribute("platformBuildVersionCode"),
        Some("(type 0x10)0x1d")
    );
    assert_eq!(
        root.attribute_ns(ANDROID_NAMESPACE, "versionName"),
        Some("1.0.1.0")
    );
    assert_eq!(
        root.attribute_ns(ANDROID_NAMESPACE, "versionCode"),
        Some("(type 0x10)0x1")
    );
}

#[test]
fn nested_elements_land_under_their_parents() {
    let doc = parse_xml_tree(MANIFEST_DUMP).unwrap();
    let root = doc.root().unwrap();

    let uses_sdk = root.child("uses-sdk").unwrap();
    assert_eq!(
        uses_sdk.attribute_ns(ANDROID_NAMESPACE, "minSdkVersion"),
        Some("(type 0x10)0x13")
    );

    let permissions: Vec<_> = root.children_named("uses-permission").collect();
    assert_eq!(permissions.len(), 2);
    assert_eq!(
        permissions[0].attribute_ns(ANDROID_NAMESPACE, "name"),
        Some("android.permission.INTERNET")
    );

    let application = root.child("application").unwrap();
    assert_eq!(application.children_named("activity").count(), 2);
    assert_eq!(application.children_named("provider").count(), 1);
}

#[test]
fn launcher_activity_skips_non_launcher_filters() {
    let manifest = AndroidManifest::new(parse_xml_tree(MANIFEST_DUMP).unwrap());

    assert_eq!(manifest.package_name(), Some("net.dot.devicetests"));
    // The first activity has a VIEW/DEFAULT filter and must not match.
    assert_eq!(
        manifest.main_launcher_activity(),
        Some("crc640ec207abc449b2ca.MainActivity")
    );
}

#[test]
fn missing_launcher_yields_none() {
    let dump = r#"  E: manifest (line=2)
    A: package="com.example" (Raw: "com.example")
    E: application (line=3)
      E: activity (line=4)
"#;
    let manifest = AndroidManifest::new(parse_xml_tree(dump).unwrap());
    assert_eq!(manifest.package_name(), Some("com.example"));
    assert_eq!(manifest.main_launcher_activity(), None);
}

#[test]
fn parse_is_deterministic_over_the_full_dump() {
    assert_eq!(
        parse_xml_tree(MANIFEST_DUMP).unwrap(),
        parse_xml_tree(MANIFEST_DUMP).unwrap()
    );
}

#[test]
fn prefixes_resolve_regardless_of_declaration_distance() {
    let dump = r#"N: tools=http://schemas.android.com/tools
N: android=http://schemas.android.com/apk/res/android
  E: manifest (line=2)
    E: application (line=3)
      A: tools:replace="android:label" (Raw: "android:label")
      A: android:label=@0x7f0c001b
"#;
    let doc = parse_xml_tree(dump).unwrap();
    let application = doc.root().unwrap().child("application").unwrap();
    assert_eq!(
        application.attribute_ns("http://schemas.android.com/tools", "replace"),
        Some("android:label")
    );
    assert_eq!(
        application.attribute_ns(ANDROID_NAMESPACE, "label"),
        Some("@0x7f0c001b")
    );
}

#[test]
fn undeclared_prefix_names_the_offending_line() {
    let dump = "  E: tools:manifest (line=2)\n";
    let err = parse_xml_tree(dump).unwrap_err();
    let ManifestError::UnknownNamespace { prefix, line } = err else {
        panic!("expected UnknownNamespace, got {err:?}");
    };
    assert_eq!(prefix, "tools");
    assert!(line.contains("tools:manifest"));
}
