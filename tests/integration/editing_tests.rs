//! Editing integration tests
//!
//! These tests run the document editors against a realistic Flutter project
//! and check that edits are idempotent and fully reversible.

use manifestpatch::android::services::{add_service as add_android, remove_service as remove_android, AndroidDocuments};
use manifestpatch::android::{declared_android_permissions, update_manifest};
use manifestpatch::applinks::{self, LinkTargets};
use manifestpatch::catalog::Catalog;
use manifestpatch::ios::services::{add_service as add_ios, remove_service as remove_ios, url_schemes, IosDocuments};
use manifestpatch::ios::{patch_podfile, required_macros, update_plist};
use manifestpatch::model::{PermissionEntry, ServiceEntry};
use std::fs;
use std::path::PathBuf;

/// Get the path to the test fixtures directory
fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture(relative: &str) -> String {
    let path = fixtures_path().join("flutter_app").join(relative);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read {:?}: {}", path, e))
}

fn manifest() -> String {
    fixture("android/app/src/main/AndroidManifest.xml")
}

fn android_docs() -> AndroidDocuments {
    AndroidDocuments {
        manifest: manifest(),
        strings: Some(fixture("android/app/src/main/res/values/strings.xml")),
    }
}

fn ios_docs() -> IosDocuments {
    IosDocuments {
        plist: fixture("ios/Runner/Info.plist"),
        entitlements: None,
        app_delegate: Some(fixture("ios/Runner/AppDelegate.swift")),
    }
}

fn facebook() -> ServiceEntry {
    ServiceEntry::new("facebook")
        .with_value("appId", "123")
        .with_value("clientToken", "tok")
}

// ============================================================================
// Permissions
// ============================================================================

#[test]
fn test_manifest_permissions_replaced_and_queries_kept() {
    let original = manifest();
    let updated = update_manifest(&original, &["CAMERA", "android.permission.RECORD_AUDIO"], "    ");

    assert_eq!(
        declared_android_permissions(&updated),
        vec!["android.permission.CAMERA", "android.permission.RECORD_AUDIO"]
    );
    assert!(updated.contains("android.intent.action.PROCESS_TEXT"));
    assert!(updated.contains("<!-- Theme applied once the Flutter UI has initialized -->"));
    assert_eq!(update_manifest(&updated, &["CAMERA", "RECORD_AUDIO"], "    "), updated);
}

#[test]
fn test_manifest_unchanged_when_request_matches() {
    let original = manifest();
    assert_eq!(update_manifest(&original, &["INTERNET"], "    "), original);
}

#[test]
fn test_plist_permissions_keep_unrelated_keys() {
    let original = fixture("ios/Runner/Info.plist");
    let entries = vec![
        PermissionEntry::text("NSCameraUsageDescription", "Scan documents"),
        PermissionEntry::text("NSMicrophoneUsageDescription", "Record & share"),
    ];
    let updated = update_plist(&original, &entries);

    assert!(updated.contains("\t<key>NSCameraUsageDescription</key>\n\t<string>Scan documents</string>"));
    assert!(updated.contains("<string>Record &amp; share</string>"));
    assert!(updated.contains("<string>UIInterfaceOrientationLandscapeLeft</string>"));
    assert!(updated.contains("<key>UIApplicationSupportsIndirectInputEvents</key>\n\t<true/>"));
    assert_eq!(update_plist(&updated, &entries), updated);
}

#[test]
fn test_podfile_macros_inside_flutter_hook() {
    let catalog = Catalog::builtin().unwrap();
    let original = fixture("ios/Podfile");
    let entries = vec![PermissionEntry::text("NSCameraUsageDescription", "Scan")];
    let macros = required_macros(&entries, &catalog.permissions);

    let patched = patch_podfile(&original, &macros).unwrap();
    assert!(patched.contains("flutter_additional_ios_build_settings(target)"));
    assert!(patched.contains("target.build_configurations.each do |config|"));
    assert!(patched.contains("'$(inherited)',"));
    assert!(patched.contains("'PERMISSION_CAMERA=1',"));
    assert_eq!(patched.matches("post_install do |installer|").count(), 1);
    assert_eq!(patch_podfile(&patched, &macros).unwrap(), patched);
}

// ============================================================================
// Services
// ============================================================================

#[test]
fn test_facebook_android_round_trip() {
    let catalog = Catalog::builtin().unwrap();
    let config = catalog.service("facebook").unwrap();
    let original = android_docs();

    let added = add_android(&original, config, &facebook(), "    ");
    assert!(added
        .manifest
        .contains("android:name=\"com.facebook.sdk.ApplicationId\" android:value=\"@string/facebook_app_id\""));
    assert!(added.manifest.contains("com.facebook.katana.provider.PlatformProvider"));
    assert!(added.manifest.contains("<data android:scheme=\"fb123\" />"));
    assert!(added
        .strings
        .as_deref()
        .unwrap()
        .contains("<string name=\"facebook_app_id\">123</string>"));

    assert_eq!(add_android(&added, config, &facebook(), "    "), added);

    let removed = remove_android(&added, config, Some(&facebook()));
    assert_eq!(removed, original);
}

#[test]
fn test_facebook_ios_round_trip() {
    let catalog = Catalog::builtin().unwrap();
    let config = catalog.service("facebook").unwrap();
    let original = ios_docs();

    let added = add_ios(&original, config, &facebook());
    assert_eq!(url_schemes(&added.plist), vec!["fb123"]);
    assert!(added.plist.contains("<string>fbapi</string>"));
    let delegate = added.app_delegate.as_deref().unwrap();
    assert!(delegate.contains("import FBSDKCoreKit"));
    assert!(delegate.contains(
        "    GeneratedPluginRegistrant.register(with: self)\n    ApplicationDelegate.shared.application(application, didFinishLaunchingWithOptions: launchOptions)"
    ));

    assert_eq!(add_ios(&added, config, &facebook()), added);

    let removed = remove_ios(&added, config, Some(&facebook()));
    assert_eq!(removed, original);
}

#[test]
fn test_removing_one_service_keeps_another() {
    let catalog = Catalog::builtin().unwrap();
    let facebook_config = catalog.service("facebook").unwrap();
    let maps_config = catalog.service("googleMaps").unwrap();
    let maps = ServiceEntry::new("googleMaps").with_value("apiKey", "KEY");

    let with_maps = add_ios(&ios_docs(), maps_config, &maps);
    let with_both = add_ios(&with_maps, facebook_config, &facebook());
    let removed = remove_ios(&with_both, facebook_config, Some(&facebook()));

    assert_eq!(removed, with_maps);
    assert!(removed
        .app_delegate
        .as_deref()
        .unwrap()
        .contains("GMSServices.provideAPIKey(\"KEY\")"));
}

#[test]
fn test_app_links_in_flutter_main_activity() {
    let original = manifest();
    let targets = LinkTargets::parse("https://example.com/path, demo://");

    let updated = applinks::android::apply_app_links(&original, &targets, "    ");
    let block = updated.find("<!-- applinks:start -->").unwrap();
    let main_close = updated.find("</activity>").unwrap();
    assert!(block < main_close);
    assert!(updated.contains("<data android:scheme=\"https\" android:host=\"example.com\" />"));
    assert!(updated.contains("<data android:scheme=\"demo\" />"));

    assert_eq!(applinks::android::apply_app_links(&updated, &targets, "    "), updated);
    assert_eq!(applinks::android::remove_app_links(&updated), original);
}
