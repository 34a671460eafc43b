//! Identifiers recovered from files next to the primary documents:
//! `assetlinks.json`, `apple-app-site-association` and `project.pbxproj`.
//!
//! Parse failures are logged and ignored; a broken sidecar only means fewer
//! recovered values.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

static DEVELOPMENT_TEAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"DEVELOPMENT_TEAM\s*=\s*"?([A-Z0-9]+)"?\s*;"#).expect("Invalid development team regex")
});

static BUNDLE_IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"PRODUCT_BUNDLE_IDENTIFIER\s*=\s*"?([^";\s]+)"?\s*;"#).expect("Invalid bundle identifier regex")
});

/// Values found across the sidecar files. Fields stay `None` when no file
/// provides them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidecarValues {
    pub package_name: Option<String>,
    pub sha256: Option<String>,
    pub team_id: Option<String>,
    pub bundle_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssetLinkStatement {
    #[serde(default)]
    target: Option<AssetLinkTarget>,
}

#[derive(Debug, Deserialize)]
struct AssetLinkTarget {
    #[serde(default)]
    namespace: String,

    #[serde(default)]
    package_name: Option<String>,

    #[serde(default)]
    sha256_cert_fingerprints: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SiteAssociation {
    #[serde(default)]
    applinks: Option<AppLinksSection>,
}

#[derive(Debug, Deserialize)]
struct AppLinksSection {
    #[serde(default)]
    details: Vec<AppLinksDetail>,
}

#[derive(Debug, Deserialize)]
struct AppLinksDetail {
    #[serde(rename = "appID", default)]
    app_id: Option<String>,

    #[serde(rename = "appIDs", default)]
    app_ids: Vec<String>,
}

impl SidecarValues {
    /// Package name and first certificate fingerprint of the first Android
    /// app statement.
    pub fn read_asset_links(&mut self, json: &str) {
        let statements: Vec<AssetLinkStatement> = match serde_json::from_str(json) {
            Ok(s) => s,
            Err(e) => {
                debug!("Ignoring unreadable assetlinks.json: {}", e);
                return;
            }
        };

        let target = statements
            .into_iter()
            .filter_map(|s| s.target)
            .find(|t| t.namespace == "android_app");
        if let Some(target) = target {
            fill(&mut self.package_name, target.package_name);
            fill(&mut self.sha256, target.sha256_cert_fingerprints.into_iter().next());
        }
    }

    /// Team and bundle id from the first `TEAM.bundle.id` app identifier.
    pub fn read_site_association(&mut self, json: &str) {
        let association: SiteAssociation = match serde_json::from_str(json) {
            Ok(a) => a,
            Err(e) => {
                debug!("Ignoring unreadable apple-app-site-association: {}", e);
                return;
            }
        };

        let app_id = association
            .applinks
            .into_iter()
            .flat_map(|section| section.details)
            .flat_map(|detail| detail.app_id.into_iter().chain(detail.app_ids))
            .next();

        if let Some((team, bundle)) = app_id.as_deref().and_then(|id| id.split_once('.')) {
            fill(&mut self.team_id, Some(team.to_string()));
            fill(&mut self.bundle_id, Some(bundle.to_string()));
        }
    }

    /// Build settings from the Xcode project. Unresolved `$(VAR)` values
    /// and test-target identifiers are skipped.
    pub fn read_xcode_project(&mut self, pbxproj: &str) {
        let team = DEVELOPMENT_TEAM
            .captures_iter(pbxproj)
            .map(|c| c[1].to_string())
            .next();
        fill(&mut self.team_id, team);

        let bundle = BUNDLE_IDENTIFIER
            .captures_iter(pbxproj)
            .map(|c| c[1].to_string())
            .find(|id| !id.contains("$(") && !id.ends_with("Tests"));
        fill(&mut self.bundle_id, bundle);
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value.filter(|v| !v.trim().is_empty());
    }
}
