//! Associated domains and URL schemes for universal links.

use super::LinkTargets;
use crate::ios::plist::EMPTY_PLIST;
use crate::ios::services::{
    add_array_values, add_url_scheme, plist_array, remove_array_values, remove_url_schemes, IosDocuments,
};

pub const ASSOCIATED_DOMAINS_KEY: &str = "com.apple.developer.associated-domains";
const APPLINKS_PREFIX: &str = "applinks:";

/// Replace every `applinks:` associated domain with the current hosts and
/// swap the previous custom schemes for the current ones.
pub fn apply_app_links(docs: &IosDocuments, targets: &LinkTargets, previous: Option<&LinkTargets>) -> IosDocuments {
    let mut out = docs.clone();
    let values: Vec<String> = targets
        .hosts
        .iter()
        .map(|h| format!("{}{}", APPLINKS_PREFIX, h))
        .collect();

    if let Some(doc) = out.entitlements.as_deref() {
        out.entitlements = Some(remove_array_values(doc, ASSOCIATED_DOMAINS_KEY, |v| {
            v.starts_with(APPLINKS_PREFIX) && !values.iter().any(|x| x == v)
        }));
    }
    if !values.is_empty() {
        let doc = out.entitlements.as_deref().unwrap_or(EMPTY_PLIST);
        out.entitlements = Some(add_array_values(doc, ASSOCIATED_DOMAINS_KEY, &values));
    }

    if let Some(previous) = previous {
        out.plist = remove_url_schemes(&out.plist, |s| {
            previous.schemes.iter().any(|p| p == s) && !targets.schemes.iter().any(|k| k == s)
        });
    }
    for scheme in &targets.schemes {
        out.plist = add_url_scheme(&out.plist, scheme, None);
    }

    out
}

/// Drop `applinks:` entitlements and the previously configured schemes.
pub fn remove_app_links(docs: &IosDocuments, previous: Option<&LinkTargets>) -> IosDocuments {
    let mut out = docs.clone();

    if let Some(doc) = out.entitlements.as_deref() {
        out.entitlements = Some(remove_array_values(doc, ASSOCIATED_DOMAINS_KEY, |v| v.starts_with(APPLINKS_PREFIX)));
    }

    if let Some(previous) = previous {
        out.plist = remove_url_schemes(&out.plist, |s| previous.schemes.iter().any(|p| p == s));
    }

    out
}

/// Hosts listed as `applinks:` associated domains.
pub fn extract_app_links(entitlements: &str) -> Option<LinkTargets> {
    let values = plist_array(entitlements, ASSOCIATED_DOMAINS_KEY)?;
    let mut targets = LinkTargets::default();
    for value in values {
        if let Some(host) = value.strip_prefix(APPLINKS_PREFIX) {
            // `applinks:host?mode=developer`
            targets.push_host(host.split('?').next().unwrap_or(host));
        }
    }
    (!targets.hosts.is_empty()).then_some(targets)
}
