//! Marker-delimited intent filters inside the launcher activity.

use super::LinkTargets;
use crate::android::services::cleanup;
use crate::locator::{element_end, find_first_element, find_open_tag, line_indent, remove_element};
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

pub const START_MARKER: &str = "<!-- applinks:start -->";
pub const END_MARKER: &str = "<!-- applinks:end -->";

const MAIN_ACTION: &str = "android.intent.action.MAIN";
const VIEW_ACTION: &str = "android.intent.action.VIEW";
const BROWSABLE_CATEGORY: &str = "android.intent.category.BROWSABLE";

static DATA_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<data\s[^>]*>").expect("Invalid data tag regex"));

static DATA_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\sandroid:(scheme|host)\s*=\s*"([^"]*)""#).expect("Invalid data attribute regex")
});

/// Rewrite the app-links block of the launcher activity for `targets`.
///
/// Any earlier block and any unmarked VIEW + BROWSABLE intent filter in that
/// activity are dropped first, so reapplying is stable. Empty targets leave
/// no block behind.
pub fn apply_app_links(manifest: &str, targets: &LinkTargets, indent: &str) -> String {
    let mut out = remove_block(manifest);

    let Some(activity) = main_activity(&out) else {
        debug!("No launcher activity found, skipping app links");
        return cleanup(&out);
    };
    out = strip_legacy_filters(&out, activity);

    if targets.is_empty() {
        return cleanup(&out);
    }

    // Stripping shortened the activity, locate it again
    let Some(activity) = main_activity(&out) else {
        return cleanup(&out);
    };
    let Some(close) = out[activity.clone()].rfind("</activity").map(|i| activity.start + i) else {
        return cleanup(&out);
    };

    let activity_indent = line_indent(&out, activity.start).to_string();
    let child = format!("{}{}", activity_indent, indent);
    let block = render_block(targets, &child, indent);
    let head = out[..close].trim_end();

    cleanup(&format!("{}\n{}\n{}{}", head, block, activity_indent, &out[close..]))
}

/// Drop the app-links block, if present.
pub fn remove_app_links(manifest: &str) -> String {
    cleanup(&remove_block(manifest))
}

/// Hosts and schemes declared inside the app-links block.
pub fn extract_app_links(manifest: &str) -> Option<LinkTargets> {
    let range = block_range(manifest)?;
    let block = &manifest[range];
    let mut targets = LinkTargets::default();

    for tag in DATA_TAG.find_iter(block) {
        let mut scheme = None;
        let mut host = None;
        for cap in DATA_ATTR.captures_iter(tag.as_str()) {
            match &cap[1] {
                "scheme" => scheme = Some(cap[2].to_string()),
                _ => host = Some(cap[2].to_string()),
            }
        }
        match (scheme.as_deref(), host) {
            (_, Some(host)) => targets.push_host(&host),
            (Some(scheme), None) => targets.push_scheme(scheme),
            (None, None) => {}
        }
    }

    Some(targets)
}

fn block_range(manifest: &str) -> Option<Range<usize>> {
    let start = manifest.find(START_MARKER)?;
    let end = manifest[start..].find(END_MARKER)? + start + END_MARKER.len();
    Some(start..end)
}

fn remove_block(manifest: &str) -> String {
    let mut out = manifest.to_string();
    while let Some(range) = block_range(&out) {
        out = remove_element(&out, range);
    }
    out
}

/// Range of the first `<activity>` whose body mentions the MAIN action.
fn main_activity(manifest: &str) -> Option<Range<usize>> {
    let mut from = 0;
    while let Some(start) = find_open_tag(manifest, "activity", from) {
        let end = element_end(manifest, start, "activity")?;
        if manifest[start..end].contains(MAIN_ACTION) {
            return Some(start..end);
        }
        from = end;
    }
    None
}

fn strip_legacy_filters(manifest: &str, activity: Range<usize>) -> String {
    let mut out = manifest.to_string();
    let mut end = activity.end;
    let mut from = activity.start;

    while let Some(filter) = find_first_element(&out, "intent-filter", from) {
        if filter.end > end {
            break;
        }
        let body = &out[filter.clone()];
        if body.contains(VIEW_ACTION) && body.contains(BROWSABLE_CATEGORY) {
            debug!("Removing unmarked deep-link intent filter");
            let before = out.len();
            out = remove_element(&out, filter.clone());
            end -= before - out.len();
            from = activity.start;
        } else {
            from = filter.end;
        }
    }

    out
}

fn render_block(targets: &LinkTargets, child: &str, indent: &str) -> String {
    let inner = format!("{}{}", child, indent);
    let mut lines = vec![format!("{}{}", child, START_MARKER)];

    let filter_head = |lines: &mut Vec<String>, open: &str| {
        lines.push(format!("{}{}", child, open));
        lines.push(format!("{}<action android:name=\"{}\" />", inner, VIEW_ACTION));
        lines.push(format!("{}<category android:name=\"android.intent.category.DEFAULT\" />", inner));
        lines.push(format!("{}<category android:name=\"{}\" />", inner, BROWSABLE_CATEGORY));
    };

    if !targets.hosts.is_empty() {
        filter_head(&mut lines, "<intent-filter android:autoVerify=\"true\">");
        for host in &targets.hosts {
            lines.push(format!(
                "{}<data android:scheme=\"https\" android:host=\"{}\" />",
                inner, host
            ));
        }
        lines.push(format!("{}</intent-filter>", child));
    }

    if !targets.schemes.is_empty() {
        filter_head(&mut lines, "<intent-filter>");
        for scheme in &targets.schemes {
            lines.push(format!("{}<data android:scheme=\"{}\" />", inner, scheme));
        }
        lines.push(format!("{}</intent-filter>", child));
    }

    lines.push(format!("{}{}", child, END_MARKER));
    lines.join("\n")
}
