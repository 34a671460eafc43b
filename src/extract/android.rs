//! Service detection in AndroidManifest.xml.

use crate::android::services::find_application_element;
use crate::android::strings::resolve_reference;
use crate::catalog::{placeholder_pattern, placeholders, ElementTemplate, ServiceConfig};
use crate::locator::{find_element_bounds, unescape_xml};
use crate::model::ServiceEntry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::trace;

static VALUE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\sandroid:(?:value|resource)\s*=\s*"([^"]*)""#).expect("Invalid meta-data value regex")
});

/// What the manifest reveals about `config`, or `None` when none of its
/// fragments are present.
pub fn extract_from_manifest(
    manifest: &str,
    strings: Option<&HashMap<String, String>>,
    config: &ServiceConfig,
) -> Option<ServiceEntry> {
    let android = config.android.as_ref()?;
    let mut entry = ServiceEntry::new(config.id.clone());
    let mut found = false;

    for spec in &android.meta_data {
        let Some(range) = find_element_bounds(manifest, "meta-data", "android:name", &spec.name) else {
            continue;
        };
        found = true;
        trace!("{}: meta-data {} present", config.id, spec.name);

        let Some(field) = spec.value_field.as_deref() else {
            continue;
        };
        let tag = &manifest[range];
        let Some(raw) = VALUE_ATTR.captures(tag).map(|c| unescape_xml(&c[1])) else {
            continue;
        };
        let Some(resolved) = resolve_reference(&raw, strings) else {
            continue;
        };
        let prefix = spec.prefix.as_deref().unwrap_or("");
        let value = resolved.strip_prefix(prefix).unwrap_or(&resolved);
        if !value.is_empty() {
            entry.values.insert(field.to_string(), value.to_string());
        }
    }

    for query in &android.queries {
        let Some((_, identity)) = query.identity() else {
            continue;
        };
        if placeholders(identity).is_empty() && manifest.contains(identity) {
            trace!("{}: query {} present", config.id, identity);
            found = true;
        }
    }

    for element in &android.application_data {
        let Some(range) = find_application_element(manifest, element, config, None) else {
            continue;
        };
        found = true;
        capture_attributes(&manifest[range], element, &mut entry);
    }

    if found {
        if let Some(strings) = strings {
            for spec in &android.string_resources {
                if let Some(value) = strings.get(&spec.name).filter(|v| !v.is_empty()) {
                    entry.values.entry(spec.value_field.clone()).or_insert_with(|| value.clone());
                }
            }
        }
    }

    found.then_some(entry)
}

/// Recover field values from templated attributes anywhere inside `element_text`.
fn capture_attributes(element_text: &str, template: &ElementTemplate, entry: &mut ServiceEntry) {
    for (key, value) in template.attributes.iter() {
        if placeholders(value).is_empty() {
            continue;
        }
        let source = format!(r#"{}\s*=\s*"{}""#, regex::escape(key), placeholder_pattern(value, true));
        let Ok(pattern) = Regex::new(&source) else {
            continue;
        };
        if let Some(caps) = pattern.captures(element_text) {
            for name in pattern.capture_names().flatten() {
                if let Some(m) = caps.name(name).filter(|m| !m.as_str().is_empty()) {
                    entry
                        .values
                        .entry(name.to_string())
                        .or_insert_with(|| unescape_xml(m.as_str()));
                }
            }
        }
    }

    for child in &template.children {
        capture_attributes(element_text, child, entry);
    }
}
