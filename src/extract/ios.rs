//! Service detection in Info.plist, entitlements and AppDelegate.swift.

use crate::catalog::{placeholders, PlistValueKind, ServiceConfig, StaticValue};
use crate::ios::app_delegate::extract_snippet;
use crate::ios::services::{plist_array, plist_value, split_list, url_schemes};
use crate::model::ServiceEntry;
use regex::Regex;
use tracing::trace;

pub fn extract_from_plist(plist: &str, config: &ServiceConfig) -> Option<ServiceEntry> {
    let ios = config.ios.as_ref()?;
    let mut entry = ServiceEntry::new(config.id.clone());
    let mut found = false;

    for spec in &ios.plist_entries {
        match spec.kind {
            PlistValueKind::String | PlistValueKind::Boolean => {
                let Some(text) = plist_value(plist, &spec.key) else {
                    continue;
                };
                found = true;
                if let Some(field) = spec.value_field.as_deref() {
                    let prefix = spec.prefix.as_deref().unwrap_or("");
                    let value = text.strip_prefix(prefix).unwrap_or(&text);
                    if !value.is_empty() {
                        entry.values.insert(field.to_string(), value.to_string());
                    }
                }
            }
            PlistValueKind::Array => {
                let Some(items) = plist_array(plist, &spec.key) else {
                    continue;
                };
                let statics: Vec<String> = match &spec.value {
                    Some(StaticValue::List(values)) => values.clone(),
                    Some(StaticValue::Text(value)) => vec![value.clone()],
                    _ => Vec::new(),
                };
                // Shared arrays such as LSApplicationQueriesSchemes only count
                // when one of the service's own values is listed
                if !statics.is_empty() && statics.iter().any(|s| items.contains(s)) {
                    found = true;
                }
                if let (Some(field), Some(prefix)) = (spec.value_field.as_deref(), spec.prefix.as_deref().filter(|p| !p.is_empty())) {
                    let values = stripped_values(&items, prefix);
                    if !values.is_empty() {
                        found = true;
                        entry.values.insert(field.to_string(), values.join(", "));
                    }
                }
            }
        }
    }

    let schemes = url_schemes(plist);
    for spec in &ios.url_schemes {
        // A scheme without a prefix cannot be told apart from any other
        let Some(prefix) = spec.prefix.as_deref().filter(|p| !p.is_empty()) else {
            continue;
        };
        if let Some(scheme) = schemes.iter().find(|s| s.starts_with(prefix) && s.len() > prefix.len()) {
            trace!("{}: URL scheme {} present", config.id, scheme);
            found = true;
            entry
                .values
                .entry(spec.value_field.clone())
                .or_insert_with(|| scheme[prefix.len()..].to_string());
        }
    }

    found.then_some(entry)
}

pub fn extract_from_entitlements(entitlements: &str, config: &ServiceConfig) -> Option<ServiceEntry> {
    let ios = config.ios.as_ref()?;
    let mut entry = ServiceEntry::new(config.id.clone());
    let mut found = false;

    for spec in &ios.entitlements {
        let Some(items) = plist_array(entitlements, &spec.key) else {
            continue;
        };
        if spec.values.iter().any(|v| items.contains(v)) {
            found = true;
        }
        if let (Some(field), Some(prefix)) = (spec.value_field.as_deref(), spec.prefix.as_deref().filter(|p| !p.is_empty())) {
            let statics: Vec<String> = spec.values.iter().map(|v| v.trim_start_matches(prefix).to_string()).collect();
            let values: Vec<String> = stripped_values(&items, prefix)
                .into_iter()
                .filter(|v| !statics.contains(v))
                .collect();
            if !values.is_empty() {
                found = true;
                entry.values.insert(field.to_string(), values.join(", "));
            }
        }
    }

    found.then_some(entry)
}

/// Match the catalog snippet exactly, falling back to a looser recogniser
/// built from the call the snippet makes.
pub fn extract_from_app_delegate(source: &str, config: &ServiceConfig) -> Option<ServiceEntry> {
    let spec = config.ios.as_ref()?.app_delegate.as_ref()?;
    let mut entry = ServiceEntry::new(config.id.clone());

    if let Some(values) = extract_snippet(source, &spec.code) {
        for (field, value) in values {
            if !value.is_empty() {
                entry.values.insert(field, value);
            }
        }
        return Some(entry);
    }

    let recognizer = InitializerCall::from_template(&spec.code)?;
    let value = recognizer.find(source)?;
    trace!("{}: initializer call recognised", config.id);
    if let (Some(field), Some(value)) = (recognizer.field.as_deref(), value) {
        entry.values.insert(field.to_string(), value);
    }
    Some(entry)
}

/// A known SDK bootstrap call: either presence-only (`FirebaseApp.configure()`)
/// or taking one string argument (`GMSServices.provideAPIKey("…")`).
#[derive(Debug)]
struct InitializerCall {
    pattern: Regex,
    field: Option<String>,
}

impl InitializerCall {
    fn from_template(template: &str) -> Option<Self> {
        let template = template.trim();
        let fields = placeholders(template);

        match fields.as_slice() {
            [] => {
                let head = &template[..template.find('(')?];
                let pattern = Regex::new(&format!(r"{}\s*\(", spaced(head))).ok()?;
                Some(Self { pattern, field: None })
            }
            [field] => {
                let marker = format!("\"{{{}}}\"", field);
                let at = template.find(&marker)?;
                let head = &template[..template[..at].rfind('(')?];
                let source = format!(r#"{}\s*\(\s*(?:\w+\s*:\s*)?"([^"\n]*)""#, spaced(head));
                let pattern = Regex::new(&source).ok()?;
                Some(Self {
                    pattern,
                    field: Some(field.clone()),
                })
            }
            _ => None,
        }
    }

    /// `Some(value)` when the call is present; the inner value is the
    /// captured argument, if the call takes one.
    fn find(&self, source: &str) -> Option<Option<String>> {
        let caps = self.pattern.captures(source)?;
        Some(caps.get(1).map(|m| m.as_str().to_string()).filter(|v| !v.is_empty()))
    }
}

/// Escape a call path, tolerating whitespace around the dots.
fn spaced(head: &str) -> String {
    head.trim()
        .split('.')
        .map(|part| regex::escape(part.trim()))
        .collect::<Vec<_>>()
        .join(r"\s*\.\s*")
}

fn stripped_values(items: &[String], prefix: &str) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.strip_prefix(prefix))
        .flat_map(split_list)
        .collect()
}
