//! Info.plist permission keys and the key/value helpers the other iOS
//! editors build on.
//!
//! All edits happen in the text before the document's last `</dict>`, so the
//! closing `</dict></plist>` pair is never rewritten.

use crate::locator::{element_end, escape_xml, line_indent, unescape_xml};
use crate::model::{PermissionEntry, PermissionKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;
use tracing::debug;

/// Written when a string permission has neither a value nor a prior one
pub const TODO_DESCRIPTION: &str = "TODO: Provide usage description.";

/// Skeleton used for entitlements files that do not exist yet
pub const EMPTY_PLIST: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n<plist version=\"1.0\">\n<dict>\n</dict>\n</plist>\n";

static STRING_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<key>\s*([^<]+?)\s*</key>\s*<string>([\s\S]*?)</string>")
        .expect("Invalid plist string pair regex")
});

static BOOL_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<key>\s*([^<]+?)\s*</key>\s*<(true|false)\s*/>").expect("Invalid plist bool pair regex")
});

static STRING_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<string>([\s\S]*?)</string>").expect("Invalid plist string regex"));

static PERMISSION_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<key>\s*(NS\w+UsageDescription)\s*</key>").expect("Invalid usage key regex")
});

/// A `<key>` and the value element that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// From `<key>` to `</key>`
    pub key: Range<usize>,

    /// The whole value element, e.g. `<array>…</array>`
    pub value: Range<usize>,

    /// Tag name of the value element
    pub tag: String,
}

/// Index of the last `</dict>`, which closes the root dictionary.
pub fn root_dict_close(content: &str) -> Option<usize> {
    content.rfind("</dict>")
}

/// Find the first `<key>key</key>` at or after `from` and before `limit`,
/// together with its value element.
pub fn find_key(content: &str, key: &str, from: usize, limit: usize) -> Option<KeyValue> {
    let pattern = format!(r"<key>\s*{}\s*</key>", regex::escape(key));
    let regex = Regex::new(&pattern).ok()?;
    let window = content.get(from..limit)?;

    for m in regex.find_iter(window) {
        let key_range = (from + m.start())..(from + m.end());
        if let Some((tag, value)) = value_after(content, key_range.end) {
            if value.end <= limit {
                return Some(KeyValue {
                    key: key_range,
                    value,
                    tag,
                });
            }
        }
    }

    None
}

/// The value element starting at the first `<` after `pos`.
pub fn value_after(content: &str, pos: usize) -> Option<(String, Range<usize>)> {
    let rest = &content[pos..];
    let offset = rest.len() - rest.trim_start().len();
    let start = pos + offset;
    if !content[start..].starts_with('<') {
        return None;
    }

    let name_end = content[start + 1..]
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .map(|i| start + 1 + i)?;
    let tag = content[start + 1..name_end].to_string();
    if tag.is_empty() || tag == "key" {
        return None;
    }

    let end = element_end(content, start, &tag)?;
    Some((tag, start..end))
}

/// Remove `key` and its value (plus the whitespace leading up to the key)
/// from the root dictionary. Returns `None` when the key is absent.
pub fn remove_key(content: &str, key: &str) -> Option<String> {
    let limit = root_dict_close(content)?;
    let found = find_key(content, key, 0, limit)?;
    Some(remove_found(content, &found))
}

/// Remove a located key/value pair and the whitespace before it.
pub fn remove_found(content: &str, found: &KeyValue) -> String {
    let start = content[..found.key.start].trim_end().len();
    let mut out = String::with_capacity(content.len());
    out.push_str(&content[..start]);
    out.push_str(&content[found.value.end..]);
    out
}

/// Every occurrence of `key` (at any depth) before the root dictionary's close.
pub fn find_all_keys(content: &str, key: &str) -> Vec<KeyValue> {
    let Some(limit) = root_dict_close(content) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(kv) = find_key(content, key, from, limit) {
        from = kv.value.end;
        found.push(kv);
    }
    found
}

/// Insert rendered `<key>…</key>` lines before the root dictionary's close.
pub fn insert_before_root_close(content: &str, lines: &str) -> String {
    let Some(close) = root_dict_close(content) else {
        debug!("No </dict> found, leaving plist unchanged");
        return content.to_string();
    };
    format!(
        "{}{}\n{}",
        content[..close].trim_end(),
        lines,
        &content[close..]
    )
}

/// Indentation used for root-level keys: the first key's, else a tab.
pub fn key_indent(content: &str) -> String {
    content
        .find("<key>")
        .map(|pos| line_indent(content, pos).to_string())
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| "\t".to_string())
}

/// Render `<key>` plus a string value on the following line.
pub fn render_string(indent: &str, key: &str, value: &str) -> String {
    format!(
        "\n{}<key>{}</key>\n{}<string>{}</string>",
        indent,
        escape_xml(key),
        indent,
        escape_xml(value)
    )
}

pub fn render_bool(indent: &str, key: &str, value: bool) -> String {
    format!(
        "\n{}<key>{}</key>\n{}<{}/>",
        indent,
        escape_xml(key),
        indent,
        if value { "true" } else { "false" }
    )
}

pub fn render_array(indent: &str, key: &str, values: &[String]) -> String {
    let mut out = format!("\n{}<key>{}</key>\n{}<array>", indent, escape_xml(key), indent);
    for value in values {
        out.push_str(&format!("\n{}\t<string>{}</string>", indent, escape_xml(value)));
    }
    out.push_str(&format!("\n{}</array>", indent));
    out
}

/// `<string>` values inside an element such as `<array>…</array>`.
pub fn string_values(element: &str) -> Vec<String> {
    STRING_VALUE
        .captures_iter(element)
        .map(|cap| unescape_xml(cap[1].trim()))
        .collect()
}

/// Text of a `<string>` value element, or its boolean for `<true/>`/`<false/>`.
pub fn scalar_text(element: &str) -> Option<String> {
    let trimmed = element.trim();
    match trimmed {
        t if t.starts_with("<true") => Some("true".to_string()),
        t if t.starts_with("<false") => Some("false".to_string()),
        _ => STRING_VALUE
            .captures(trimmed)
            .map(|cap| unescape_xml(cap[1].trim())),
    }
}

/// Last write wins; the surviving entry keeps the first position.
fn dedupe_entries(entries: &[PermissionEntry]) -> Vec<PermissionEntry> {
    let mut unique: Vec<PermissionEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match unique.iter_mut().find(|e| e.key == entry.key) {
            Some(existing) => *existing = entry.clone(),
            None => unique.push(entry.clone()),
        }
    }
    unique
}

/// Rewrite exactly the requested permission keys. Keys not named in
/// `entries` are never touched.
///
/// A string entry without a value keeps the description already in the
/// document, so toggling a permission off and on does not lose its text.
pub fn update_plist(content: &str, entries: &[PermissionEntry]) -> String {
    let entries = dedupe_entries(entries);

    let Some(close) = root_dict_close(content) else {
        debug!("No </dict> found, leaving plist unchanged");
        return content.to_string();
    };
    let (prefix, suffix) = content.split_at(close);

    let mut recorded_text: HashMap<String, String> = HashMap::new();
    for cap in STRING_PAIR.captures_iter(prefix) {
        recorded_text
            .entry(cap[1].to_string())
            .or_insert_with(|| unescape_xml(&cap[2]));
    }
    let mut recorded_flag: HashMap<String, bool> = HashMap::new();
    for cap in BOOL_PAIR.captures_iter(prefix) {
        recorded_flag
            .entry(cap[1].to_string())
            .or_insert(&cap[2] == "true");
    }

    let indent = key_indent(prefix);
    let mut body = format!("{}{}", prefix, suffix);
    for entry in &entries {
        while let Some(stripped) = remove_scalar_key(&body, &entry.key) {
            body = stripped;
        }
    }

    let Some(close) = root_dict_close(&body) else {
        return content.to_string();
    };
    let (prefix, suffix) = body.split_at(close);

    let mut rendered = String::new();
    for entry in &entries {
        match entry.kind {
            PermissionKind::Boolean => {
                let value = entry
                    .flag_value()
                    .or_else(|| recorded_flag.get(&entry.key).copied())
                    .unwrap_or(false);
                rendered.push_str(&render_bool(&indent, &entry.key, value));
            }
            PermissionKind::String => {
                let value = entry
                    .text_value()
                    .map(str::to_string)
                    .or_else(|| {
                        recorded_text
                            .get(&entry.key)
                            .filter(|v| !v.trim().is_empty())
                            .cloned()
                    })
                    .unwrap_or_else(|| TODO_DESCRIPTION.to_string());
                rendered.push_str(&render_string(&indent, &entry.key, &value));
            }
        }
    }

    format!("{}{}\n{}", prefix.trim_end(), rendered, suffix)
}

/// Delete the given permission keys (string or boolean form).
pub fn remove_plist_keys<S: AsRef<str>>(content: &str, keys: &[S]) -> String {
    let mut out = content.to_string();
    for key in keys {
        while let Some(stripped) = remove_scalar_key(&out, key.as_ref()) {
            out = stripped;
        }
    }
    out
}

fn remove_scalar_key(content: &str, key: &str) -> Option<String> {
    let limit = root_dict_close(content)?;
    let found = find_key(content, key, 0, limit)?;
    if !matches!(found.tag.as_str(), "string" | "true" | "false") {
        return None;
    }
    remove_key(content, key)
}

/// Usage-description keys present in the plist with their text.
pub fn declared_plist_permissions(content: &str) -> Vec<PermissionEntry> {
    let limit = root_dict_close(content).unwrap_or(content.len());
    let mut entries: Vec<PermissionEntry> = Vec::new();

    for cap in PERMISSION_KEY.captures_iter(&content[..limit]) {
        let key = cap[1].to_string();
        if entries.iter().any(|e| e.key == key) {
            continue;
        }
        if let Some(found) = find_key(content, &key, 0, limit) {
            let text = scalar_text(&content[found.value.clone()]);
            let entry = match (found.tag.as_str(), text) {
                ("true" | "false", Some(t)) => PermissionEntry::flag(key, t == "true"),
                (_, Some(t)) => PermissionEntry::text(key, t),
                _ => PermissionEntry::unset(key),
            };
            entries.push(entry);
        }
    }

    entries
}
