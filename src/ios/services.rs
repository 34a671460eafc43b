//! Catalog-driven service fragments for Info.plist, entitlements and the
//! app delegate.

use super::app_delegate;
use super::plist::{
    find_all_keys, find_key, insert_before_root_close, key_indent, remove_found, remove_key,
    render_array, render_bool, render_string, root_dict_close, scalar_text, string_values,
    KeyValue, EMPTY_PLIST,
};
use crate::catalog::{PlistEntrySpec, PlistValueKind, ServiceConfig, StaticValue};
use crate::locator::{element_end, escape_xml, expand_to_lines, line_indent, splice, unescape_xml};
use crate::model::ServiceEntry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

static ARRAY_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<string>([\s\S]*?)</string>").expect("Invalid array item regex"));

const URL_SCHEMES_KEY: &str = "CFBundleURLSchemes";
const URL_TYPES_KEY: &str = "CFBundleURLTypes";

/// Documents touched by an iOS service edit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IosDocuments {
    pub plist: String,

    /// `Runner.entitlements`; created on demand
    pub entitlements: Option<String>,

    /// `AppDelegate.swift`, when the project has one
    pub app_delegate: Option<String>,
}

/// Apply every iOS fragment `config` declares.
pub fn add_service(docs: &IosDocuments, config: &ServiceConfig, entry: &ServiceEntry) -> IosDocuments {
    let Some(ios) = &config.ios else {
        return docs.clone();
    };
    let mut out = docs.clone();

    for spec in &ios.plist_entries {
        out.plist = add_plist_entry(&out.plist, spec, config, entry);
    }

    for spec in &ios.url_schemes {
        if let Some(value) = config.resolve(entry, &spec.value_field) {
            let prefix = spec.prefix.as_deref().unwrap_or("");
            let scheme = format!("{}{}", prefix, value.trim());
            out.plist = add_url_scheme(&out.plist, &scheme, spec.prefix.as_deref());
        }
    }

    for spec in &ios.entitlements {
        let values = entitlement_values(&spec.values, spec.value_field.as_deref(), spec.prefix.as_deref(), config, entry);
        if values.is_empty() {
            continue;
        }
        let doc = out.entitlements.as_deref().unwrap_or(EMPTY_PLIST);
        out.entitlements = Some(add_array_values(doc, &spec.key, &values));
    }

    if let (Some(spec), Some(source)) = (&ios.app_delegate, out.app_delegate.as_deref()) {
        let code = config.fill(&spec.code, entry);
        out.app_delegate = Some(app_delegate::add_snippet(source, spec.import.as_deref(), &spec.code, &code));
    }

    out
}

/// Remove every iOS fragment `config` declares. `previous` carries the
/// values the service was saved with, when known, so exact-valued fragments
/// can be matched.
pub fn remove_service(docs: &IosDocuments, config: &ServiceConfig, previous: Option<&ServiceEntry>) -> IosDocuments {
    let Some(ios) = &config.ios else {
        return docs.clone();
    };
    let mut out = docs.clone();
    let previous = previous.cloned().unwrap_or_else(|| ServiceEntry::new(config.id.clone()));

    for spec in &ios.plist_entries {
        out.plist = remove_plist_entry(&out.plist, spec, config, &previous);
    }

    for spec in &ios.url_schemes {
        let prefix = spec.prefix.as_deref().filter(|p| !p.is_empty());
        let exact = config
            .resolve(&previous, &spec.value_field)
            .map(|v| format!("{}{}", prefix.unwrap_or(""), v.trim()));
        let updated = match (exact, prefix) {
            (Some(scheme), _) => Some(remove_url_schemes(&out.plist, |s| s == scheme)),
            (None, Some(prefix)) => Some(remove_url_schemes(&out.plist, |s| s.starts_with(prefix))),
            (None, None) => None,
        };
        if let Some(plist) = updated {
            out.plist = plist;
        }
    }

    for spec in &ios.entitlements {
        if let Some(doc) = out.entitlements.as_deref() {
            let values = entitlement_values(&spec.values, spec.value_field.as_deref(), spec.prefix.as_deref(), config, &previous);
            let prefix = spec.prefix.as_deref().filter(|p| !p.is_empty());
            out.entitlements = Some(remove_array_values(doc, &spec.key, |v| {
                values.iter().any(|x| x == v) || prefix.is_some_and(|p| v.starts_with(p))
            }));
        }
    }

    if let (Some(spec), Some(source)) = (&ios.app_delegate, out.app_delegate.as_deref()) {
        out.app_delegate = Some(app_delegate::remove_snippet(source, spec.import.as_deref(), &spec.code));
    }

    out
}

/// Static values plus the comma/whitespace separated field value, each
/// carrying `prefix` once.
fn entitlement_values(statics: &[String], field: Option<&str>, prefix: Option<&str>, config: &ServiceConfig, entry: &ServiceEntry) -> Vec<String> {
    let prefix = prefix.unwrap_or("");
    let from_field = field
        .and_then(|f| config.resolve(entry, f))
        .map(split_list)
        .unwrap_or_default();

    let mut values: Vec<String> = Vec::new();
    for raw in statics.iter().cloned().chain(from_field) {
        let value = if raw.starts_with(prefix) {
            raw
        } else {
            format!("{}{}", prefix, raw)
        };
        if !values.contains(&value) {
            values.push(value);
        }
    }
    values
}

/// Split a free-text list on commas, semicolons and whitespace.
pub fn split_list(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn add_plist_entry(plist: &str, spec: &PlistEntrySpec, config: &ServiceConfig, entry: &ServiceEntry) -> String {
    let field_value = spec
        .value_field
        .as_deref()
        .and_then(|f| config.resolve(entry, f))
        .map(|v| format!("{}{}", spec.prefix.as_deref().unwrap_or(""), v.trim()));

    match spec.kind {
        PlistValueKind::String => {
            let value = field_value.or(match &spec.value {
                Some(StaticValue::Text(t)) => Some(t.clone()),
                _ => None,
            });
            match value {
                Some(v) => set_scalar(plist, &spec.key, &format!("<string>{}</string>", escape_xml(&v)), |indent| render_string(indent, &spec.key, &v)),
                None => plist.to_string(),
            }
        }
        PlistValueKind::Boolean => {
            let value = field_value.as_deref().and_then(parse_flag).or(match &spec.value {
                Some(StaticValue::Flag(b)) => Some(*b),
                Some(StaticValue::Text(t)) => parse_flag(t),
                _ => None,
            });
            match value {
                Some(b) => set_scalar(plist, &spec.key, if b { "<true/>" } else { "<false/>" }, |indent| render_bool(indent, &spec.key, b)),
                None => plist.to_string(),
            }
        }
        PlistValueKind::Array => {
            let mut values = match &spec.value {
                Some(StaticValue::List(items)) => items.clone(),
                Some(StaticValue::Text(t)) => vec![t.clone()],
                _ => Vec::new(),
            };
            if let Some(v) = field_value {
                values.extend(split_list(&v));
            }
            if values.is_empty() {
                plist.to_string()
            } else {
                add_array_values(plist, &spec.key, &values)
            }
        }
    }
}

fn remove_plist_entry(plist: &str, spec: &PlistEntrySpec, config: &ServiceConfig, previous: &ServiceEntry) -> String {
    match spec.kind {
        PlistValueKind::String | PlistValueKind::Boolean => {
            remove_key(plist, &spec.key).unwrap_or_else(|| plist.to_string())
        }
        PlistValueKind::Array => {
            let mut values: Vec<String> = match &spec.value {
                Some(StaticValue::List(items)) => items.clone(),
                Some(StaticValue::Text(t)) => vec![t.clone()],
                _ => Vec::new(),
            };
            if let Some(v) = spec.value_field.as_deref().and_then(|f| config.resolve(previous, f)) {
                let prefix = spec.prefix.as_deref().unwrap_or("");
                values.extend(split_list(&format!("{}{}", prefix, v)));
            }
            let prefix = spec.prefix.as_deref().filter(|p| !p.is_empty() && spec.value_field.is_some());
            remove_array_values(plist, &spec.key, |item| {
                values.iter().any(|v| v == item) || prefix.is_some_and(|p| item.starts_with(p))
            })
        }
    }
}

/// Replace the value element of `key`, or insert a rendered pair.
fn set_scalar<F>(plist: &str, key: &str, element: &str, render: F) -> String
where
    F: FnOnce(&str) -> String,
{
    let Some(close) = root_dict_close(plist) else {
        return plist.to_string();
    };
    match find_key(plist, key, 0, close) {
        Some(found) if &plist[found.value.clone()] == element => plist.to_string(),
        Some(found) => splice(plist, found.value, element),
        None => insert_before_root_close(plist, &render(&key_indent(plist))),
    }
}

/// Make sure the array under `key` contains every value, creating it when
/// missing. Existing items and their order are kept.
pub fn add_array_values(content: &str, key: &str, values: &[String]) -> String {
    let Some(close) = root_dict_close(content) else {
        return content.to_string();
    };
    match find_key(content, key, 0, close) {
        Some(found) if found.tag == "array" => append_to_array(content, &found, values),
        Some(found) => {
            debug!("{} is not an array, replacing its value", key);
            let indent = line_indent(content, found.key.start).to_string();
            let rendered = render_array(&indent, key, values);
            let without = remove_found(content, &found);
            insert_before_root_close(&without, &rendered)
        }
        None => insert_before_root_close(content, &render_array(&key_indent(content), key, values)),
    }
}

fn append_to_array(content: &str, found: &KeyValue, values: &[String]) -> String {
    let element = &content[found.value.clone()];
    let existing = string_values(element);
    let mut missing: Vec<&String> = Vec::new();
    for value in values {
        if !existing.contains(value) && !missing.contains(&value) {
            missing.push(value);
        }
    }
    if missing.is_empty() {
        return content.to_string();
    }

    let key_indent = line_indent(content, found.key.start).to_string();
    let item_indent = element
        .find("<string")
        .map(|i| line_indent(content, found.value.start + i).to_string())
        .filter(|i| i.len() > key_indent.len())
        .unwrap_or_else(|| format!("{}\t", key_indent));
    let items: String = missing
        .iter()
        .map(|v| format!("\n{}<string>{}</string>", item_indent, escape_xml(v)))
        .collect();

    match element.rfind("</array") {
        Some(rel) => {
            let close = found.value.start + rel;
            let head = content[..close].trim_end();
            format!("{}{}\n{}{}", head, items, key_indent, &content[close..])
        }
        None => splice(content, found.value.clone(), &format!("<array>{}\n{}</array>", items, key_indent)),
    }
}

/// Remove array items under `key` matching `predicate`; drops the key when
/// the array ends up empty.
pub fn remove_array_values<P>(content: &str, key: &str, predicate: P) -> String
where
    P: Fn(&str) -> bool,
{
    let Some(close) = root_dict_close(content) else {
        return content.to_string();
    };
    let Some(found) = find_key(content, key, 0, close) else {
        return content.to_string();
    };
    if found.tag != "array" {
        return content.to_string();
    }

    let (updated, remaining) = strip_items(content, found.value.clone(), &predicate);
    if remaining > 0 {
        return updated;
    }
    let limit = root_dict_close(&updated).unwrap_or(updated.len());
    match find_key(&updated, key, 0, limit) {
        Some(found) => remove_found(&updated, &found),
        None => updated,
    }
}

/// Remove matching `<string>` items inside `array`; returns the new text and
/// the number of items left.
fn strip_items<P>(content: &str, array: Range<usize>, predicate: &P) -> (String, usize)
where
    P: Fn(&str) -> bool,
{
    let element = &content[array.clone()];
    let mut doomed: Vec<Range<usize>> = Vec::new();
    let mut remaining = 0;

    for cap in ARRAY_ITEM.captures_iter(element) {
        let Some(m) = cap.get(0) else { continue };
        let value = unescape_xml(cap[1].trim());
        if predicate(&value) {
            doomed.push((array.start + m.start())..(array.start + m.end()));
        } else {
            remaining += 1;
        }
    }

    let mut out = content.to_string();
    for range in doomed.into_iter().rev() {
        let range = expand_to_lines(&out, range);
        out.replace_range(range, "");
    }
    (out, remaining)
}

/// All URL schemes across every `CFBundleURLSchemes` array.
pub fn url_schemes(plist: &str) -> Vec<String> {
    find_all_keys(plist, URL_SCHEMES_KEY)
        .iter()
        .filter(|kv| kv.tag == "array")
        .flat_map(|kv| string_values(&plist[kv.value.clone()]))
        .collect()
}

/// Merge `scheme` into the URL types: an exact match is a no-op, a match on
/// `prefix` is replaced, otherwise it is appended to the first schemes array
/// or a new URL type is synthesised.
pub fn add_url_scheme(plist: &str, scheme: &str, prefix: Option<&str>) -> String {
    let arrays: Vec<KeyValue> = find_all_keys(plist, URL_SCHEMES_KEY)
        .into_iter()
        .filter(|kv| kv.tag == "array")
        .collect();

    for kv in &arrays {
        if string_values(&plist[kv.value.clone()]).iter().any(|s| s == scheme) {
            return plist.to_string();
        }
    }

    if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
        for kv in &arrays {
            let element = &plist[kv.value.clone()];
            for cap in ARRAY_ITEM.captures_iter(element) {
                let (Some(m), Some(inner)) = (cap.get(0), cap.get(1)) else {
                    continue;
                };
                if unescape_xml(inner.as_str().trim()).starts_with(prefix) {
                    let range = (kv.value.start + m.start())..(kv.value.start + m.end());
                    return splice(plist, range, &format!("<string>{}</string>", escape_xml(scheme)));
                }
            }
        }
    }

    if let Some(first) = arrays.first() {
        return append_to_array(plist, first, &[scheme.to_string()]);
    }

    let Some(close) = root_dict_close(plist) else {
        return plist.to_string();
    };
    if let Some(types) = find_key(plist, URL_TYPES_KEY, 0, close).filter(|kv| kv.tag == "array") {
        let key_indent = line_indent(plist, types.key.start).to_string();
        let dict = render_url_type(&format!("{}\t", key_indent), scheme);
        let element = &plist[types.value.clone()];
        return match element.rfind("</array") {
            Some(rel) => {
                let at = types.value.start + rel;
                format!("{}{}\n{}{}", plist[..at].trim_end(), dict, key_indent, &plist[at..])
            }
            None => splice(plist, types.value, &format!("<array>{}\n{}</array>", dict, key_indent)),
        };
    }

    let indent = key_indent(plist);
    let rendered = format!(
        "\n{}<key>{}</key>\n{}<array>{}\n{}</array>",
        indent,
        URL_TYPES_KEY,
        indent,
        render_url_type(&format!("{}\t", indent), scheme),
        indent
    );
    insert_before_root_close(plist, &rendered)
}

fn render_url_type(indent: &str, scheme: &str) -> String {
    format!(
        "\n{i}<dict>\n{i}\t<key>CFBundleTypeRole</key>\n{i}\t<string>Editor</string>\n{i}\t<key>{k}</key>\n{i}\t<array>\n{i}\t\t<string>{s}</string>\n{i}\t</array>\n{i}</dict>",
        i = indent,
        k = URL_SCHEMES_KEY,
        s = escape_xml(scheme)
    )
}

/// Remove matching URL schemes. A URL type left without schemes is
/// removed, and so is `CFBundleURLTypes` once it holds no types.
pub fn remove_url_schemes<P>(plist: &str, predicate: P) -> String
where
    P: Fn(&str) -> bool,
{
    let mut out = plist.to_string();
    let mut from = 0;

    loop {
        let Some(limit) = root_dict_close(&out) else { break };
        let Some(kv) = find_key(&out, URL_SCHEMES_KEY, from, limit) else { break };
        if kv.tag != "array" {
            from = kv.value.end;
            continue;
        }

        let (updated, remaining) = strip_items(&out, kv.value.clone(), &predicate);
        out = updated;

        if remaining > 0 {
            // Text before the key is unchanged, so it can be found again in place
            let limit = root_dict_close(&out).unwrap_or(out.len());
            from = find_key(&out, URL_SCHEMES_KEY, kv.key.start, limit)
                .map(|k| k.value.end)
                .unwrap_or(out.len());
            continue;
        }

        match enclosing_dict(&out, kv.key.start) {
            Some(dict) => {
                let range = expand_to_lines(&out, dict);
                from = range.start;
                out = splice(&out, range, "");
            }
            None => {
                let limit = root_dict_close(&out).unwrap_or(out.len());
                let Some(again) = find_key(&out, URL_SCHEMES_KEY, kv.key.start, limit) else {
                    break;
                };
                from = out[..again.key.start].trim_end().len();
                out = remove_found(&out, &again);
            }
        }
    }

    let Some(limit) = root_dict_close(&out) else {
        return out;
    };
    if let Some(types) = find_key(&out, URL_TYPES_KEY, 0, limit) {
        if types.tag == "array" && !out[types.value.clone()].contains("<dict") {
            return remove_found(&out, &types);
        }
    }
    out
}

/// The `<dict>…</dict>` (other than the root) that contains `pos`.
fn enclosing_dict(content: &str, pos: usize) -> Option<Range<usize>> {
    let root_open = content.find("<dict")?;
    let mut search_end = pos;
    while let Some(start) = content[..search_end].rfind("<dict") {
        if start == root_open {
            return None;
        }
        if let Some(end) = element_end(content, start, "dict") {
            if end > pos {
                return Some(start..end);
            }
        }
        search_end = start;
    }
    None
}

/// Scalar text of a plist key in the root dictionary.
pub fn plist_value(plist: &str, key: &str) -> Option<String> {
    let close = root_dict_close(plist)?;
    let found = find_key(plist, key, 0, close)?;
    scalar_text(&plist[found.value])
}

/// Array items of a plist key.
pub fn plist_array(plist: &str, key: &str) -> Option<Vec<String>> {
    let close = root_dict_close(plist)?;
    let found = find_key(plist, key, 0, close)?;
    (found.tag == "array").then(|| string_values(&plist[found.value]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    const PLIST: &str = "<plist version=\"1.0\">\n<dict>\n\t<key>CFBundleName</key>\n\t<string>demo</string>\n</dict>\n</plist>\n";

    const WITH_URL_TYPES: &str = "<plist version=\"1.0\">\n<dict>\n\t<key>CFBundleURLTypes</key>\n\t<array>\n\t\t<dict>\n\t\t\t<key>CFBundleURLSchemes</key>\n\t\t\t<array>\n\t\t\t\t<string>myapp</string>\n\t\t\t</array>\n\t\t</dict>\n\t</array>\n</dict>\n</plist>\n";

    fn facebook_entry() -> ServiceEntry {
        ServiceEntry::new("facebook")
            .with_value("appId", "123")
            .with_value("clientToken", "tok")
    }

    #[test]
    fn test_url_scheme_synthesises_types() {
        let updated = add_url_scheme(PLIST, "fb123", Some("fb"));
        assert!(updated.contains("<key>CFBundleURLTypes</key>"));
        assert_eq!(url_schemes(&updated), vec!["fb123"]);
        assert_eq!(add_url_scheme(&updated, "fb123", Some("fb")), updated);
    }

    #[test]
    fn test_url_scheme_appends_and_replaces_prefix() {
        let appended = add_url_scheme(WITH_URL_TYPES, "fb1", Some("fb"));
        assert_eq!(url_schemes(&appended), vec!["myapp", "fb1"]);
        assert!(appended.contains("\t\t\t\t<string>myapp</string>\n\t\t\t\t<string>fb1</string>\n\t\t\t</array>"));

        let replaced = add_url_scheme(&appended, "fb2", Some("fb"));
        assert_eq!(url_schemes(&replaced), vec!["myapp", "fb2"]);
    }

    #[test]
    fn test_remove_url_scheme_drops_empty_types() {
        let added = add_url_scheme(PLIST, "fb123", Some("fb"));
        let removed = remove_url_schemes(&added, |s| s == "fb123");
        assert_eq!(removed, PLIST);
    }

    #[test]
    fn test_remove_url_scheme_keeps_other_types() {
        let appended = add_url_scheme(WITH_URL_TYPES, "fb1", Some("fb"));
        let removed = remove_url_schemes(&appended, |s| s.starts_with("fb"));
        assert_eq!(removed, WITH_URL_TYPES);
    }

    #[test]
    fn test_array_values_merge_and_remove() {
        let a = add_array_values(PLIST, "LSApplicationQueriesSchemes", &["fbapi".to_string()]);
        let b = add_array_values(&a, "LSApplicationQueriesSchemes", &["whatsapp".to_string(), "fbapi".to_string()]);
        assert_eq!(plist_array(&b, "LSApplicationQueriesSchemes").unwrap(), vec!["fbapi", "whatsapp"]);

        let c = remove_array_values(&b, "LSApplicationQueriesSchemes", |v| v == "whatsapp");
        assert_eq!(c, a);
        let d = remove_array_values(&c, "LSApplicationQueriesSchemes", |v| v == "fbapi");
        assert_eq!(d, PLIST);
    }

    #[test]
    fn test_facebook_add_idempotent_and_removable() {
        let catalog = Catalog::builtin().unwrap();
        let config = catalog.service("facebook").unwrap();
        let docs = IosDocuments {
            plist: PLIST.to_string(),
            entitlements: None,
            app_delegate: None,
        };

        let once = add_service(&docs, config, &facebook_entry());
        assert_eq!(add_service(&once, config, &facebook_entry()), once);
        assert_eq!(plist_value(&once.plist, "FacebookAppID").as_deref(), Some("123"));
        assert_eq!(url_schemes(&once.plist), vec!["fb123"]);

        let removed = remove_service(&once, config, Some(&facebook_entry()));
        assert_eq!(removed.plist, PLIST);
    }

    #[test]
    fn test_scalar_update_in_place() {
        let catalog = Catalog::builtin().unwrap();
        let config = catalog.service("facebook").unwrap();
        let docs = IosDocuments {
            plist: PLIST.to_string(),
            ..Default::default()
        };
        let first = add_service(&docs, config, &facebook_entry());
        let second = add_service(&first, config, &facebook_entry().with_value("appId", "456"));
        assert_eq!(plist_value(&second.plist, "FacebookAppID").as_deref(), Some("456"));
        assert_eq!(second.plist.matches("<key>FacebookAppID</key>").count(), 1);
        assert_eq!(url_schemes(&second.plist), vec!["fb456"]);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a.com, b.com;c.com\n d.com"), vec!["a.com", "b.com", "c.com", "d.com"]);
    }
}
