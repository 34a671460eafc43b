//! Catalog-driven service fragments in AndroidManifest.xml.
//!
//! Each service contributes `<meta-data>` entries, package-visibility
//! `<queries>` children and arbitrary application elements. Adding is
//! idempotent (existing fragments are updated or skipped) and removal only
//! touches fragments the service itself declares.

use super::strings::{remove_string_resource, upsert_string_resource};
use crate::catalog::{placeholder_pattern, placeholders, ElementTemplate, MetaDataSpec, ServiceConfig};
use crate::locator::{
    collapse_blank_lines, escape_xml, expand_to_lines, find_element_bounds, find_first_element,
    find_open_tag, line_indent, open_tag_end, remove_element, splice,
};
use crate::model::ServiceEntry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

static EMPTY_QUERIES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[ \t]*<queries>\s*</queries>[ \t]*(?:\r?\n)?").expect("Invalid empty queries regex")
});

static VALUE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"android:value\s*=\s*"[^"]*""#).expect("Invalid android:value regex")
});

/// Documents touched by an Android service edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidDocuments {
    pub manifest: String,

    /// `res/values/strings.xml`, when the project has one
    pub strings: Option<String>,
}

/// Apply every Android fragment `config` declares, using `entry` for values.
pub fn add_service(docs: &AndroidDocuments, config: &ServiceConfig, entry: &ServiceEntry, indent: &str) -> AndroidDocuments {
    let Some(android) = &config.android else {
        return docs.clone();
    };

    let mut manifest = docs.manifest.clone();
    let mut strings = docs.strings.clone();

    for spec in &android.meta_data {
        let Some(raw) = meta_data_raw_value(spec, config, entry) else {
            debug!("Skipping meta-data {} without a value", spec.name);
            continue;
        };

        // Without a strings.xml the value is written inline
        let value = match (&spec.string_resource, strings.as_deref()) {
            (Some(resource), Some(doc)) => {
                strings = Some(upsert_string_resource(doc, resource, &raw));
                format!("@string/{}", resource)
            }
            _ => format!("{}{}", spec.prefix.as_deref().unwrap_or(""), raw),
        };
        manifest = upsert_meta_data(&manifest, &spec.name, &value, indent);
    }

    for spec in &android.string_resources {
        if let (Some(doc), Some(value)) = (strings.as_deref(), config.resolve(entry, &spec.value_field)) {
            strings = Some(upsert_string_resource(doc, &spec.name, value));
        }
    }

    for query in &android.queries {
        manifest = add_query(&manifest, query, config, entry, indent);
    }

    for element in &android.application_data {
        manifest = add_application_element(&manifest, element, config, entry, indent);
    }

    AndroidDocuments { manifest, strings }
}

/// Remove every Android fragment `config` declares.
///
/// Templated fragments are matched against `previous` when given, otherwise
/// against any filling of their template.
pub fn remove_service(docs: &AndroidDocuments, config: &ServiceConfig, previous: Option<&ServiceEntry>) -> AndroidDocuments {
    let Some(android) = &config.android else {
        return docs.clone();
    };

    let mut manifest = docs.manifest.clone();
    let mut strings = docs.strings.clone();

    for spec in &android.meta_data {
        manifest = remove_meta_data(&manifest, &spec.name);
        if let (Some(resource), Some(doc)) = (&spec.string_resource, strings.as_deref()) {
            strings = Some(remove_string_resource(doc, resource));
        }
    }

    for spec in &android.string_resources {
        if let Some(doc) = strings.as_deref() {
            strings = Some(remove_string_resource(doc, &spec.name));
        }
    }

    for query in &android.queries {
        manifest = remove_query(&manifest, query, config, previous);
    }

    for element in &android.application_data {
        manifest = remove_application_element(&manifest, element, config, previous);
    }

    AndroidDocuments {
        manifest: cleanup(&manifest),
        strings,
    }
}

/// Drop emptied `<queries>` blocks and normalise blank-line runs.
pub fn cleanup(manifest: &str) -> String {
    let without_empty = EMPTY_QUERIES.replace_all(manifest, "");
    collapse_blank_lines(&without_empty)
}

fn meta_data_raw_value(spec: &MetaDataSpec, config: &ServiceConfig, entry: &ServiceEntry) -> Option<String> {
    spec.value_field
        .as_deref()
        .and_then(|field| config.resolve(entry, field))
        .or(spec.value.as_deref())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Set the `android:value` of `<meta-data android:name="name">`, inserting
/// the tag right after `<application …>` when absent.
pub fn upsert_meta_data(manifest: &str, name: &str, value: &str, indent: &str) -> String {
    let escaped = escape_xml(value);

    if let Some(range) = find_element_bounds(manifest, "meta-data", "android:name", name) {
        let Some(tag_end) = open_tag_end(manifest, range.start) else {
            return manifest.to_string();
        };
        let tag = &manifest[range.start..tag_end];
        let new_value = format!("android:value=\"{}\"", escaped);
        let new_tag = if VALUE_ATTR.is_match(tag) {
            VALUE_ATTR.replace(tag, regex::NoExpand(&new_value)).into_owned()
        } else {
            let name_attr = format!("android:name=\"{}\"", name);
            tag.replacen(&name_attr, &format!("{} {}", name_attr, new_value), 1)
        };
        return splice(manifest, range.start..tag_end, &new_tag);
    }

    let Some(app_start) = find_open_tag(manifest, "application", 0) else {
        debug!("No <application> tag found, cannot add meta-data {}", name);
        return manifest.to_string();
    };
    let Some(app_open_end) = open_tag_end(manifest, app_start) else {
        return manifest.to_string();
    };
    if manifest[..app_open_end - 1].ends_with('/') {
        debug!("<application> is self-closing, cannot add meta-data {}", name);
        return manifest.to_string();
    }

    let child = format!("{}{}", line_indent(manifest, app_start), indent);
    let tag = format!(
        "\n{}<meta-data android:name=\"{}\" android:value=\"{}\" />",
        child,
        escape_xml(name),
        escaped
    );
    let mut out = manifest.to_string();
    out.insert_str(app_open_end, &tag);
    out
}

/// Remove every `<meta-data android:name="name">`.
pub fn remove_meta_data(manifest: &str, name: &str) -> String {
    let mut out = manifest.to_string();
    while let Some(range) = find_element_bounds(&out, "meta-data", "android:name", name) {
        out = remove_element(&out, range);
    }
    out
}

/// Add a `<queries>` child unless its identifying value already appears in
/// the document.
pub fn add_query(manifest: &str, template: &ElementTemplate, config: &ServiceConfig, entry: &ServiceEntry, indent: &str) -> String {
    if let Some((_, value)) = template.identity() {
        let value = config.fill(value, entry);
        if manifest.contains(&value) {
            debug!("Query for {} already present", value);
            return manifest.to_string();
        }
    }

    if let Some(queries) = find_first_element(manifest, "queries", 0) {
        let block = &manifest[queries.clone()];
        let Some(close) = block.rfind("</queries") else {
            return manifest.to_string();
        };
        let base = line_indent(manifest, queries.start).to_string();
        let child = format!("{}{}", base, indent);
        let rendered = render_element(template, config, entry, &child, indent);

        let inner_end = queries.start + close;
        let head = manifest[..inner_end].trim_end_matches([' ', '\t']);
        let separator = if head.ends_with('\n') { "" } else { "\n" };
        return format!(
            "{}{}{}\n{}{}",
            head,
            separator,
            rendered,
            base,
            &manifest[inner_end..]
        );
    }

    let Some(app_start) = find_open_tag(manifest, "application", 0) else {
        debug!("No <application> tag found, cannot add <queries>");
        return manifest.to_string();
    };
    let base = line_indent(manifest, app_start).to_string();
    let rendered = render_element(template, config, entry, &format!("{}{}", base, indent), indent);
    let block = format!("<queries>\n{}\n{}</queries>\n{}", rendered, base, base);
    let mut out = manifest.to_string();
    out.insert_str(app_start, &block);
    out
}

/// Remove every `<queries>` child of the template's tag that carries its
/// identifying attribute, on the child itself or on a descendant.
pub fn remove_query(manifest: &str, template: &ElementTemplate, config: &ServiceConfig, previous: Option<&ServiceEntry>) -> String {
    let Some((attr, value)) = template.identity() else {
        return manifest.to_string();
    };
    let Some(identity) = templated_attribute(attr, value, config, previous) else {
        return manifest.to_string();
    };
    let Some(queries) = find_first_element(manifest, "queries", 0) else {
        return manifest.to_string();
    };

    let mut inner = manifest[queries.clone()].to_string();
    let mut from = 0;
    while let Some(range) = find_first_element(&inner, &template.tag, from) {
        if identity.is_match(&inner[range.clone()]) {
            let range = expand_to_lines(&inner, range);
            from = range.start;
            inner = splice(&inner, range, "");
        } else {
            from = range.end;
        }
    }
    splice(manifest, queries, &inner)
}

/// Insert a templated element before `</application>` unless an element with
/// the same `android:name` exists anywhere.
pub fn add_application_element(manifest: &str, template: &ElementTemplate, config: &ServiceConfig, entry: &ServiceEntry, indent: &str) -> String {
    if let Some(name) = template.attributes.get("android:name") {
        let name = config.fill(name, entry);
        if manifest.contains(&format!("android:name=\"{}\"", name)) {
            debug!("Application element {} already present", name);
            return manifest.to_string();
        }
    }

    let Some(close) = manifest.rfind("</application>") else {
        debug!("No </application> tag found, cannot add {}", template.tag);
        return manifest.to_string();
    };
    let base = line_indent(manifest, close).to_string();
    let rendered = render_element(template, config, entry, &format!("{}{}", base, indent), indent);
    let head = manifest[..close].trim_end();
    format!("{}\n{}\n{}{}", head, rendered, base, &manifest[close..])
}

/// Remove the application element named by the template.
pub fn remove_application_element(manifest: &str, template: &ElementTemplate, config: &ServiceConfig, previous: Option<&ServiceEntry>) -> String {
    match find_application_element(manifest, template, config, previous) {
        Some(range) => remove_element(manifest, range),
        None => manifest.to_string(),
    }
}

/// Range of the element whose `android:name` matches the template's, filled
/// from `entry` or, without one, in any filling.
pub fn find_application_element(manifest: &str, template: &ElementTemplate, config: &ServiceConfig, entry: Option<&ServiceEntry>) -> Option<Range<usize>> {
    let name = template.attributes.get("android:name")?;
    let pattern = templated_attribute("android:name", name, config, entry)?;
    let found = pattern
        .captures_iter(manifest)
        .find_map(|cap| find_element_bounds(manifest, &template.tag, "android:name", &cap[1]));
    found
}

/// Regex for `attr="…"` holding `template` filled from `entry`, or any
/// filling when the entry cannot fill every field. Group 1 is the raw
/// attribute value.
fn templated_attribute(attr: &str, template: &str, config: &ServiceConfig, entry: Option<&ServiceEntry>) -> Option<Regex> {
    let fields = placeholders(template);
    let value = match entry {
        Some(entry) if fields.iter().all(|f| config.resolve(entry, f).is_some()) => {
            regex::escape(&escape_xml(&config.fill(template, entry)))
        }
        _ if fields.is_empty() => regex::escape(&escape_xml(template)),
        _ => placeholder_pattern(template, false),
    };
    let source = format!(r#"(?:^|\s){}\s*=\s*"({})""#, regex::escape(attr), value);
    Regex::new(&source).ok()
}

/// Serialise a template at `level` indentation. A single attribute stays on
/// the tag line; several are placed one per line.
pub fn render_element(template: &ElementTemplate, config: &ServiceConfig, entry: &ServiceEntry, level: &str, indent: &str) -> String {
    let attr_indent = format!("{}{}", level, indent);
    let attrs: Vec<String> = template
        .attributes
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_xml(&config.fill(v, entry))))
        .collect();

    let mut out = format!("{}<{}", level, template.tag);
    match attrs.len() {
        0 => {}
        1 => {
            out.push(' ');
            out.push_str(&attrs[0]);
        }
        _ => {
            for attr in &attrs {
                out.push('\n');
                out.push_str(&attr_indent);
                out.push_str(attr);
            }
        }
    }

    if template.children.is_empty() {
        out.push_str(" />");
        return out;
    }

    out.push('>');
    for child in &template.children {
        out.push('\n');
        out.push_str(&render_element(child, config, entry, &attr_indent, indent));
    }
    out.push('\n');
    out.push_str(level);
    out.push_str(&format!("</{}>", template.tag));
    out
}
