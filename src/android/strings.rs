//! `res/values/strings.xml` edits for `@string/` indirections.

use crate::locator::{escape_xml, find_element_bounds, line_indent, remove_element, splice};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use tracing::debug;

/// Skeleton used when the project has no strings.xml yet
pub const EMPTY_RESOURCES: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<resources>\n</resources>\n";

/// Set `<string name="name">` to `value`, adding it before `</resources>` if missing.
pub fn upsert_string_resource(content: &str, name: &str, value: &str) -> String {
    let escaped = escape_xml(value);

    if let Some(range) = find_element_bounds(content, "string", "name", name) {
        let element = &content[range.clone()];
        let replacement = match (element.find('>'), element.rfind("</")) {
            (Some(gt), Some(close)) if gt < close && !element[..gt].ends_with('/') => {
                format!("{}{}{}", &element[..=gt], escaped, &element[close..])
            }
            _ => format!("<string name=\"{}\">{}</string>", name, escaped),
        };
        return splice(content, range, &replacement);
    }

    let Some(close) = content.rfind("</resources>") else {
        debug!("No </resources> tag found, leaving strings unchanged");
        return content.to_string();
    };

    let indent = child_indent(content);
    let head = content[..close].trim_end();
    format!(
        "{}\n{}<string name=\"{}\">{}</string>\n{}",
        head,
        indent,
        name,
        escaped,
        &content[close..]
    )
}

/// Delete `<string name="name">` if present.
pub fn remove_string_resource(content: &str, name: &str) -> String {
    match find_element_bounds(content, "string", "name", name) {
        Some(range) => remove_element(content, range),
        None => content.to_string(),
    }
}

/// All `<string>` resources, name -> text.
pub fn string_resources(content: &str) -> HashMap<String, String> {
    let mut strings = HashMap::new();
    let mut reader = Reader::from_str(content);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"string" => {
                current = e
                    .attributes()
                    .filter_map(|a| a.ok())
                    .find(|a| a.key.as_ref() == b"name")
                    .map(|a| String::from_utf8_lossy(&a.value).to_string());
                text.clear();
            }
            Ok(Event::Text(ref e)) if current.is_some() => {
                if let Ok(t) = e.unescape() {
                    text.push_str(&t);
                }
            }
            Ok(Event::CData(ref e)) if current.is_some() => {
                text.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"string" => {
                if let Some(name) = current.take() {
                    strings.insert(name, text.clone());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!("Error parsing string resources: {:?}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    strings
}

/// Resolve `@string/name` through `strings`; other values pass through.
pub fn resolve_reference(value: &str, strings: Option<&HashMap<String, String>>) -> Option<String> {
    match value.strip_prefix("@string/") {
        Some(name) => strings.and_then(|s| s.get(name)).cloned(),
        None => Some(value.to_string()),
    }
}

fn child_indent(content: &str) -> String {
    content
        .find("<string")
        .map(|pos| line_indent(content, pos).to_string())
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| "    ".to_string())
}
