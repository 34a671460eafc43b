//! Import statements and initialisation snippets in `AppDelegate.swift`.
//!
//! A snippet template such as `GMSServices.provideAPIKey("{apiKey}")` is
//! turned into a pattern where each placeholder becomes a wildcard. That
//! pattern finds a previously inserted copy regardless of the value it was
//! written with, for replacement, removal and extraction alike.

use crate::catalog::{fill_placeholders, placeholder_pattern};
use crate::locator::{expand_to_lines, line_indent, splice};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

static IMPORT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*(?:@testable[ \t]+)?import[ \t]+[\w.]+[ \t]*$").expect("Invalid import regex"));

static PLUGIN_REGISTRANT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"GeneratedPluginRegistrant\.register\(\s*with:\s*self\s*\)").expect("Invalid registrant regex")
});

static LAUNCH_CALLBACK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"func\s+application\s*\([^{]*didFinishLaunchingWithOptions[^{]*\{").expect("Invalid launch callback regex")
});

const INDENT: &str = "    ";

/// Pattern for a snippet template. With `named`, the first occurrence of each
/// placeholder becomes a capture group named after its field.
///
/// A template made only of placeholders could match anywhere, even the empty
/// string, so it yields no pattern.
pub fn template_pattern(template: &str, named: bool) -> Option<Regex> {
    let literal = fill_placeholders(template, |_| Some(String::new()));
    if literal.trim().is_empty() {
        debug!("Snippet template {:?} has no literal text", template);
        return None;
    }
    Regex::new(&placeholder_pattern(template, named)).ok()
}

/// Add `import` (if any) and the filled `code`, replacing an earlier copy of
/// the same template in place.
pub fn add_snippet(source: &str, import: Option<&str>, template: &str, code: &str) -> String {
    let mut out = match import {
        Some(import) => add_import(source, import),
        None => source.to_string(),
    };

    let Some(pattern) = template_pattern(template, false) else {
        return out;
    };

    if let Some(existing) = pattern.find(&out) {
        if existing.as_str() != code {
            out = splice(&out, existing.range(), code);
        }
        return out;
    }

    if let Some(anchor) = PLUGIN_REGISTRANT.find(&out) {
        let indent = line_indent(&out, anchor.start()).to_string();
        let line_end = out[anchor.end()..]
            .find('\n')
            .map(|i| anchor.end() + i)
            .unwrap_or(out.len());
        out.insert_str(line_end, &format!("\n{}{}", indent, code));
        return out;
    }

    if let Some(callback) = LAUNCH_CALLBACK.find(&out) {
        let indent = format!("{}{}", line_indent(&out, callback.start()), INDENT);
        out.insert_str(callback.end(), &format!("\n{}{}", indent, code));
        return out;
    }

    debug!("No insertion anchor found in app delegate for {}", template);
    out
}

/// Remove every copy of the template; the import goes too unless the rest of
/// the file still refers to it.
pub fn remove_snippet(source: &str, import: Option<&str>, template: &str) -> String {
    let mut out = source.to_string();

    if let Some(pattern) = template_pattern(template, false) {
        while let Some(found) = pattern.find(&out) {
            let range = expand_to_lines(&out, found.range());
            out = splice(&out, range, "");
        }
    }

    if let Some(import) = import {
        if !still_referenced(&out, import, template) {
            out = remove_import(&out, import);
        }
    }

    out
}

/// Field values recovered from the first copy of the template, or `None`
/// when the template does not appear at all.
pub fn extract_snippet(source: &str, template: &str) -> Option<HashMap<String, String>> {
    let pattern = template_pattern(template, true)?;
    let caps = pattern.captures(source)?;
    let values = pattern
        .capture_names()
        .flatten()
        .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
        .collect();
    Some(values)
}

fn add_import(source: &str, import: &str) -> String {
    let import = import.trim();
    if source.lines().any(|l| l.trim() == import) {
        return source.to_string();
    }

    match IMPORT_LINE.find_iter(source).last() {
        Some(last) => {
            let mut out = source.to_string();
            out.insert_str(last.end(), &format!("\n{}", import));
            out
        }
        None => format!("{}\n{}", import, source),
    }
}

fn remove_import(source: &str, import: &str) -> String {
    let import = import.trim();
    let mut out = source.to_string();
    while let Some(pos) = find_line(&out, import) {
        let range = expand_to_lines(&out, pos..pos + import.len());
        out = splice(&out, range, "");
    }
    out
}

fn find_line(source: &str, line: &str) -> Option<usize> {
    let mut offset = 0;
    for l in source.split_inclusive('\n') {
        if l.trim() == line {
            return Some(offset + (l.len() - l.trim_start().len()));
        }
        offset += l.len();
    }
    None
}

/// True when code outside import lines names the imported module or the
/// symbol the snippet starts with.
fn still_referenced(source: &str, import: &str, template: &str) -> bool {
    let module = import
        .trim()
        .trim_start_matches("import")
        .trim()
        .to_string();
    let symbol: String = template
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();

    let body: String = source
        .lines()
        .filter(|l| !IMPORT_LINE.is_match(l))
        .collect::<Vec<_>>()
        .join("\n");

    [module, symbol]
        .iter()
        .filter(|token| !token.is_empty())
        .any(|token| body.contains(token.as_str()))
}
