use crate::locator::{
    collapse_blank_lines, comment_ranges, escape_xml, find_first_element, in_comment, unescape_xml,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Namespace every Android permission name lives in
pub const PERMISSION_PREFIX: &str = "android.permission.";

static USES_PERMISSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)[ \t]*<uses-permission(?:\s[^>]*?)?(?:/>|>.*?</uses-permission\s*>)[ \t]*(?:\r?\n)?",
    )
    .expect("Invalid uses-permission regex")
});

static USES_PERMISSION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<uses-permission\s[^>]*?android:name\s*=\s*"([^"]*)""#)
        .expect("Invalid uses-permission name regex")
});

static MANIFEST_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<manifest\b[^>]*>").expect("Invalid manifest regex"));

static PACKAGE_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<manifest\b[^>]*?\spackage\s*=\s*"([^"]*)""#).expect("Invalid package regex")
});

/// Fully qualify, trim and de-duplicate permission names, keeping the first
/// occurrence of each in request order.
pub fn normalize_permission_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(names.len());

    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        let full = if name.starts_with(PERMISSION_PREFIX) {
            name.to_string()
        } else {
            format!("{}{}", PERMISSION_PREFIX, name)
        };
        if !normalized.contains(&full) {
            normalized.push(full);
        }
    }

    normalized
}

/// Replace the manifest's `<uses-permission>` declarations with exactly `requested`.
///
/// Everything else (comments, `<queries>`, the application element) is kept
/// verbatim. Returns the input unchanged when there is no `<manifest>` tag.
pub fn update_manifest<S: AsRef<str>>(content: &str, requested: &[S], indent: &str) -> String {
    let names = normalize_permission_names(requested);

    if MANIFEST_OPEN.find(content).is_none() {
        debug!("No <manifest> tag found, leaving manifest unchanged");
        return content.to_string();
    }

    let queries = find_first_element(content, "queries", 0).map(|r| content[r].to_string());

    let stripped = strip_permissions(content);
    let mut updated = collapse_blank_lines(&stripped);

    let Some(open) = MANIFEST_OPEN.find(&updated) else {
        return content.to_string();
    };
    let insert_at = open.end();

    let block: String = names
        .iter()
        .map(|name| {
            format!(
                "\n{}<uses-permission android:name=\"{}\" />",
                indent,
                escape_xml(name)
            )
        })
        .collect();
    updated.insert_str(insert_at, &block);

    if let Some(queries) = queries {
        if !updated.contains(&queries) {
            debug!("Restoring <queries> block lost during permission sweep");
            updated = restore_before_close(&updated, &queries, indent);
        }
    }

    updated
}

/// Drop every `<uses-permission>` outside comments.
fn strip_permissions(content: &str) -> String {
    let comments = comment_ranges(content);
    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    for m in USES_PERMISSION.find_iter(content) {
        let tag_start = m.start() + m.as_str().find('<').unwrap_or(0);
        if in_comment(&comments, tag_start) {
            continue;
        }
        out.push_str(&content[last..m.start()]);
        last = m.end();
    }
    out.push_str(&content[last..]);
    out
}

fn restore_before_close(content: &str, block: &str, indent: &str) -> String {
    match content.rfind("</manifest>") {
        Some(close) => {
            let mut out = content[..close].trim_end().to_string();
            out.push_str(&format!("\n{}{}\n", indent, block));
            out.push_str(&content[close..]);
            out
        }
        None => format!("{}\n{}", content, block),
    }
}

/// Permission names currently declared, in document order.
pub fn declared_android_permissions(content: &str) -> Vec<String> {
    let comments = comment_ranges(content);
    let mut names = Vec::new();
    for cap in USES_PERMISSION_NAME.captures_iter(content) {
        if cap.get(0).is_some_and(|m| in_comment(&comments, m.start())) {
            continue;
        }
        let name = unescape_xml(&cap[1]);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// The manifest's `package` attribute.
pub fn package_name(content: &str) -> Option<String> {
    PACKAGE_ATTR
        .captures(content)
        .map(|cap| cap[1].to_string())
        .filter(|p| !p.is_empty())
}
