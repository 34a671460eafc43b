//! `GCC_PREPROCESSOR_DEFINITIONS` maintenance in the Podfile.
//!
//! Permission plugins compile each permission in only when its macro is
//! defined, so the Podfile array must list exactly the macros of the
//! selected plist permissions.

use crate::catalog::PermissionCatalog;
use crate::locator::{find_matching_bracket, line_indent, splice};
use crate::model::PermissionEntry;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

const DEFINITIONS_ACCESSOR: &str = "config.build_settings['GCC_PREPROCESSOR_DEFINITIONS']";
const CONFIG_LOOP: &str = "target.build_configurations.each do |config|";
const TARGET_LOOP: &str = "installer.pods_project.targets.each do |target|";
const POST_INSTALL: &str = "post_install do |installer|";
const STEP: &str = "  ";

#[derive(Error, Debug)]
pub enum PodfileError {
    #[error("Unbalanced GCC_PREPROCESSOR_DEFINITIONS array at byte {0}")]
    UnbalancedArray(usize),
}

/// Distinct macros implied by the requested permissions, sorted.
///
/// A macro attached to the entry wins over the catalog's.
pub fn required_macros(entries: &[PermissionEntry], catalog: &PermissionCatalog) -> BTreeSet<String> {
    entries
        .iter()
        .filter_map(|e| {
            e.macro_name
                .as_deref()
                .or_else(|| catalog.macro_for(&e.key))
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
        })
        .collect()
}

/// Make the definitions array hold `$(inherited)` plus `NAME=1` for each
/// macro. No macros means no change.
pub fn patch_podfile(content: &str, macros: &BTreeSet<String>) -> Result<String, PodfileError> {
    if macros.is_empty() {
        return Ok(content.to_string());
    }

    if let Some(accessor) = content.find(DEFINITIONS_ACCESSOR) {
        let after = accessor + DEFINITIONS_ACCESSOR.len();
        if let Some(open) = content[after..].find('[').map(|i| after + i) {
            let operator = content[after..open].trim();
            if operator == "=" || operator == "||=" {
                let close = find_matching_bracket(content, open).ok_or(PodfileError::UnbalancedArray(open))?;
                let indent = line_indent(content, accessor);
                let array = render_array(macros, indent);
                debug!("Replacing existing preprocessor definitions");
                return Ok(splice(content, open..close + 1, &array));
            }
        }
    }

    if let Some(block) = line_after(content, CONFIG_LOOP) {
        let indent = format!("{}{}", line_indent(content, block.anchor), STEP);
        debug!("Adding preprocessor definitions to the build configuration loop");
        return Ok(insert_at(content, block.line_end, &render_assignment(macros, &indent)));
    }

    if let Some(block) = line_after(content, TARGET_LOOP) {
        let indent = format!("{}{}", line_indent(content, block.anchor), STEP);
        debug!("Adding build configuration loop to the target loop");
        return Ok(insert_at(content, block.line_end, &render_config_loop(macros, &indent)));
    }

    if let Some(block) = line_after(content, POST_INSTALL) {
        let indent = format!("{}{}", line_indent(content, block.anchor), STEP);
        debug!("Adding target loop to post_install");
        return Ok(insert_at(content, block.line_end, &render_target_loop(macros, &indent)));
    }

    debug!("No post_install hook found, appending one");
    let hook = format!("{}\n{}\nend\n", POST_INSTALL, render_target_loop(macros, STEP));
    let head = content.trim_end();
    if head.is_empty() {
        Ok(hook)
    } else {
        Ok(format!("{}\n\n{}", head, hook))
    }
}

struct AnchorLine {
    anchor: usize,
    line_end: usize,
}

fn line_after(content: &str, needle: &str) -> Option<AnchorLine> {
    let anchor = content.find(needle)?;
    let from = anchor + needle.len();
    let line_end = content[from..].find('\n').map(|i| from + i).unwrap_or(content.len());
    Some(AnchorLine { anchor, line_end })
}

fn insert_at(content: &str, pos: usize, block: &str) -> String {
    let mut out = String::with_capacity(content.len() + block.len() + 1);
    out.push_str(&content[..pos]);
    out.push('\n');
    out.push_str(block);
    out.push_str(&content[pos..]);
    out
}

fn render_array(macros: &BTreeSet<String>, indent: &str) -> String {
    let mut out = String::from("[\n");
    out.push_str(&format!("{}{}'$(inherited)',\n", indent, STEP));
    for name in macros {
        out.push_str(&format!("{}{}'{}=1',\n", indent, STEP, name));
    }
    out.push_str(indent);
    out.push(']');
    out
}

fn render_assignment(macros: &BTreeSet<String>, indent: &str) -> String {
    format!("{}{} ||= {}", indent, DEFINITIONS_ACCESSOR, render_array(macros, indent))
}

fn render_config_loop(macros: &BTreeSet<String>, indent: &str) -> String {
    let inner = format!("{}{}", indent, STEP);
    format!(
        "{}{}\n{}\n{}end",
        indent,
        CONFIG_LOOP,
        render_assignment(macros, &inner),
        indent
    )
}

fn render_target_loop(macros: &BTreeSet<String>, indent: &str) -> String {
    let inner = format!("{}{}", indent, STEP);
    format!(
        "{}{}\n{}\n{}end",
        indent,
        TARGET_LOOP,
        render_config_loop(macros, &inner),
        indent
    )
}
