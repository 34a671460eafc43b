//! Text-region location for semi-structured documents
//!
//! Every editor in this crate works on raw strings. Instead of building a tree,
//! they ask this module for the byte range of one logical element (an XML tag,
//! a bracketed array) and splice around it, so everything outside the range is
//! left exactly as the developer wrote it.

use once_cell::sync::Lazy;
use quick_xml::escape::{escape, unescape};
use regex::Regex;
use std::ops::Range;

static BLANK_LINE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n(?:[ \t]*\r?\n){2,}").expect("Invalid blank line regex"));

/// Find the full `[start, end)` range of a `<tag …>` element identified by an
/// attribute value.
///
/// Candidates are visited in document order and the first structurally valid
/// one wins. A candidate is valid when the nearest `<` before the attribute
/// opens `tag` itself and the element closes at depth zero.
pub fn find_element_bounds(
    content: &str,
    tag: &str,
    attr_name: &str,
    attr_value: &str,
) -> Option<Range<usize>> {
    let pattern = format!(
        r#"{}\s*=\s*"{}""#,
        regex::escape(attr_name),
        regex::escape(attr_value)
    );
    let attr_regex = Regex::new(&pattern).ok()?;

    for m in attr_regex.find_iter(content) {
        // The attribute name must not be the tail of a longer one (`xandroid:name`)
        if m.start() > 0 {
            let prev = content.as_bytes()[m.start() - 1];
            if !prev.is_ascii_whitespace() {
                continue;
            }
        }

        let Some(start) = owning_tag_start(content, m.start(), tag) else {
            continue;
        };
        if let Some(end) = element_end(content, start, tag) {
            return Some(start..end);
        }
    }

    None
}

/// Find the first `<tag` element at or after `from`, returning its full range.
pub fn find_first_element(content: &str, tag: &str, from: usize) -> Option<Range<usize>> {
    let start = find_open_tag(content, tag, from)?;
    let end = element_end(content, start, tag)?;
    Some(start..end)
}

/// Walk backwards from `pos` to the nearest `<` and accept it only if it opens `tag`.
fn owning_tag_start(content: &str, pos: usize, tag: &str) -> Option<usize> {
    let before = &content[..pos];
    let lt = before.rfind('<')?;

    // A `>` in between means the attribute text sits in element content
    if before[lt..].contains('>') {
        return None;
    }

    if opens_tag_at(content, lt, tag) {
        Some(lt)
    } else {
        None
    }
}

/// True when `<tag` starts at `pos` and the next byte ends the tag name.
pub fn opens_tag_at(content: &str, pos: usize, tag: &str) -> bool {
    let rest = &content[pos..];
    if !rest.starts_with('<') || !rest[1..].starts_with(tag) {
        return false;
    }
    match rest.as_bytes().get(1 + tag.len()) {
        Some(b) => b.is_ascii_whitespace() || *b == b'>' || *b == b'/',
        None => false,
    }
}

/// Byte index of the first `<tag` open tag at or after `from`.
pub fn find_open_tag(content: &str, tag: &str, from: usize) -> Option<usize> {
    let needle = format!("<{}", tag);
    let mut search = from;
    while let Some(offset) = content.get(search..)?.find(&needle) {
        let pos = search + offset;
        if opens_tag_at(content, pos, tag) {
            return Some(pos);
        }
        search = pos + needle.len();
    }
    None
}

/// Index one past the `>` that closes the open tag starting at `start`.
/// Quoted attribute values may contain `>`.
pub fn open_tag_end(content: &str, start: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = start + 1;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i + 1),
            None => {}
        }
        i += 1;
    }

    None
}

fn is_self_closing(content: &str, tag_end: usize) -> bool {
    content[..tag_end - 1].trim_end().ends_with('/')
}

/// End of the element whose open tag starts at `start`: past `/>` for a
/// self-closing tag, otherwise past the `</tag>` that brings depth to zero.
pub fn element_end(content: &str, start: usize, tag: &str) -> Option<usize> {
    let open_end = open_tag_end(content, start)?;
    if is_self_closing(content, open_end) {
        return Some(open_end);
    }

    let open_needle = format!("<{}", tag);
    let close_needle = format!("</{}", tag);
    let mut depth = 1usize;
    let mut i = open_end;

    while i < content.len() {
        let rest = &content[i..];
        let next_open = rest.find(&open_needle);
        let next_close = rest.find(&close_needle);

        match (next_open, next_close) {
            (Some(o), Some(c)) if o < c => {
                let pos = i + o;
                if opens_tag_at(content, pos, tag) {
                    let nested_end = open_tag_end(content, pos)?;
                    if !is_self_closing(content, nested_end) {
                        depth += 1;
                    }
                    i = nested_end;
                } else {
                    i = pos + open_needle.len();
                }
            }
            (_, Some(c)) => {
                let pos = i + c;
                let after = pos + close_needle.len();
                let close_rest = &content[after..];
                let trimmed = close_rest.trim_start();
                if !trimmed.starts_with('>') {
                    // `</tagname-suffix>` belongs to some other element
                    i = after;
                    continue;
                }
                let close_end = after + (close_rest.len() - trimmed.len()) + 1;
                depth -= 1;
                if depth == 0 {
                    return Some(close_end);
                }
                i = close_end;
            }
            _ => return None,
        }
    }

    None
}

/// Given the index of an opening `[`, return the index of its matching `]`.
///
/// Brackets inside single- or double-quoted strings do not count, and a
/// backslash escapes the next character inside a string.
pub fn find_matching_bracket(content: &str, open: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    if bytes.get(open) != Some(&b'[') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else {
            match b {
                b'\'' | b'"' => quote = Some(b),
                b'[' => depth += 1,
                b']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }

    None
}

/// Widen `range` to swallow the indentation before it and one line break
/// after it, when the element sits on its own line(s).
pub fn expand_to_lines(content: &str, range: Range<usize>) -> Range<usize> {
    let line_start = content[..range.start]
        .rfind('\n')
        .map(|i| i + 1)
        .unwrap_or(0);
    let leading = &content[line_start..range.start];

    if !leading.chars().all(|c| c == ' ' || c == '\t') {
        return range;
    }

    let mut end = range.end;
    let trailing = &content[end..];
    let spaces = trailing.len() - trailing.trim_start_matches([' ', '\t']).len();
    let after_spaces = &trailing[spaces..];
    if after_spaces.starts_with("\r\n") {
        end += spaces + 2;
    } else if after_spaces.starts_with('\n') {
        end += spaces + 1;
    } else if after_spaces.is_empty() {
        end += spaces;
    } else {
        return range;
    }

    line_start..end
}

/// Remove an element together with its own line(s).
pub fn remove_element(content: &str, range: Range<usize>) -> String {
    let range = expand_to_lines(content, range);
    let mut out = String::with_capacity(content.len());
    out.push_str(&content[..range.start]);
    out.push_str(&content[range.end..]);
    out
}

/// Replace `range` of `content` with `replacement`.
pub fn splice(content: &str, range: Range<usize>, replacement: &str) -> String {
    let mut out = String::with_capacity(content.len() + replacement.len());
    out.push_str(&content[..range.start]);
    out.push_str(replacement);
    out.push_str(&content[range.end..]);
    out
}

/// Collapse runs of three or more line breaks (blank lines may hold
/// whitespace) down to exactly one blank line.
pub fn collapse_blank_lines(content: &str) -> String {
    BLANK_LINE_RUN.replace_all(content, "\n\n").into_owned()
}

/// Leading whitespace of the line containing `pos`.
pub fn line_indent(content: &str, pos: usize) -> &str {
    let line_start = content[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line = &content[line_start..];
    let width = line.len() - line.trim_start_matches([' ', '\t']).len();
    &line[..width]
}

/// Byte ranges of every `<!-- … -->` comment. An unterminated comment runs
/// to the end of the document.
pub fn comment_ranges(content: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut from = 0;
    while let Some(offset) = content[from..].find("<!--") {
        let start = from + offset;
        let end = content[start + 4..]
            .find("-->")
            .map(|i| start + 4 + i + 3)
            .unwrap_or(content.len());
        ranges.push(start..end);
        from = end;
    }
    ranges
}

/// Whether `pos` falls inside one of `comments`.
pub fn in_comment(comments: &[Range<usize>], pos: usize) -> bool {
    comments.iter().any(|r| r.contains(&pos))
}

/// Escape text for use inside an XML attribute or text node.
pub fn escape_xml(value: &str) -> String {
    escape(value).into_owned()
}

/// Resolve entity and character references. Text that is not valid escaped
/// XML is returned as it was.
pub fn unescape_xml(value: &str) -> String {
    match unescape(value) {
        Ok(text) => text.into_owned(),
        Err(_) => value.to_string(),
    }
}
