//! Cosmetic reformatting for the markup and style buffers.
//!
//! Only whitespace between tokens is touched. Text inside raw-text elements,
//! comments, string literals and parenthesized values is copied verbatim, so
//! what runs in the preview is the same before and after. Scripts are left
//! alone.

use crate::buffers::Tab;
use crate::error::FormatError;

const INDENT: &str = "    ";

/// Elements whose content must be copied byte for byte.
const RAW_TEXT_ELEMENTS: &[&str] = &["pre", "script", "style", "textarea"];

/// Reformat `source` as the language of `tab`.
///
/// Returns `Ok(None)` when the tab has no formatter.
pub fn format_source(tab: Tab, source: &str) -> Result<Option<String>, FormatError> {
    match tab {
        Tab::Markup => format_markup(source).map(Some),
        Tab::Style => format_style(source).map(Some),
        Tab::Script => Ok(None),
    }
}

/// Put adjacent tags on their own lines and drop blank lines between tags.
pub fn format_markup(source: &str) -> Result<String, FormatError> {
    let lower = source.to_ascii_lowercase();
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len() + source.len() / 8);
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'<' && starts_tag(bytes, i) {
            if lower[i..].starts_with("<!--") {
                let end = lower[i..]
                    .find("-->")
                    .map(|off| i + off + 3)
                    .ok_or(FormatError::Unterminated("comment", i))?;
                out.push_str(&source[i..end]);
                i = end;
                continue;
            }

            let end = tag_end(bytes, i).ok_or(FormatError::Unterminated("tag", i))?;
            let tag = &source[i..end];
            out.push_str(tag);
            i = end;

            if let Some(name) = raw_text_opening(tag) {
                let closing = format!("</{}", name);
                let close_at = lower[i..]
                    .find(&closing)
                    .map(|off| i + off)
                    .ok_or(FormatError::Unterminated("raw text element", i))?;
                out.push_str(&source[i..close_at]);
                i = close_at;
            } else if i < bytes.len() && bytes[i] == b'<' && starts_tag(bytes, i) {
                out.push('\n');
            }
            continue;
        }

        let first = source[i..].chars().next().map_or(1, char::len_utf8);
        let next = source[i + first..]
            .find('<')
            .map(|off| i + first + off)
            .unwrap_or(bytes.len());
        let text = &source[i..next];
        out.push_str(&collapse_blank_lines(text));
        i = next;
    }

    Ok(out)
}

/// Byte index just past the `>` closing the tag at `start`. A `>` inside a
/// quoted attribute value does not close the tag.
fn tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        match (quote, b) {
            (Some(q), b) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return Some(start + offset + 1),
            (None, _) => {}
        }
    }
    None
}

/// `<` followed by something that can begin a tag, comment or declaration.
fn starts_tag(bytes: &[u8], at: usize) -> bool {
    matches!(bytes.get(at + 1), Some(b) if b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'))
}

/// Name of the raw-text element `tag` opens, if any.
fn raw_text_opening(tag: &str) -> Option<&'static str> {
    if tag.starts_with("</") || tag.ends_with("/>") {
        return None;
    }
    let name: String = tag[1..]
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();
    RAW_TEXT_ELEMENTS.iter().copied().find(|raw| *raw == name)
}

/// Whitespace-only text spanning several lines becomes a single line break,
/// keeping the indentation of the last line.
fn collapse_blank_lines(text: &str) -> String {
    if !text.trim().is_empty() || !text.contains('\n') {
        return text.to_string();
    }
    let indent = text.rsplit('\n').next().unwrap_or("");
    format!("\n{}", indent)
}

/// One declaration per line, blocks indented by nesting depth.
pub fn format_style(source: &str) -> Result<String, FormatError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut out = String::with_capacity(source.len() + source.len() / 4);
    let mut depth = 0usize;
    let mut open_at: Vec<usize> = Vec::new();
    let mut parens: Vec<usize> = Vec::new();
    let mut pending_indent = false;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];

        match c {
            '"' | '\'' => {
                flush_indent(&mut out, &mut pending_indent, depth);
                let end = string_end(&chars, i).ok_or(FormatError::Unterminated("string", pos))?;
                out.push_str(&source[pos..byte_after(&chars, end, source.len())]);
                i = end + 1;
                continue;
            }
            '/' if matches!(chars.get(i + 1), Some((_, '*'))) => {
                flush_indent(&mut out, &mut pending_indent, depth);
                let close = source[pos + 2..]
                    .find("*/")
                    .map(|off| pos + 2 + off + 2)
                    .ok_or(FormatError::Unterminated("comment", pos))?;
                out.push_str(&source[pos..close]);
                while i < chars.len() && chars[i].0 < close {
                    i += 1;
                }
                continue;
            }
            '\\' => {
                // An escape keeps the next character out of the layout rules
                flush_indent(&mut out, &mut pending_indent, depth);
                out.push_str(&source[pos..byte_after(&chars, i + 1, source.len())]);
                i += 2;
                continue;
            }
            '(' => {
                flush_indent(&mut out, &mut pending_indent, depth);
                parens.push(pos);
                out.push(c);
            }
            ')' => {
                if parens.pop().is_none() {
                    return Err(FormatError::Unbalanced(')', pos));
                }
                out.push(c);
            }
            ';' if parens.is_empty() => {
                trim_trailing_spaces(&mut out);
                out.push_str(";\n");
                pending_indent = true;
                i = skip_whitespace(&chars, i + 1);
                continue;
            }
            '{' if parens.is_empty() => {
                trim_trailing_whitespace(&mut out);
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push(' ');
                }
                out.push_str("{\n");
                depth += 1;
                open_at.push(pos);
                pending_indent = true;
                i = skip_whitespace(&chars, i + 1);
                continue;
            }
            '}' if parens.is_empty() => {
                if depth == 0 {
                    return Err(FormatError::Unbalanced('}', pos));
                }
                depth -= 1;
                open_at.pop();
                trim_trailing_whitespace(&mut out);
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&INDENT.repeat(depth));
                out.push_str("}\n");
                pending_indent = true;
                i = skip_whitespace(&chars, i + 1);
                continue;
            }
            c if c.is_whitespace() && pending_indent => {}
            _ => {
                flush_indent(&mut out, &mut pending_indent, depth);
                out.push(c);
            }
        }
        i += 1;
    }

    if let Some(pos) = open_at.pop() {
        return Err(FormatError::Unbalanced('{', pos));
    }
    if let Some(pos) = parens.pop() {
        return Err(FormatError::Unbalanced('(', pos));
    }

    trim_trailing_whitespace(&mut out);
    Ok(out)
}

fn flush_indent(out: &mut String, pending: &mut bool, depth: usize) {
    if *pending {
        out.push_str(&INDENT.repeat(depth));
        *pending = false;
    }
}

/// Index of the closing quote for the string opening at `start`.
fn string_end(chars: &[(usize, char)], start: usize) -> Option<usize> {
    let quote = chars[start].1;
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i].1 {
            '\\' => i += 2,
            c if c == quote => return Some(i),
            '\n' => return None,
            _ => i += 1,
        }
    }
    None
}

fn byte_after(chars: &[(usize, char)], index: usize, len: usize) -> usize {
    chars.get(index + 1).map(|(pos, _)| *pos).unwrap_or(len)
}

fn skip_whitespace(chars: &[(usize, char)], mut i: usize) -> usize {
    while i < chars.len() && chars[i].1.is_whitespace() {
        i += 1;
    }
    i
}

fn trim_trailing_spaces(out: &mut String) {
    let kept = out.trim_end_matches([' ', '\t']).len();
    out.truncate(kept);
}

fn trim_trailing_whitespace(out: &mut String) {
    let kept = out.trim_end().len();
    out.truncate(kept);
}
