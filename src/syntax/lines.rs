//! Logical-line splitting.
//!
//! The pest grammar parses one logical line at a time; block structure comes from
//! indentation, which this module measures. A logical line ends at a newline outside of
//! brackets and strings. Bracketed newlines, triple-quoted strings and backslash
//! continuations are kept inside the line text so the grammar can skip them as whitespace
//! and the parser can still compute exact locations.
//!
//! Comments are dropped here. Blank and comment-only lines produce nothing.

use crate::{err_at, ast::Loc, TrellisError};

/// One logical source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// 1-based physical line the logical line starts on.
    pub line: u32,
    /// Number of leading whitespace characters; tabs count as one column.
    pub indent: usize,
    /// Line text after the indentation, comments removed.
    pub text: String,
}

impl LogicalLine {
    /// Location of byte `offset` inside `text`.
    pub fn loc_at(&self, offset: usize) -> Loc {
        let before = &self.text[..offset.min(self.text.len())];
        match before.rfind('\n') {
            Some(nl) => {
                let extra = before.matches('\n').count() as u32;
                Loc::new(self.line + extra, (offset - nl - 1) as u32)
            }
            None => Loc::new(self.line, (self.indent + offset) as u32),
        }
    }

    pub fn start(&self) -> Loc {
        Loc::new(self.line, self.indent as u32)
    }
}

/// Splits `source` into logical lines.
pub fn split_logical_lines(source: &str, filename: &str) -> Result<Vec<LogicalLine>, TrellisError> {
    let normalized = source.replace("\r\n", "\n");
    let chars: Vec<char> = normalized.chars().collect();
    let len = chars.len();
    let mut out = Vec::new();
    let mut i = 0;
    let mut line_no: u32 = 1;

    while i < len {
        let mut indent = 0;
        while i < len && matches!(chars[i], ' ' | '\t') {
            indent += 1;
            i += 1;
        }
        if i >= len {
            break;
        }
        match chars[i] {
            '\n' => {
                i += 1;
                line_no += 1;
                continue;
            }
            '#' => {
                while i < len && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            _ => {}
        }

        let start_line = line_no;
        let mut text = String::new();
        let mut depth: i32 = 0;
        let mut quote: Option<(char, bool)> = None;

        while i < len {
            let c = chars[i];

            if let Some((q, triple)) = quote {
                if c == '\\' && i + 1 < len {
                    text.push(c);
                    text.push(chars[i + 1]);
                    if chars[i + 1] == '\n' {
                        line_no += 1;
                    }
                    i += 2;
                    continue;
                }
                if c == '\n' {
                    if !triple {
                        return Err(err_at!(
                            Parse,
                            filename,
                            Some(Loc::new(line_no, 0)),
                            "unterminated string literal"
                        ));
                    }
                    line_no += 1;
                }
                if c == q && (!triple || closes_triple(&chars, i, q)) {
                    let width = if triple { 3 } else { 1 };
                    for _ in 0..width {
                        text.push(q);
                    }
                    i += width;
                    quote = None;
                    continue;
                }
                text.push(c);
                i += 1;
                continue;
            }

            match c {
                '"' | '\'' => {
                    let triple = closes_triple(&chars, i, c);
                    let width = if triple { 3 } else { 1 };
                    for _ in 0..width {
                        text.push(c);
                    }
                    quote = Some((c, triple));
                    i += width;
                }
                '#' => {
                    while i < len && chars[i] != '\n' {
                        i += 1;
                    }
                }
                '\\' if i + 1 < len && chars[i + 1] == '\n' => {
                    text.push_str("\\\n");
                    line_no += 1;
                    i += 2;
                }
                '\n' => {
                    i += 1;
                    line_no += 1;
                    if depth > 0 {
                        text.push('\n');
                    } else {
                        break;
                    }
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    text.push(c);
                    i += 1;
                }
                ')' | ']' | '}' => {
                    depth -= 1;
                    text.push(c);
                    i += 1;
                }
                _ => {
                    text.push(c);
                    i += 1;
                }
            }
        }

        if quote.is_some() {
            return Err(err_at!(
                Parse,
                filename,
                Some(Loc::new(start_line, indent as u32)),
                "unterminated string literal"
            ));
        }

        let text = text.trim_end().to_string();
        if !text.is_empty() {
            out.push(LogicalLine {
                line: start_line,
                indent,
                text,
            });
        }
    }

    Ok(out)
}

fn closes_triple(chars: &[char], i: usize, q: char) -> bool {
    i + 2 < chars.len() && chars[i + 1] == q && chars[i + 2] == q
}
