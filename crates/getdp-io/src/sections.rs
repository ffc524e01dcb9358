//! `$Name ... $EndName` section extraction shared by the msh, pre and res readers.
//!
//! Gmsh and GetDP text files are a flat sequence of named sections. Opening
//! markers may carry an annotation after the name, e.g. `$DofData /* #1 */`
//! or `$Resolution /* 'Analysis' */`. Sections are located by a single
//! forward scan over the lines; an opening marker that is never closed is
//! reported as [`IoError::UnterminatedSection`] instead of silently matching
//! nothing.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{IoError, Result};

/// One `$Name ... $EndName` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section<'a> {
    /// Section name without the leading `$`
    pub name: &'a str,
    /// Text following the name on the opening marker line, trimmed
    pub annotation: &'a str,
    /// Raw text between the marker lines
    pub body: &'a str,
    /// 1-based line number of the first body line in the source text
    pub first_line: usize,
}

impl<'a> Section<'a> {
    /// Non-empty trimmed body lines paired with their source line numbers.
    pub fn lines(self) -> impl Iterator<Item = (usize, &'a str)> + 'a {
        let first = self.first_line;
        self.body.lines().enumerate().filter_map(move |(i, raw)| {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then_some((first + i, trimmed))
        })
    }

    pub fn cursor(self) -> LineCursor<'a> {
        LineCursor::new(self)
    }
}

/// First section called `name`, or `None` when the file does not contain one.
pub fn find_section<'a>(text: &'a str, name: &'a str) -> Result<Option<Section<'a>>> {
    Ok(scan(text, name, true)?.into_iter().next())
}

/// Every section called `name`, in file order.
pub fn find_sections<'a>(text: &'a str, name: &'a str) -> Result<Vec<Section<'a>>> {
    scan(text, name, false)
}

fn scan<'a>(text: &'a str, name: &'a str, first_only: bool) -> Result<Vec<Section<'a>>> {
    let end_marker = format!("End{name}");
    let mut found = Vec::new();
    // (body start offset, first body line, annotation)
    let mut open: Option<(usize, usize, &'a str)> = None;
    let mut offset = 0usize;

    for (idx, raw) in text.split_inclusive('\n').enumerate() {
        let line_start = offset;
        offset += raw.len();
        let trimmed = raw.trim();

        match open {
            None => {
                if let Some(annotation) = marker_annotation(trimmed, name) {
                    open = Some((offset, idx + 2, annotation));
                }
            }
            Some((body_start, first_line, annotation)) => {
                if marker_annotation(trimmed, &end_marker).is_some() {
                    found.push(Section {
                        name,
                        annotation,
                        body: &text[body_start..line_start],
                        first_line,
                    });
                    open = None;
                    if first_only {
                        return Ok(found);
                    }
                }
            }
        }
    }

    if open.is_some() {
        return Err(IoError::UnterminatedSection(name.to_string()));
    }
    Ok(found)
}

/// Returns the annotation when `line` is the marker `$<name>`, optionally
/// followed by whitespace and free text.
fn marker_annotation<'l>(line: &'l str, name: &str) -> Option<&'l str> {
    let rest = line.strip_prefix('$')?.strip_prefix(name)?;
    if rest.is_empty() {
        Some("")
    } else if rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Sequential reader over a section's non-empty lines for count-driven layouts.
#[derive(Debug, Clone)]
pub struct LineCursor<'a> {
    section: &'a str,
    lines: Vec<(usize, &'a str)>,
    pos: usize,
    last_line: usize,
}

impl<'a> LineCursor<'a> {
    pub fn new(section: Section<'a>) -> Self {
        let last_line = section.first_line + section.body.lines().count();
        Self {
            section: section.name,
            lines: section.lines().collect(),
            pos: 0,
            last_line,
        }
    }

    pub fn section(&self) -> &'a str {
        self.section
    }

    /// Next line, or a parse error naming what the layout still expected.
    pub fn next_line(&mut self, what: &str) -> Result<(usize, &'a str)> {
        match self.lines.get(self.pos) {
            Some(&line) => {
                self.pos += 1;
                Ok(line)
            }
            None => Err(IoError::parse(
                self.section,
                self.last_line,
                format!("unexpected end of section while reading {what}"),
            )),
        }
    }

    /// Lines not consumed yet.
    pub fn remaining(&self) -> &[(usize, &'a str)] {
        &self.lines[self.pos..]
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.lines.len()
    }
}

/// Parses one whitespace token, reporting a missing or invalid `what`.
pub(crate) fn parse_token<T: FromStr>(
    token: Option<&str>,
    what: &str,
    section: &str,
    line: usize,
) -> Result<T> {
    let raw = token.ok_or_else(|| IoError::parse(section, line, format!("missing {what}")))?;
    raw.parse::<T>()
        .map_err(|_| IoError::parse(section, line, format!("invalid {what}: {raw}")))
}

/// Reads a whole input file, reporting absence before any parsing starts.
pub(crate) fn read_text(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(IoError::FileNotFound(path.to_path_buf()));
    }
    Ok(fs::read_to_string(path)?)
}
