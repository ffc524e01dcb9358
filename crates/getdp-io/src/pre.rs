//! GetDP `.pre` (preprocessing) reader
//!
//! A preprocessing file describes how degrees of freedom were set up for a
//! resolution: an optional `$Resolution` header followed by one `$DofData`
//! section per system.
//!
//! ```text
//! $Resolution /* 'Analysis' */
//! 0 1
//! $EndResolution
//! $DofData /* #0 */
//! 0 0                 resolution and system numbers
//! 1 1                 function spaces (count, indices)
//! 0                   time functions
//! 1 0                 partitions
//! 5 3                 any-DOF and DOF counts
//! 1 1 0 1 0 3         basis entity harmonic type payload...
//! $EndDofData
//! ```
//!
//! DOF records are read leniently: missing trailing payload fields default to
//! zero, and a payload that does not convert is kept as its raw tokens.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use log::{debug, warn};

use crate::error::Result;
use crate::sections::{Section, find_section, find_sections, parse_token, read_text};

/// DOF type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DofType {
    Unknown,
    FixedValue,
    AssociatedDof,
    InitialValue,
    Other(i32),
}

impl DofType {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => DofType::Unknown,
            2 => DofType::FixedValue,
            3 => DofType::AssociatedDof,
            5 => DofType::InitialValue,
            other => DofType::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            DofType::Unknown => 1,
            DofType::FixedValue => 2,
            DofType::AssociatedDof => 3,
            DofType::InitialValue => 5,
            DofType::Other(code) => code,
        }
    }
}

impl fmt::Display for DofType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DofType::Unknown => write!(f, "UNKNOWN"),
            DofType::FixedValue => write!(f, "FIXED_VALUE"),
            DofType::AssociatedDof => write!(f, "ASSOCIATED_DOF"),
            DofType::InitialValue => write!(f, "INITIAL_VALUE"),
            DofType::Other(code) => write!(f, "TYPE_{code}"),
        }
    }
}

/// Token of a payload whose type has no fixed layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    Int(i64),
    Float(f64),
}

/// Type-dependent trailing fields of a DOF record
#[derive(Debug, Clone, PartialEq)]
pub enum DofPayload {
    Unknown {
        equation_number: i64,
        nnz: i64,
    },
    FixedValue {
        value: f64,
        time_function_number: i64,
    },
    AssociatedDof {
        associate_dof_number: i64,
        value: f64,
        time_function_number: i64,
    },
    InitialValue {
        equation_number: i64,
        value: f64,
    },
    /// Payload of a type without a known layout
    Raw(Vec<RawValue>),
    /// Payload whose fields failed to convert, kept verbatim
    Unparsed(Vec<String>),
}

impl DofPayload {
    pub fn value(&self) -> Option<f64> {
        match self {
            DofPayload::FixedValue { value, .. }
            | DofPayload::AssociatedDof { value, .. }
            | DofPayload::InitialValue { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn equation_number(&self) -> Option<i64> {
        match self {
            DofPayload::Unknown {
                equation_number, ..
            }
            | DofPayload::InitialValue {
                equation_number, ..
            } => Some(*equation_number),
            _ => None,
        }
    }
}

/// Decodes the payload tokens of a DOF record of the given type.
pub fn parse_dof_payload(dof_type: DofType, tokens: &[&str]) -> DofPayload {
    let decoded = match dof_type {
        DofType::Unknown => (|| {
            Some(DofPayload::Unknown {
                equation_number: field(tokens, 0)?,
                nnz: field(tokens, 1)?,
            })
        })(),
        DofType::FixedValue => (|| {
            Some(DofPayload::FixedValue {
                value: field(tokens, 0)?,
                time_function_number: field(tokens, 1)?,
            })
        })(),
        DofType::AssociatedDof => (|| {
            Some(DofPayload::AssociatedDof {
                associate_dof_number: field(tokens, 0)?,
                value: field(tokens, 1)?,
                time_function_number: field(tokens, 2)?,
            })
        })(),
        DofType::InitialValue => (|| {
            Some(DofPayload::InitialValue {
                equation_number: field(tokens, 0)?,
                value: field(tokens, 1)?,
            })
        })(),
        DofType::Other(_) => tokens
            .iter()
            .map(|raw| raw_value(raw))
            .collect::<Option<Vec<_>>>()
            .map(DofPayload::Raw),
    };

    decoded.unwrap_or_else(|| {
        DofPayload::Unparsed(tokens.iter().map(|raw| raw.to_string()).collect())
    })
}

/// Field `index`, zero when absent, `None` when present but not convertible.
fn field<T: FromStr + Default>(tokens: &[&str], index: usize) -> Option<T> {
    match tokens.get(index) {
        Some(raw) => raw.parse().ok(),
        None => Some(T::default()),
    }
}

fn raw_value(raw: &str) -> Option<RawValue> {
    if raw.contains('.') {
        raw.parse().ok().map(RawValue::Float)
    } else {
        raw.parse().ok().map(RawValue::Int)
    }
}

/// One degree of freedom
#[derive(Debug, Clone, PartialEq)]
pub struct Dof {
    pub basis_function: i64,
    /// 1-based entity index (distinct from node tags)
    pub entity: i64,
    pub harmonic: i64,
    pub dof_type: DofType,
    pub payload: DofPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DofDataBlock {
    pub number: i64,
    pub resolution_number: i64,
    pub system_number: i64,
    pub function_spaces: Vec<i64>,
    pub time_functions: Vec<i64>,
    pub partitions: Vec<i64>,
    pub num_any_dof: i64,
    pub num_dof: i64,
    pub dofs: Vec<Dof>,
    /// Record lines that could not be placed and were dropped
    pub skipped_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub name: Option<String>,
    pub main_resolution_number: i64,
    pub number_of_dofdata: i64,
}

/// Parsed preprocessing file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preprocessing {
    pub resolution: Option<Resolution>,
    pub blocks: Vec<DofDataBlock>,
}

impl Preprocessing {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = read_text(path.as_ref())?;
        parse_preprocessing(&text)
    }

    pub fn total_dofs(&self) -> usize {
        self.blocks.iter().map(|block| block.dofs.len()).sum()
    }
}

pub fn parse_preprocessing(text: &str) -> Result<Preprocessing> {
    let resolution = find_section(text, "Resolution")?
        .map(parse_resolution)
        .transpose()?;

    let mut blocks = Vec::new();
    for (ordinal, section) in find_sections(text, "DofData")?.into_iter().enumerate() {
        if let Some(block) = parse_block(section, ordinal)? {
            blocks.push(block);
        }
    }

    if let Some(resolution) = &resolution
        && resolution.number_of_dofdata != blocks.len() as i64
    {
        warn!(
            "$Resolution declares {} DofData blocks but {} were read",
            resolution.number_of_dofdata,
            blocks.len()
        );
    }

    let preprocessing = Preprocessing { resolution, blocks };
    debug!(
        "parsed preprocessing: {} DofData blocks, {} DOFs",
        preprocessing.blocks.len(),
        preprocessing.total_dofs()
    );
    Ok(preprocessing)
}

fn parse_resolution(section: Section<'_>) -> Result<Resolution> {
    let mut cursor = section.cursor();
    let (line, text) = cursor.next_line("resolution numbers")?;
    let mut parts = text.split_whitespace();
    let main_resolution_number =
        parse_token(parts.next(), "main resolution number", section.name, line)?;
    let number_of_dofdata = match parts.next() {
        Some(raw) => parse_token(Some(raw), "DofData count", section.name, line)?,
        None => 0,
    };
    Ok(Resolution {
        name: quoted_name(section.annotation),
        main_resolution_number,
        number_of_dofdata,
    })
}

/// `/* 'Analysis' */` → `Analysis`
fn quoted_name(annotation: &str) -> Option<String> {
    let start = annotation.find('\'')?;
    let end = annotation.rfind('\'')?;
    (end > start).then(|| annotation[start + 1..end].to_string())
}

/// `/* #3 */` → 3
fn block_number(annotation: &str) -> Option<i64> {
    let after = &annotation[annotation.find('#')? + 1..];
    let digits: String = after.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn parse_index_list(section: &str, (line, text): (usize, &str), what: &str) -> Result<Vec<i64>> {
    let mut parts = text.split_whitespace();
    let count: usize = parse_token(parts.next(), &format!("{what} count"), section, line)?;
    let items = parts
        .take(count)
        .map(|raw| parse_token(Some(raw), what, section, line))
        .collect::<Result<Vec<i64>>>()?;
    if items.len() < count {
        warn!(
            "${section} line {line}: {what} list declares {count} entries but holds {}",
            items.len()
        );
    }
    Ok(items)
}

fn parse_block(section: Section<'_>, ordinal: usize) -> Result<Option<DofDataBlock>> {
    let lines: Vec<(usize, &str)> = section.lines().collect();
    let number = block_number(section.annotation).unwrap_or(ordinal as i64);
    if lines.len() < 5 {
        warn!(
            "skipping DofData block {number}: header needs 5 lines, found {}",
            lines.len()
        );
        return Ok(None);
    }

    let (line, text) = lines[0];
    let mut parts = text.split_whitespace();
    let resolution_number = parse_token(parts.next(), "resolution number", section.name, line)?;
    let system_number = parse_token(parts.next(), "system number", section.name, line)?;

    let function_spaces = parse_index_list(section.name, lines[1], "function space")?;
    let time_functions = parse_index_list(section.name, lines[2], "time function")?;
    let partitions = parse_index_list(section.name, lines[3], "partition")?;

    let (line, text) = lines[4];
    let mut parts = text.split_whitespace();
    let num_any_dof = parse_token(parts.next(), "any-DOF count", section.name, line)?;
    let num_dof = parse_token(parts.next(), "DOF count", section.name, line)?;

    let mut dofs = Vec::with_capacity(lines.len() - 5);
    let mut skipped_records = 0usize;
    for &(line, text) in &lines[5..] {
        match parse_dof_record(text) {
            Some(dof) => dofs.push(dof),
            None => {
                warn!("DofData block {number}, line {line}: skipping unreadable record '{text}'");
                skipped_records += 1;
            }
        }
    }

    Ok(Some(DofDataBlock {
        number,
        resolution_number,
        system_number,
        function_spaces,
        time_functions,
        partitions,
        num_any_dof,
        num_dof,
        dofs,
        skipped_records,
    }))
}

/// `basis entity harmonic type payload...`; `None` when the record cannot be
/// placed (fewer than five tokens or non-integer leading fields).
fn parse_dof_record(text: &str) -> Option<Dof> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < 5 {
        return None;
    }
    let basis_function = tokens[0].parse().ok()?;
    let entity = tokens[1].parse().ok()?;
    let harmonic = tokens[2].parse().ok()?;
    let dof_type = DofType::from_code(tokens[3].parse().ok()?);
    Some(Dof {
        basis_function,
        entity,
        harmonic,
        dof_type,
        payload: parse_dof_payload(dof_type, &tokens[4..]),
    })
}
