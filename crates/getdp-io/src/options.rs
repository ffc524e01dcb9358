use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

/// What to do with a geometry or solution record that fails numeric conversion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordPolicy {
    /// Fail the whole parse
    #[default]
    Abort,
    /// Drop the record, log a warning and count it
    Skip,
}

impl RecordPolicy {
    /// Resolves a record parse result under this policy. Only parse errors are
    /// eligible for skipping.
    pub(crate) fn apply<T>(self, result: Result<T>, skipped: &mut usize) -> Result<Option<T>> {
        match (self, result) {
            (_, Ok(value)) => Ok(Some(value)),
            (RecordPolicy::Skip, Err(err @ IoError::Parse { .. })) => {
                warn!("skipping malformed record: {err}");
                *skipped += 1;
                Ok(None)
            }
            (_, Err(err)) => Err(err),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReaderOptions {
    pub record_policy: RecordPolicy,
}

impl ReaderOptions {
    pub fn lenient() -> Self {
        Self {
            record_policy: RecordPolicy::Skip,
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(IoError::FileNotFound(path.to_path_buf()));
        }
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
