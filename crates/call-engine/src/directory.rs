//! Directory lookups for dial-by-name and auto-attendant flows.

use serde::{Deserialize, Serialize};

use crate::error::{CallFlowError, Result};

/// One user entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub extension: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Directory lookup primitive
///
/// Sections:
/// * `extension`: exact extension match
/// * `last_name` / `first_name`: keypad-digit prefix of the name
pub trait Directory: Send + Sync {
    fn lookup(&self, section: &str, query: &str) -> Result<Vec<DirectoryRecord>>;
}

/// In-memory directory built from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    records: Vec<DirectoryRecord>,
}

impl StaticDirectory {
    pub fn new(records: Vec<DirectoryRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Directory for StaticDirectory {
    fn lookup(&self, section: &str, query: &str) -> Result<Vec<DirectoryRecord>> {
        let matches: Vec<DirectoryRecord> = match section {
            "extension" => self
                .records
                .iter()
                .filter(|r| r.extension == query)
                .cloned()
                .collect(),
            "last_name" => self
                .records
                .iter()
                .filter(|r| keypad_digits(&r.last_name).starts_with(query))
                .cloned()
                .collect(),
            "first_name" => self
                .records
                .iter()
                .filter(|r| keypad_digits(&r.first_name).starts_with(query))
                .cloned()
                .collect(),
            other => {
                return Err(CallFlowError::invalid_input(format!(
                    "unknown directory section '{}'",
                    other
                )))
            }
        };
        Ok(matches)
    }
}

/// Phone keypad digits for a name; characters without a key are dropped.
pub fn keypad_digits(name: &str) -> String {
    name.chars()
        .filter_map(|c| {
            let key = match c.to_ascii_uppercase() {
                'A' | 'B' | 'C' => '2',
                'D' | 'E' | 'F' => '3',
                'G' | 'H' | 'I' => '4',
                'J' | 'K' | 'L' => '5',
                'M' | 'N' | 'O' => '6',
                'P' | 'Q' | 'R' | 'S' => '7',
                'T' | 'U' | 'V' => '8',
                'W' | 'X' | 'Y' | 'Z' => '9',
                _ => return None,
            };
            Some(key)
        })
        .collect()
}

/// Resolve keypad digits to exactly one record.
///
/// Last names are searched first; first names only when no last name
/// matches. Several matches in the deciding section leave it unresolved.
pub fn resolve_by_name(directory: &dyn Directory, digits: &str) -> Result<Option<DirectoryRecord>> {
    if digits.is_empty() {
        return Ok(None);
    }
    for section in ["last_name", "first_name"] {
        let mut found = directory.lookup(section, digits)?;
        match found.len() {
            0 => continue,
            1 => return Ok(found.pop()),
            _ => return Ok(None),
        }
    }
    Ok(None)
}
