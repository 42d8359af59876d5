//! Label dictionary shared by the assembler and disassembler.
//!
//! Maps label names to resolved byte offsets, with forward references: a
//! name first seen as a branch target is created with the [`UNRESOLVED`]
//! sentinel and filled in later by its `name:` definition. One instance is
//! owned by each assemble/disassemble session; entries are append-only
//! within a pass.

use thiserror::Error;

/// Maximum number of labels one session may hold.
pub const MAX_LABELS: usize = 64;

/// Address sentinel for a label referenced before its definition.
pub const UNRESOLVED: usize = usize::MAX;

/// Errors reported by [`LabelTable`] operations.
#[derive(Debug, Error)]
pub enum LabelError {
    #[error("label table full ({} entries)", MAX_LABELS)]
    Overflow,
}

/// A bounded name-to-address table.
#[derive(Debug, Default)]
pub struct LabelTable {
    entries: Vec<(String, usize)>,
}

impl LabelTable {
    pub fn new() -> LabelTable {
        LabelTable::default()
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }

    fn push(&mut self, name: &str, addr: usize) -> Result<(), LabelError> {
        if self.entries.len() == MAX_LABELS {
            return Err(LabelError::Overflow);
        }
        self.entries.push((name.to_string(), addr));
        Ok(())
    }

    /// The stored address for `name`, creating the entry with [`UNRESOLVED`]
    /// if the name has not been seen yet. There is no "not found" outcome;
    /// absence is a forward reference.
    pub fn get_or_create(&mut self, name: &str) -> Result<usize, LabelError> {
        match self.find(name) {
            Some(i) => Ok(self.entries[i].1),
            None => {
                self.push(name, UNRESOLVED)?;
                Ok(UNRESOLVED)
            }
        }
    }

    /// Insert or overwrite the address for `name`.
    pub fn set(&mut self, name: &str, addr: usize) -> Result<(), LabelError> {
        match self.find(name) {
            Some(i) => {
                self.entries[i].1 = addr;
                Ok(())
            }
            None => self.push(name, addr),
        }
    }

    /// Reverse lookup: the first name stored at `addr`.
    pub fn name_for(&self, addr: usize) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, a)| *a == addr)
            .map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
