//! Migration steps: declared transformations between schema versions.
//!
//! A step is authored once per schema change and never edited after it has
//! been applied anywhere. [`MigrationStep::checksum_input`] is the canonical
//! byte form the storage layer fingerprints to detect edited steps.

use serde::{Deserialize, Serialize};

/// Moves a database from `from` to `to` by running `statements` in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub from: u32,
    pub to: u32,
    pub statements: Vec<String>,
}

impl MigrationStep {
    pub fn new<I, S>(from: u32, to: u32, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MigrationStep {
            from,
            to,
            statements: statements.into_iter().map(Into::into).collect(),
        }
    }

    /// Canonical bytes of the step: versions plus trimmed statements, each
    /// terminated so statement boundaries are part of the fingerprint.
    pub fn checksum_input(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.from.to_le_bytes());
        out.extend_from_slice(&self.to.to_le_bytes());
        for stmt in &self.statements {
            out.extend_from_slice(stmt.trim().as_bytes());
            out.push(0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_input_ignores_surrounding_whitespace() {
        let a = MigrationStep::new(1, 2, ["ALTER TABLE t ADD COLUMN x INTEGER"]);
        let b = MigrationStep::new(1, 2, ["  ALTER TABLE t ADD COLUMN x INTEGER\n"]);
        assert_eq!(a.checksum_input(), b.checksum_input());
    }

    #[test]
    fn checksum_input_sees_statement_boundaries() {
        let a = MigrationStep::new(1, 2, ["A", "B"]);
        let b = MigrationStep::new(1, 2, ["AB"]);
        assert_ne!(a.checksum_input(), b.checksum_input());
    }
}
