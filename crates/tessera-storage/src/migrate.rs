//! Migration path selection.
//!
//! Steps may skip versions (`1 -> 3`). From each version the planner tries
//! the step with the largest forward jump first and backtracks when that
//! choice leads to a dead end, so the selected chain is the one with the
//! fewest steps along the largest jumps.

use std::collections::HashSet;

use tessera_core::migration::MigrationStep;

use crate::error::StorageError;

/// Selects the ordered chain of steps covering `[from, to]` contiguously.
pub fn plan_path(steps: &[MigrationStep], from: u32, to: u32) -> Result<Vec<&MigrationStep>, StorageError> {
    let path_error = |reason: String| StorageError::MigrationPath { from, to, reason };

    let mut seen = HashSet::new();
    for step in steps {
        if step.to <= step.from {
            return Err(path_error(format!(
                "step {} -> {} does not move forward",
                step.from, step.to
            )));
        }
        if !seen.insert((step.from, step.to)) {
            return Err(path_error(format!(
                "step {} -> {} is declared more than once",
                step.from, step.to
            )));
        }
    }
    if from == to {
        return Ok(Vec::new());
    }
    if from > to {
        return Err(path_error("cannot migrate to an older version".to_string()));
    }

    let mut dead_ends = HashSet::new();
    let mut path = Vec::new();
    if search(steps, from, to, &mut path, &mut dead_ends) {
        Ok(path)
    } else {
        Err(path_error(format!(
            "no chain of declared steps starts at {} and ends at {}",
            from, to
        )))
    }
}

fn search<'a>(
    steps: &'a [MigrationStep],
    at: u32,
    to: u32,
    path: &mut Vec<&'a MigrationStep>,
    dead_ends: &mut HashSet<u32>,
) -> bool {
    if at == to {
        return true;
    }
    if dead_ends.contains(&at) {
        return false;
    }
    let mut candidates: Vec<&MigrationStep> = steps.iter().filter(|s| s.from == at && s.to <= to).collect();
    candidates.sort_by(|a, b| b.to.cmp(&a.to));
    for step in candidates {
        path.push(step);
        if search(steps, step.to, to, path, dead_ends) {
            return true;
        }
        path.pop();
    }
    dead_ends.insert(at);
    false
}
