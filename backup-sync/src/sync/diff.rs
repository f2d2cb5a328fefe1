//! Budget-constrained candidate selection.
//!
//! The ledger finds every local file that is new or changed relative to the
//! storage-known set; this module decides which of those fit into the
//! per-session upload budget.

use crate::ledger::FileRecord;

/// Select upload candidates from `changed`, preserving encounter order.
///
/// - `budget <= 0` disables the cap and every changed file is selected.
/// - With a positive budget a file is selected while the running total,
///   including that file, stays below `budget`.
/// - The first file is always selected, even when it alone exceeds the
///   budget, so a single oversized file still makes progress.
/// - A rejected file does not count toward the running total, so smaller
///   files further down may still fit.
pub fn select_candidates<I>(changed: I, budget: i64) -> Vec<FileRecord>
where
    I: IntoIterator<Item = FileRecord>,
{
    if budget <= 0 {
        return changed.into_iter().collect();
    }

    let mut selected = Vec::new();
    let mut total: i64 = 0;

    for record in changed {
        let with_record = total.saturating_add(record.size);
        if selected.is_empty() || with_record < budget {
            total = with_record;
            selected.push(record);
        }
    }

    selected
}

/// Total size in bytes of a candidate list.
pub fn total_size(records: &[FileRecord]) -> i64 {
    records.iter().map(|r| r.size).sum()
}
