//! Version retention policy.

use crate::ledger::VersionRecord;

/// Return the versions that fall outside the retention window.
///
/// `newest_first` must be ordered by timestamp, newest first. `keep` is the
/// number of older versions to retain besides the current one:
/// `keep < 0` retains everything, `keep >= 0` retains the `keep + 1` most
/// recent versions. The newest version is therefore never pruned.
pub fn versions_to_prune(newest_first: &[VersionRecord], keep: i64) -> &[VersionRecord] {
    if keep < 0 {
        return &[];
    }

    let retain = usize::try_from(keep).unwrap_or(usize::MAX).saturating_add(1);
    newest_first.get(retain..).unwrap_or(&[])
}
