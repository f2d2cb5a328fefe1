use super::{BackupContext, BackupStats};
use crate::ledger::{Ledger, VersionRecord};
use crate::storage::{StorageGateway, Storager};
use crate::utils::errors::{Result, SyncError};
use crate::utils::format::format_bytes;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Store `artifact` as a new version, then prune versions beyond
/// `history` and delete their remote copies.
#[allow(clippy::too_many_arguments)]
pub(super) async fn store_version<G: StorageGateway>(
    ledger: &mut Ledger,
    storager: &mut Storager<'_, G>,
    artifact: &Path,
    dirstorage: &str,
    category: &str,
    history: i64,
    ctx: &BackupContext<'_>,
    stats: &mut BackupStats,
) -> Result<()> {
    let name = artifact
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| {
            SyncError::Command(format!("invalid artifact path {}", artifact.display()))
        })?;

    let bytes = storager.store(artifact, dirstorage, Some(category)).await?;
    stats.stored_files += 1;
    stats.stored_bytes += bytes;
    info!(artifact = %name, size = %format_bytes(bytes), "Artifact stored");

    ledger.add_version(&VersionRecord::new(ctx.timestamp(), name.clone(), bytes as i64))?;
    ledger.record_stat(&ctx.date_str(), bytes as i64)?;

    // Only names the ledger has already dropped are deleted remotely, and
    // never one a retained version still points at.
    let pruned = ledger.prune_older_than(history)?;
    let retained: HashSet<String> = ledger.versions()?.into_iter().map(|v| v.name).collect();
    for old in pruned {
        if old == name || retained.contains(&old) {
            warn!(
                artifact = %old,
                "Pruned version shares its name with a retained one, remote copy kept"
            );
            continue;
        }
        match storager.unstore(dirstorage, &old).await {
            Ok(()) => stats.pruned.push(old),
            Err(e) => {
                warn!(artifact = %old, error = %e, "Old version could not be removed from storage");
                stats
                    .warnings
                    .push(format!("Error removing old version {}: {}", old, e));
            }
        }
    }
    Ok(())
}

/// `tar -czvf <archive> -C <parent> <folder> ...`
pub(super) async fn archive(
    ctx: &BackupContext<'_>,
    archive: &Path,
    entries: &[(String, String)],
) -> Result<()> {
    let mut args = vec!["-czvf".to_string(), archive.to_string_lossy().to_string()];
    for (parent, folder) in entries {
        args.push("-C".to_string());
        args.push(parent.clone());
        args.push(folder.clone());
    }
    ctx.runner
        .run("tar", &args)
        .await
        .map_err(|e| SyncError::Command(format!("Error archiving: {}", e)))?;
    Ok(())
}
