//! Database dumps via the vendor dump tools, archived and versioned.

use super::versioned::{archive, store_version};
use super::{BackupContext, BackupStats};
use crate::config::{BackupConfig, BackupParams};
use crate::ledger::Ledger;
use crate::storage::{StorageGateway, Storager};
use crate::utils::errors::{Result, SyncError};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbEngine {
    Mongo,
    Mysql,
}

impl DbEngine {
    pub fn type_name(self) -> &'static str {
        match self {
            DbEngine::Mongo => "db_mongo",
            DbEngine::Mysql => "db_mysql",
        }
    }

    /// File or directory the dump tool writes, relative to the work dir.
    fn dump_name(self) -> String {
        match self {
            DbEngine::Mongo => self.type_name().to_string(),
            DbEngine::Mysql => format!("{}.sql", self.type_name()),
        }
    }

    fn program(self) -> &'static str {
        match self {
            DbEngine::Mongo => "mongodump",
            DbEngine::Mysql => "mysqldump",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbDump {
    engine: DbEngine,
    pub(super) host: String,
    user: Option<String>,
    password: Option<String>,
    pub(super) dirstorage: String,
    history: i64,
}

impl DbDump {
    pub fn init(config: &BackupConfig) -> Result<Self> {
        let (engine, host, user, password, history) = match &config.params {
            BackupParams::DbMongo {
                host,
                user,
                password,
                history,
            } => (DbEngine::Mongo, host, user, password, history),
            BackupParams::DbMysql {
                host,
                user,
                password,
                history,
            } => (DbEngine::Mysql, host, user, password, history),
            _ => {
                return Err(SyncError::Config(format!(
                    "Backup '{}' is not a database dump",
                    config.name
                )))
            }
        };
        if host.trim().is_empty() {
            return Err(SyncError::Config(format!(
                "Backup '{}': host must be provided",
                config.name
            )));
        }

        Ok(Self {
            engine,
            host: host.clone(),
            user: user.clone(),
            password: password.clone(),
            dirstorage: config.dirstorage.clone(),
            history: *history,
        })
    }

    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    pub fn archive_name(&self, ctx: &BackupContext<'_>) -> String {
        format!("{}_{}.tar.gz", self.engine.type_name(), ctx.artifact_stamp())
    }

    /// Arguments for the dump tool writing into `work_dir`. Credentials
    /// are passed only when both user and password are set.
    pub fn dump_args(&self, work_dir: &Path) -> Vec<String> {
        let target = work_dir.join(self.engine.dump_name()).to_string_lossy().to_string();
        let credentials = match (&self.user, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        };

        let mut args = vec!["-h".to_string(), self.host.clone()];
        match self.engine {
            DbEngine::Mongo => {
                args.extend(["-o".to_string(), target]);
                if let Some((user, password)) = credentials {
                    args.extend([
                        "-u".to_string(),
                        user.to_string(),
                        "-p".to_string(),
                        password.to_string(),
                    ]);
                }
            }
            DbEngine::Mysql => {
                if let Some((user, password)) = credentials {
                    args.push(format!("--user={}", user));
                    args.push(format!("--password={}", password));
                }
                args.extend(["--all-databases".to_string(), "-r".to_string(), target]);
            }
        }
        args
    }

    pub(super) async fn execute<G: StorageGateway>(
        &self,
        ledger: &mut Ledger,
        storager: &mut Storager<'_, G>,
        work_dir: &Path,
        ctx: &BackupContext<'_>,
        stats: &mut BackupStats,
    ) -> Result<()> {
        let program = self.engine.program();
        ctx.runner
            .run(program, self.dump_args(work_dir))
            .await
            .map_err(|e| SyncError::Command(format!("Error during {} dump: {}", program, e)))?;
        info!(backup = self.engine.type_name(), host = %self.host, "Database dumped");

        let archive_path = work_dir.join(self.archive_name(ctx));
        let entries = [(
            work_dir.to_string_lossy().to_string(),
            self.engine.dump_name(),
        )];
        archive(ctx, &archive_path, &entries).await?;

        store_version(
            ledger,
            storager,
            &archive_path,
            &self.dirstorage,
            self.engine.type_name(),
            self.history,
            ctx,
            stats,
        )
        .await
    }
}
