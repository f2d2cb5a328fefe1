//! Remote storage access.
//!
//! [`StorageGateway`] is the narrow put/get/delete seam the rest of the
//! crate talks through; [`Gateway`] picks the concrete transport from the
//! URL scheme, and [`Storager`] layers per-target URL building and byte
//! accounting on top.

pub mod command;
pub mod local;
pub mod storager;
pub mod url;

use crate::utils::errors::GatewayError;
use std::path::Path;

pub use command::CommandGateway;
pub use local::LocalGateway;
pub use storager::Storager;
pub use url::{build_url, canonical_dirstorage, Scheme};

/// Object-level transfer against a URL-addressed store. Dry-run handling
/// belongs to the implementation.
#[allow(async_fn_in_trait)]
pub trait StorageGateway {
    /// Upload `local` to the object `url`, returning the bytes transferred.
    async fn put(&self, local: &Path, url: &str) -> Result<u64, GatewayError>;

    /// Download `url` into `local`. A missing object is
    /// [`GatewayError::NotFound`].
    async fn get(&self, url: &str, local: &Path) -> Result<(), GatewayError>;

    async fn delete(&self, url: &str) -> Result<(), GatewayError>;
}

/// Routes `file://` URLs to the local filesystem and everything else to
/// the external copy tool.
#[derive(Debug, Clone)]
pub struct Gateway {
    command: CommandGateway,
    local: LocalGateway,
}

impl Gateway {
    pub fn new(command: CommandGateway, local: LocalGateway) -> Self {
        Self { command, local }
    }

    fn is_local(url: &str) -> bool {
        url.starts_with("file://")
    }
}

impl StorageGateway for Gateway {
    async fn put(&self, local: &Path, url: &str) -> Result<u64, GatewayError> {
        if Self::is_local(url) {
            self.local.put(local, url).await
        } else {
            self.command.put(local, url).await
        }
    }

    async fn get(&self, url: &str, local: &Path) -> Result<(), GatewayError> {
        if Self::is_local(url) {
            self.local.get(url, local).await
        } else {
            self.command.get(url, local).await
        }
    }

    async fn delete(&self, url: &str) -> Result<(), GatewayError> {
        if Self::is_local(url) {
            self.local.delete(url).await
        } else {
            self.command.delete(url).await
        }
    }
}
