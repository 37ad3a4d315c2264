//! Command implementations.

mod auth;
mod run;

pub use auth::{login, logout, refresh, register, status};
pub use run::run;

use anyhow::{Context, Result};
use auth_backend::{AuthApi, AuthService, BackendClient};
use knugget_core::{Config, Paths};
use session_store::{FileSessionStore, SessionStore};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a command needs: resolved paths, loaded configuration, and
/// the session store plus backend service bound to them.
pub struct ClientSetup {
    pub paths: Paths,
    pub config: Config,
    pub store: Arc<FileSessionStore>,
    pub service: Arc<AuthService>,
}

impl ClientSetup {
    pub fn load(base_dir: Option<PathBuf>) -> Result<Self> {
        let paths = match base_dir {
            Some(base) => Paths::with_base_dir(base),
            None => Paths::new().context("could not resolve the Knugget home directory")?,
        };
        paths
            .ensure_dirs()
            .with_context(|| format!("could not create {}", paths.base_dir().display()))?;
        let config = Config::load(&paths).context("invalid configuration")?;

        let store = Arc::new(FileSessionStore::new(paths.session_file()));
        let api = Arc::new(BackendClient::new(config.api_url.clone())) as Arc<dyn AuthApi>;
        let service = Arc::new(AuthService::new(
            api,
            Arc::clone(&store) as Arc<dyn SessionStore>,
        ));

        Ok(Self {
            paths,
            config,
            store,
            service,
        })
    }
}
