use std::sync::Arc;
use tokio::sync::RwLock;

use crate::clients::mailer::{LogMailer, Mailer, RelayMailer};
use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthService, SeaOrmAuthService, SessionService};

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub sessions: Arc<SessionService>,

    pub auth: Arc<dyn AuthService>,

    pub mailer: Arc<dyn Mailer>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mailer: Arc<dyn Mailer> = if config.mailer.enabled {
            Arc::new(RelayMailer::new(&config.mailer)?)
        } else {
            Arc::new(LogMailer)
        };

        Self::with_mailer(config, mailer).await
    }

    /// Used by tests to inject a capturing mailer.
    pub async fn with_mailer(config: Config, mailer: Arc<dyn Mailer>) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let sessions = Arc::new(SessionService::new(
            &config.auth.session_secret,
            &config.server.public_base_url,
        )?);

        let auth: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            mailer.clone(),
            config.server.public_base_url.clone(),
        ));

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            sessions,
            auth,
            mailer,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
