//! Email accounts and their connection lifecycle.
//!
//! An [`Account`] owns at most one cached [`MailSession`] and reconnects
//! lazily when the session is missing or has been invalidated. Filters and
//! watchers share accounts through [`SharedAccount`], an
//! `Arc<tokio::sync::Mutex<Account>>`, so that two filters on the same
//! account never interleave commands on one connection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::AccountConfig;
use crate::error::Result;
use crate::session::MailSession;

/// Opens sessions for an account.
///
/// The default implementation is [`ImapConnector`](crate::imap::ImapConnector);
/// tests substitute in-memory sessions.
#[async_trait]
pub trait Connect: Send + Sync {
    /// Opens a fresh, authenticated session with the account's mailbox
    /// selected.
    async fn connect(
        &self,
        config: &AccountConfig,
        read_only: bool,
    ) -> Result<Box<dyn MailSession>>;
}

/// An email account with lazy connection management.
pub struct Account {
    config: AccountConfig,
    connector: Arc<dyn Connect>,
    session: Option<Box<dyn MailSession>>,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("config", &self.config)
            .field("connected", &self.session.is_some())
            .finish()
    }
}

impl Account {
    /// Creates an account that connects over IMAP.
    #[must_use]
    pub fn new(config: AccountConfig) -> Self {
        Self::with_connector(config, Arc::new(crate::imap::ImapConnector))
    }

    /// Creates an account with a custom connector.
    #[must_use]
    pub fn with_connector(config: AccountConfig, connector: Arc<dyn Connect>) -> Self {
        Self {
            config,
            connector,
            session: None,
        }
    }

    /// The account's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The account's configuration.
    #[must_use]
    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Returns the cached session, connecting first if there is none.
    ///
    /// # Errors
    ///
    /// Propagates connection and authentication failures.
    pub async fn session(&mut self) -> Result<&mut Box<dyn MailSession>> {
        if self.session.is_none() {
            debug!(account = %self.config.name, "Opening session");
            let session = self.connector.connect(&self.config, false).await?;
            info!(account = %self.config.name, "Connected");
            self.session = Some(session);
        }
        // The session was just inserted if it was missing.
        self.session.as_mut().ok_or(crate::Error::SessionLost)
    }

    /// Opens an additional session, independent of the cached one.
    ///
    /// Useful when a long-running `IDLE` must not block filter commands,
    /// which is exactly what the watcher does.
    ///
    /// # Errors
    ///
    /// Propagates connection and authentication failures.
    pub async fn extra_session(&self, read_only: bool) -> Result<Box<dyn MailSession>> {
        self.connector.connect(&self.config, read_only).await
    }

    /// Drops the cached session without logging out.
    ///
    /// Called after a failed operation so the next use reconnects.
    pub fn invalidate(&mut self) {
        if self.session.take().is_some() {
            debug!(account = %self.config.name, "Session invalidated");
        }
    }

    /// Logs out and drops the cached session, if any.
    #[instrument(name = "account::logout", skip(self), fields(account = %self.config.name))]
    pub async fn logout(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.logout().await?;
            info!("Disconnected");
        }
        Ok(())
    }
}

/// An account shared between filters and watchers.
pub type SharedAccount = Arc<Mutex<Account>>;

/// Wraps an account for sharing.
#[must_use]
pub fn shared(account: Account) -> SharedAccount {
    Arc::new(Mutex::new(account))
}

/// Logs out every account, logging failures instead of aborting.
pub async fn logout_all(accounts: &[SharedAccount]) {
    for account in accounts {
        let mut account = account.lock().await;
        if let Err(error) = account.logout().await {
            warn!(account = %account.name(), %error, "Logout failed");
        }
    }
}
