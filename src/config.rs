//! Account configuration.
//!
//! Use [`AccountConfigBuilder`] to create a configuration with sensible
//! defaults:
//!
//! ```
//! use imap_filters::AccountConfig;
//!
//! let config = AccountConfig::builder()
//!     .name("personal")
//!     .email("user@example.com")
//!     .password("app-password")
//!     .build()
//!     .expect("valid config");
//! ```
//!
//! Configurations can also be loaded in bulk from a JSON file with
//! [`accounts_from_json`].

use crate::error::{Error, Result};
use crate::known_servers::ServerRegistry;
use email_address::EmailAddress;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Configuration for one IMAP account.
///
/// Create using [`AccountConfig::builder()`].
///
/// Note: The `password` field is stored as a [`SecretString`] to prevent
/// accidental logging of sensitive credentials. The `email` field is stored
/// as a validated [`EmailAddress`] type.
#[derive(Clone)]
pub struct AccountConfig {
    /// Display name used to identify the account in logs and lookups.
    pub name: String,
    /// Email address (used for login and IMAP server discovery).
    email: EmailAddress,
    /// Email password or app-specific password (protected from accidental logging).
    password: SecretString,
    /// IMAP server hostname (auto-discovered from email domain if not set).
    pub imap_host: Option<String>,
    /// IMAP server port (default: 993 for IMAPS).
    pub imap_port: u16,
    /// The mailbox filters operate on (default: `INBOX`).
    pub mailbox: String,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("name", &self.name)
            .field("email", &self.email.as_str())
            .field("password", &"[REDACTED]")
            .field("imap_host", &self.imap_host)
            .field("imap_port", &self.imap_port)
            .field("mailbox", &self.mailbox)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl AccountConfig {
    /// Returns the email address as a string slice.
    #[must_use]
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Returns a reference to the validated email address.
    #[must_use]
    pub fn email_address(&self) -> &EmailAddress {
        &self.email
    }

    /// Returns the password as a string slice.
    ///
    /// The password is intentionally not directly accessible to prevent
    /// it leaking into logs.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> AccountConfigBuilder {
        AccountConfigBuilder::default()
    }

    /// Returns the effective IMAP host, either explicitly configured or
    /// derived from the email domain.
    #[must_use]
    pub fn effective_imap_host(&self) -> String {
        if let Some(host) = &self.imap_host {
            host.clone()
        } else {
            crate::known_servers::discover_imap_host(self.email.as_str())
        }
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.effective_imap_host(), self.imap_port)
    }
}

/// Timeout configuration for IMAP operations.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for selecting a mailbox.
    pub select: Duration,
    /// Timeout for short commands (search, store, move, noop).
    pub command: Duration,
    /// Timeout for fetching message content.
    pub fetch: Duration,
    /// Timeout for logout operation.
    pub logout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            select: Duration::from_secs(10),
            command: Duration::from_secs(30),
            fetch: Duration::from_secs(60),
            logout: Duration::from_secs(5),
        }
    }
}

/// Validates an email address format.
fn validate_email(email: &str) -> Result<EmailAddress> {
    EmailAddress::parse_with_options(email, email_address::Options::default()).map_err(|_| {
        Error::InvalidEmailFormat {
            email: email.to_string(),
        }
    })
}

/// Builder for [`AccountConfig`].
#[derive(Debug, Default)]
pub struct AccountConfigBuilder {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    mailbox: Option<String>,
    timeouts: Option<TimeoutConfig>,
    server_registry: Option<ServerRegistry>,
}

impl AccountConfigBuilder {
    /// Sets the account display name (required).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the email address (required).
    ///
    /// The email domain is used to auto-discover the IMAP server if not
    /// explicitly set.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the password (required).
    ///
    /// For Gmail/Outlook, use an app-specific password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the IMAP server hostname explicitly.
    ///
    /// If not set, the server is auto-discovered from the email domain.
    #[must_use]
    pub fn imap_host(mut self, host: impl Into<String>) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// Sets the IMAP server port.
    ///
    /// Default is 993 (IMAPS with TLS).
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Sets the mailbox filters run against. Default is `INBOX`.
    #[must_use]
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = Some(mailbox.into());
        self
    }

    /// Sets a custom server registry for IMAP host discovery.
    ///
    /// The registry is used during [`build()`](Self::build) to resolve the
    /// IMAP host if no explicit [`imap_host`](Self::imap_host) is set.
    #[must_use]
    pub fn server_registry(mut self, registry: ServerRegistry) -> Self {
        self.server_registry = Some(registry);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .connect = timeout;
        self
    }

    /// Sets the authentication timeout.
    #[must_use]
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts
            .get_or_insert_with(TimeoutConfig::default)
            .auth = timeout;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<AccountConfig> {
        let email_raw = self.email.ok_or_else(|| Error::InvalidConfig {
            message: "email is required".into(),
        })?;

        let email = validate_email(&email_raw)?;

        let password_raw = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "password is required".into(),
        })?;

        // Resolve IMAP host: explicit > registry > default discovery
        let imap_host = self.imap_host.or_else(|| {
            self.server_registry
                .map(|registry| registry.discover(email.as_str()).into_owned())
        });

        // Account name defaults to the email address
        let name = self.name.unwrap_or_else(|| email.as_str().to_string());

        Ok(AccountConfig {
            name,
            email,
            password: SecretString::from(password_raw),
            imap_host,
            imap_port: self.imap_port.unwrap_or(993),
            mailbox: self.mailbox.unwrap_or_else(|| "INBOX".into()),
            timeouts: self.timeouts.unwrap_or_default(),
        })
    }
}

// ─── JSON accounts file ──────────────────────────────────────────────────────

/// One entry of the JSON accounts file.
#[derive(Debug, Deserialize)]
struct RawAccount {
    name: String,
    #[serde(rename = "type", default = "default_account_type")]
    account_type: String,
    username: String,
    password: String,
    host: Option<String>,
    port: Option<u16>,
    mailbox: Option<String>,
}

fn default_account_type() -> String {
    "custom".into()
}

/// Loads account configurations from a JSON file.
///
/// The file is an array of account objects. Each object carries a `name`,
/// `username` and `password`; the optional `type` is either `"gmail"`
/// (preconfigured for `imap.gmail.com:993`) or `"custom"` (the default),
/// which additionally requires `host` and accepts `port` and `mailbox`:
///
/// ```json
/// [
///   { "name": "personal", "type": "gmail",
///     "username": "user@gmail.com", "password": "app-password" },
///   { "name": "work", "type": "custom", "host": "mail.example.com",
///     "port": 993, "username": "user@example.com", "password": "secret" }
/// ]
/// ```
///
/// # Errors
///
/// Fails if the file cannot be read or parsed, if any entry names an
/// unrecognized `type`, or if a `custom` entry is missing its `host`.
pub fn accounts_from_json(path: impl AsRef<Path>) -> Result<HashMap<String, AccountConfig>> {
    let path = path.as_ref();
    let file_err = |source: Box<dyn std::error::Error + Send + Sync>| Error::AccountFile {
        path: path.display().to_string(),
        source,
    };

    let data = std::fs::read_to_string(path).map_err(|e| file_err(Box::new(e)))?;
    let raw: Vec<RawAccount> = serde_json::from_str(&data).map_err(|e| file_err(Box::new(e)))?;

    let mut accounts = HashMap::with_capacity(raw.len());
    for entry in raw {
        let mut builder = AccountConfig::builder()
            .name(entry.name.clone())
            .email(entry.username)
            .password(entry.password);

        match entry.account_type.as_str() {
            "gmail" => {
                builder = builder.imap_host("imap.gmail.com").imap_port(993);
            }
            "custom" => {
                let host = entry.host.ok_or_else(|| Error::InvalidConfig {
                    message: format!("account '{}': custom accounts require a host", entry.name),
                })?;
                builder = builder.imap_host(host);
                if let Some(port) = entry.port {
                    builder = builder.imap_port(port);
                }
            }
            other => {
                return Err(Error::InvalidConfig {
                    message: format!("account '{}': unrecognized account type '{other}'", entry.name),
                });
            }
        }

        if let Some(mailbox) = entry.mailbox {
            builder = builder.mailbox(mailbox);
        }

        let config = builder.build()?;
        accounts.insert(config.name.clone(), config);
    }
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_minimal() {
        let config = AccountConfig::builder()
            .email("user@example.com")
            .password("secret")
            .build()
            .unwrap();

        assert_eq!(config.name, "user@example.com");
        assert_eq!(config.email(), "user@example.com");
        assert_eq!(config.password(), "secret");
        assert_eq!(config.imap_port, 993);
        assert_eq!(config.mailbox, "INBOX");
    }

    #[test]
    fn test_builder_full() {
        let config = AccountConfig::builder()
            .name("work")
            .email("user@example.com")
            .password("secret")
            .imap_host("mail.example.com")
            .imap_port(994)
            .mailbox("Archive")
            .connect_timeout(Duration::from_secs(60))
            .build()
            .unwrap();

        assert_eq!(config.name, "work");
        assert_eq!(config.imap_host, Some("mail.example.com".into()));
        assert_eq!(config.imap_port, 994);
        assert_eq!(config.mailbox, "Archive");
        assert_eq!(config.timeouts.connect, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_missing_email() {
        let result = AccountConfig::builder().password("secret").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_missing_password() {
        let result = AccountConfig::builder().email("user@example.com").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_invalid_email() {
        let result = AccountConfig::builder()
            .email("invalid-email")
            .password("secret")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_server_address() {
        let config = AccountConfig::builder()
            .email("user@example.com")
            .password("secret")
            .imap_host("mail.example.com")
            .build()
            .unwrap();

        assert_eq!(config.server_address(), "mail.example.com:993");
    }

    #[test]
    fn test_password_not_in_debug() {
        let config = AccountConfig::builder()
            .email("user@example.com")
            .password("super-secret-password")
            .build()
            .unwrap();

        let debug_str = format!("{config:?}");
        assert!(!debug_str.contains("super-secret-password"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_builder_with_server_registry() {
        let mut registry = ServerRegistry::new();
        registry.register("mycompany.com", "mail.internal.mycompany.com");

        let config = AccountConfig::builder()
            .email("user@mycompany.com")
            .password("secret")
            .server_registry(registry)
            .build()
            .unwrap();

        assert_eq!(config.effective_imap_host(), "mail.internal.mycompany.com");
    }

    #[test]
    fn test_builder_explicit_host_overrides_registry() {
        let mut registry = ServerRegistry::new();
        registry.register("mycompany.com", "mail.internal.mycompany.com");

        let config = AccountConfig::builder()
            .email("user@mycompany.com")
            .password("secret")
            .imap_host("custom.host.com")
            .server_registry(registry)
            .build()
            .unwrap();

        assert_eq!(config.effective_imap_host(), "custom.host.com");
    }

    #[test]
    fn test_builder_no_registry_uses_default_discovery() {
        let config = AccountConfig::builder()
            .email("user@gmail.com")
            .password("secret")
            .build()
            .unwrap();

        assert_eq!(config.effective_imap_host(), "imap.gmail.com");
    }

    fn write_temp_json(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "imap-filters-accounts-{}-{:?}.json",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_accounts_from_json() {
        let path = write_temp_json(
            r#"[
                {"name": "personal", "type": "gmail",
                 "username": "user@gmail.com", "password": "app-pw"},
                {"name": "work", "host": "mail.example.com", "port": 1993,
                 "username": "user@example.com", "password": "pw",
                 "mailbox": "Work/Inbox"}
            ]"#,
        );
        let accounts = accounts_from_json(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(accounts.len(), 2);
        let personal = &accounts["personal"];
        assert_eq!(personal.effective_imap_host(), "imap.gmail.com");
        assert_eq!(personal.imap_port, 993);

        let work = &accounts["work"];
        assert_eq!(work.effective_imap_host(), "mail.example.com");
        assert_eq!(work.imap_port, 1993);
        assert_eq!(work.mailbox, "Work/Inbox");
    }

    #[test]
    fn test_accounts_from_json_unknown_type_is_fatal() {
        let path = write_temp_json(
            r#"[{"name": "x", "type": "exchange",
                 "username": "u@example.com", "password": "pw"}]"#,
        );
        let result = accounts_from_json(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_accounts_from_json_custom_requires_host() {
        let path = write_temp_json(
            r#"[{"name": "x", "username": "u@example.com", "password": "pw"}]"#,
        );
        let result = accounts_from_json(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_accounts_from_json_missing_file() {
        let result = accounts_from_json("/nonexistent/accounts.json");
        assert!(matches!(result, Err(Error::AccountFile { .. })));
    }
}
