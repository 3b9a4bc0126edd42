//! Error types for the imap-filters crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! Errors are categorized by their retryability - see [`Error::is_retryable`]. The watch
//! loop uses this classification to decide between a warning and an error log before it
//! reconnects; it reconnects either way.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during filtering and watching operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid email address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The invalid email address.
        email: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Failed to read or parse an account definition file.
    #[error("failed to load account file '{path}'")]
    AccountFile {
        /// Path of the file that failed to load.
        path: String,
        /// The underlying I/O or JSON error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    /// Invalid regular expression in a pattern criterion.
    #[error("invalid pattern: {pattern}")]
    InvalidPattern {
        /// The rejected pattern.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// A date string did not match the `DD-Mon-YYYY` IMAP date format.
    #[error("invalid date '{input}', expected DD-Mon-YYYY (e.g. 01-Jan-2025)")]
    InvalidDate {
        /// The rejected input.
        input: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Network / connection errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Timeout errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Authentication timeout.
    #[error("authentication timeout for {email} after {timeout:?}")]
    AuthTimeout {
        /// The email address used for authentication.
        email: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// A mailbox command exceeded its timeout.
    #[error("IMAP {command} timeout after {timeout:?}")]
    CommandTimeout {
        /// The command that timed out.
        command: &'static str,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IMAP protocol errors (RETRYABLE - could be transient server issues)
    // ─────────────────────────────────────────────────────────────────────────
    /// IMAP login failed.
    #[error("IMAP login failed for {email}")]
    ImapLogin {
        /// The email address used for login.
        email: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to select mailbox.
    #[error("failed to select mailbox '{mailbox}'")]
    SelectMailbox {
        /// The mailbox name.
        mailbox: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP search failed.
    #[error("IMAP search failed for query '{query}'")]
    ImapSearch {
        /// The rendered search query.
        query: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP fetch failed.
    #[error("IMAP fetch failed for UID set {uid_set}")]
    ImapFetch {
        /// The UID set that failed.
        uid_set: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP STORE (flag change) failed.
    #[error("IMAP store failed for UID set {uid_set}")]
    ImapStore {
        /// The UID set that failed.
        uid_set: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP MOVE failed.
    #[error("IMAP move to '{folder}' failed for UID set {uid_set}")]
    ImapMove {
        /// The UID set that failed.
        uid_set: String,
        /// The destination folder.
        folder: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP EXPUNGE failed.
    #[error("IMAP expunge failed for UID set {uid_set}")]
    ImapExpunge {
        /// The UID set that failed.
        uid_set: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP LIST failed while resolving a special-use folder.
    #[error("IMAP list failed")]
    ImapList {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP NOOP failed.
    #[error("IMAP NOOP command failed")]
    ImapNoop {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP IDLE failed (starting, waiting or terminating the idle state).
    #[error("IMAP IDLE failed")]
    ImapIdle {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP logout failed.
    #[error("IMAP logout failed")]
    ImapLogout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// The session was lost (e.g. the IDLE handshake failed and the
    /// connection could not be recovered).
    #[error("IMAP session lost")]
    SessionLost,

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// The server advertises no folder with the requested special use.
    #[error("no {kind} folder advertised by the server")]
    MissingSpecialFolder {
        /// The special use that could not be resolved (e.g. "Trash").
        kind: &'static str,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed on retry.
    ///
    /// The watch loop treats every error as survivable, but logs retryable ones
    /// at `warn` and the rest at `error` before reconnecting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            // RETRYABLE errors: network, timeouts, IMAP operations
            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::CommandTimeout { .. }
            | Error::ImapLogin { .. }
            | Error::SelectMailbox { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::ImapStore { .. }
            | Error::ImapMove { .. }
            | Error::ImapExpunge { .. }
            | Error::ImapList { .. }
            | Error::ImapNoop { .. }
            | Error::ImapIdle { .. }
            | Error::SessionLost => true,

            // NOT retryable: config errors, lookups, logout failures
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::AccountFile { .. }
            | Error::InvalidDnsName { .. }
            | Error::InvalidPattern { .. }
            | Error::InvalidDate { .. }
            | Error::ImapLogout { .. }
            | Error::MissingSpecialFolder { .. } => false,
        }
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::AccountFile { .. }
            | Error::InvalidDnsName { .. }
            | Error::InvalidPattern { .. }
            | Error::InvalidDate { .. } => ErrorCategory::Configuration,

            Error::TcpConnect { .. } | Error::TlsConnect { .. } => ErrorCategory::Network,

            Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::CommandTimeout { .. } => ErrorCategory::Timeout,

            Error::ImapLogin { .. }
            | Error::SelectMailbox { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::ImapStore { .. }
            | Error::ImapMove { .. }
            | Error::ImapExpunge { .. }
            | Error::ImapList { .. }
            | Error::ImapNoop { .. }
            | Error::ImapIdle { .. }
            | Error::ImapLogout { .. }
            | Error::SessionLost => ErrorCategory::Protocol,

            Error::MissingSpecialFolder { .. } => ErrorCategory::NotFound,
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP protocol errors.
    Protocol,
    /// A requested resource was not found.
    NotFound,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::NotFound => write!(f, "not_found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        // Configuration errors are not retryable
        let err = Error::InvalidEmailFormat {
            email: "bad".into(),
        };
        assert!(!err.is_retryable());

        // Network errors are retryable
        let err = Error::TcpConnect {
            target: "imap.example.com:993".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.is_retryable());

        // A lost session is retryable (the watcher reconnects)
        assert!(Error::SessionLost.is_retryable());

        // A missing special-use folder will not appear on retry
        let err = Error::MissingSpecialFolder { kind: "Trash" };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        let err = Error::InvalidEmailFormat {
            email: "bad".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = Error::ConnectTimeout {
            target: "imap.example.com:993".into(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.category(), ErrorCategory::Timeout);

        let err = Error::MissingSpecialFolder { kind: "Trash" };
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }
}
