//! IMAP server discovery from email domains.
//!
//! Maps common email provider domains to their IMAP hostnames so account
//! configs only need an explicit host for unusual setups.
//!
//! # Example
//!
//! ```
//! use imap_filters::known_servers::{ServerRegistry, discover_imap_host};
//!
//! assert_eq!(discover_imap_host("user@gmail.com"), "imap.gmail.com");
//!
//! let mut registry = ServerRegistry::with_defaults();
//! registry.register("mycompany.com", "mail.mycompany.com");
//! assert_eq!(registry.discover("user@mycompany.com"), "mail.mycompany.com");
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Map of email domains to their IMAP server hostnames.
static KNOWN_SERVERS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let mut m = HashMap::new();

    // Google
    m.insert("gmail.com", "imap.gmail.com");
    m.insert("googlemail.com", "imap.gmail.com");

    // Microsoft
    m.insert("hotmail.com", "outlook.office365.com");
    m.insert("outlook.com", "outlook.office365.com");
    m.insert("live.com", "outlook.office365.com");

    // Yahoo
    m.insert("yahoo.com", "imap.mail.yahoo.com");

    // Apple
    m.insert("icloud.com", "imap.mail.me.com");
    m.insert("me.com", "imap.mail.me.com");
    m.insert("mac.com", "imap.mail.me.com");

    // Fastmail
    m.insert("fastmail.com", "imap.fastmail.com");
    m.insert("fastmail.fm", "imap.fastmail.com");

    // German providers
    m.insert("web.de", "imap.web.de");
    m.insert("gmx.de", "imap.gmx.net");
    m.insert("gmx.net", "imap.gmx.net");
    m.insert("gmx.com", "imap.gmx.net");
    m.insert("t-online.de", "secureimap.t-online.de");
    m.insert("mailbox.org", "imap.mailbox.org");
    m.insert("posteo.de", "posteo.de");

    // AOL
    m.insert("aol.com", "imap.aol.com");

    // Zoho
    m.insert("zoho.com", "imap.zoho.com");

    m
});

/// A customizable registry for IMAP server discovery.
///
/// Allows custom domain-to-IMAP-host mappings at runtime, in addition to (or
/// overriding) the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    custom: HashMap<String, String>,
    use_defaults: bool,
}

impl ServerRegistry {
    /// Creates an empty registry without built-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that includes built-in default mappings.
    ///
    /// Custom mappings added via [`Self::register`] override defaults.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            custom: HashMap::new(),
            use_defaults: true,
        }
    }

    /// Registers a custom domain-to-IMAP-host mapping.
    ///
    /// Overrides any existing mapping, including built-in defaults.
    pub fn register(&mut self, domain: impl Into<String>, imap_host: impl Into<String>) {
        self.custom
            .insert(domain.into().to_lowercase(), imap_host.into());
    }

    /// Registers multiple domain mappings at once.
    pub fn register_many<I, D, H>(&mut self, mappings: I)
    where
        I: IntoIterator<Item = (D, H)>,
        D: Into<String>,
        H: Into<String>,
    {
        for (domain, host) in mappings {
            self.register(domain, host);
        }
    }

    /// Discovers the IMAP hostname for an email address.
    ///
    /// Resolution order:
    /// 1. Custom mappings (added via [`Self::register`])
    /// 2. Built-in defaults (if [`Self::with_defaults`] was used)
    /// 3. Fallback to `imap.{domain}`
    #[must_use]
    pub fn discover(&self, email: &str) -> Cow<'_, str> {
        let domain = email.split('@').nth(1).unwrap_or(email).to_lowercase();

        if let Some(host) = self.custom.get(&domain) {
            return Cow::Borrowed(host);
        }

        if self.use_defaults {
            if let Some(&host) = KNOWN_SERVERS.get(domain.as_str()) {
                return Cow::Borrowed(host);
            }
        }

        Cow::Owned(format!("imap.{domain}"))
    }

    /// Returns `true` if the domain has a known IMAP server mapping.
    #[must_use]
    pub fn is_known(&self, domain: &str) -> bool {
        let domain_lower = domain.to_lowercase();
        self.custom.contains_key(&domain_lower)
            || (self.use_defaults && KNOWN_SERVERS.contains_key(domain_lower.as_str()))
    }
}

/// Discovers the IMAP hostname for an email address.
///
/// If the domain is known, returns the corresponding IMAP server.
/// Otherwise, returns a default of `imap.{domain}`.
///
/// # Example
///
/// ```
/// use imap_filters::known_servers::discover_imap_host;
///
/// assert_eq!(discover_imap_host("user@gmail.com"), "imap.gmail.com");
/// assert_eq!(discover_imap_host("user@custom.org"), "imap.custom.org");
/// ```
#[must_use]
pub fn discover_imap_host(email: &str) -> String {
    let domain = email.split('@').nth(1).unwrap_or(email).to_lowercase();

    KNOWN_SERVERS
        .get(domain.as_str())
        .map_or_else(|| format!("imap.{domain}"), |&s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_providers() {
        assert_eq!(discover_imap_host("user@gmail.com"), "imap.gmail.com");
        assert_eq!(
            discover_imap_host("user@outlook.com"),
            "outlook.office365.com"
        );
        assert_eq!(discover_imap_host("user@icloud.com"), "imap.mail.me.com");
    }

    #[test]
    fn test_unknown_domain_fallback() {
        assert_eq!(discover_imap_host("user@example.com"), "imap.example.com");
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(discover_imap_host("user@GMAIL.COM"), "imap.gmail.com");
    }

    #[test]
    fn test_registry_empty() {
        let registry = ServerRegistry::new();
        assert!(!registry.is_known("gmail.com"));
        assert_eq!(
            registry.discover("user@gmail.com").as_ref(),
            "imap.gmail.com"
        );
    }

    #[test]
    fn test_registry_with_defaults() {
        let registry = ServerRegistry::with_defaults();
        assert!(registry.is_known("gmail.com"));
        assert_eq!(
            registry.discover("user@gmail.com").as_ref(),
            "imap.gmail.com"
        );
    }

    #[test]
    fn test_registry_custom_overrides_default() {
        let mut registry = ServerRegistry::with_defaults();
        registry.register("gmail.com", "custom-gmail.example.com");

        assert_eq!(
            registry.discover("user@gmail.com").as_ref(),
            "custom-gmail.example.com"
        );
    }

    #[test]
    fn test_registry_register_many_case_insensitive() {
        let mut registry = ServerRegistry::new();
        registry.register_many([
            ("Corp.COM", "mail.corp.com"),
            ("partner.org", "imap.partner.org"),
        ]);

        assert!(registry.is_known("CORP.com"));
        assert_eq!(registry.discover("user@corp.com").as_ref(), "mail.corp.com");
    }
}
