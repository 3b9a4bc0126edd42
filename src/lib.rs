//! # imap-filters
//!
//! Async IMAP mail filtering: composable criteria, chainable actions, and a
//! reconnect-resilient `IDLE` watcher for reacting to mailbox changes in
//! real time.
//!
//! The crate is built around three ideas:
//!
//! - A [`Criterion`] combines a server-side search query with a client-side
//!   predicate and pushes as much work to the server as soundness allows.
//!   Criteria compose with [`and`](Criterion::and), [`or`](Criterion::or)
//!   and [`not`](Criterion::not).
//! - An [`Action`] describes what happens to the matched batch and chains
//!   with [`then`](Action::then).
//! - A [`Filter`] ties a selector and an action to one [`Account`];
//!   [`apply_filters`] runs a filter list and logs everything out.
//!
//! ## Quick Start
//!
//! ```no_run
//! use imap_filters::{
//!     apply_filters, criteria, shared, Account, AccountConfig, Action,
//!     CriterionFilter, Filter,
//! };
//!
//! # async fn example() -> imap_filters::Result<()> {
//! let config = AccountConfig::builder()
//!     .name("personal")
//!     .email("user@gmail.com")
//!     .password("app-password") // Use an app-specific password for Gmail
//!     .build()?;
//! let account = shared(Account::new(config));
//!
//! // Newsletters older than a month: mark read and archive.
//! let stale = criteria::from_contains("@newsletter.example.com")
//!     .and(criteria::older_than("01-Jul-2026".parse::<imap_filters::criteria::DateCutoff>()?));
//! let filters: Vec<Box<dyn Filter>> = vec![Box::new(CriterionFilter::new(
//!     account,
//!     stale,
//!     Action::MarkRead.then(Action::move_to("Archive")),
//! ))];
//!
//! // Try it with dry_run = true first; nothing is modified.
//! apply_filters(&filters, true).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Watching a Mailbox
//!
//! ```no_run
//! use imap_filters::watch::{filters_on_new_mail, print_events, Watcher};
//!
//! # async fn example(account: imap_filters::SharedAccount,
//! #                  filters: Vec<Box<dyn imap_filters::Filter>>) -> imap_filters::Result<()> {
//! let reaction = print_events().chain(filters_on_new_mail(filters));
//! let watcher = Watcher::start(account, reaction).await?;
//! tokio::signal::ctrl_c().await.ok();
//! watcher.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All errors implement `std::error::Error` and provide context. Use
//! [`Error::is_retryable`] to distinguish transient failures; the watcher
//! uses the same classification when deciding how loudly to log before it
//! reconnects.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod account;
pub mod action;
pub mod config;
pub mod criteria;
pub mod criterion;
pub mod duplicate;
pub mod error;
pub mod filter;
pub mod imap;
pub mod known_servers;
pub mod message;
pub mod query;
pub mod session;
pub mod watch;

// Internal modules
mod connection;

// Re-exports for ergonomic API
pub use account::{logout_all, shared, Account, Connect, SharedAccount};
pub use action::Action;
pub use config::{accounts_from_json, AccountConfig, AccountConfigBuilder, TimeoutConfig};
pub use criterion::{Criterion, MessageSelector};
pub use duplicate::DuplicateScan;
pub use email_address::EmailAddress;
pub use error::{Error, ErrorCategory, Result};
pub use filter::{
    apply_filters, move_if_from, move_if_to, process_handled, remove_duplicates, unique_accounts,
    CriterionFilter, Filter,
};
pub use known_servers::ServerRegistry;
pub use message::{Address, Flag, ParsedMessage};
pub use query::Query;
pub use session::{EventKind, FetchedMessage, MailSession, MailboxEvent, SpecialUse};
pub use watch::{Reaction, Watcher};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        // Ensure all public types are accessible
        let _ = AccountConfig::builder();
        let _ = criteria::is_unread().and(criteria::from_contains("@example.com"));
        let _ = Action::MarkRead.then(Action::Trash);
        let _ = DuplicateScan;
    }
}
