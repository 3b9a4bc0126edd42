//! Filters: a selector plus an action on one account.
//!
//! [`CriterionFilter`] is the workhorse: select messages with a
//! [`MessageSelector`], run an [`Action`] over the batch. [`apply_filters`]
//! runs a list of filters and logs out every distinct account afterwards.
//! With `dry_run` the selection happens but the action is only logged,
//! which is the recommended way to try out a new filter set.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};

use crate::account::{logout_all, Account, SharedAccount};
use crate::action::Action;
use crate::criteria::is_starred;
use crate::criterion::{Criterion, MessageSelector};
use crate::duplicate::DuplicateScan;
use crate::error::Result;

/// A runnable filtering step.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Short description for logging.
    fn name(&self) -> &str;

    /// Selects matching messages and applies the action.
    ///
    /// With `dry_run` the selection is logged but nothing is executed.
    async fn apply(&self, dry_run: bool) -> Result<()>;

    /// The accounts this filter touches.
    fn accounts(&self) -> Vec<SharedAccount>;
}

/// Applies an action to the messages matching a selector.
pub struct CriterionFilter {
    name: String,
    account: SharedAccount,
    selector: Box<dyn MessageSelector>,
    action: Action,
    mailbox: Option<String>,
}

impl CriterionFilter {
    /// Creates a filter over the account's configured mailbox.
    #[must_use]
    pub fn new(
        account: SharedAccount,
        selector: impl MessageSelector + 'static,
        action: Action,
    ) -> Self {
        let name = format!("{} => {}", selector.describe(), action);
        Self {
            name,
            account,
            selector: Box::new(selector),
            action,
            mailbox: None,
        }
    }

    /// Overrides the mailbox this filter runs against.
    #[must_use]
    pub fn in_mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = Some(mailbox.into());
        self
    }

    async fn run(&self, account: &mut Account, mailbox: &str, dry_run: bool) -> Result<()> {
        let session = account.session().await?;
        session.select(mailbox, false).await?;

        let matched = self.selector.select(session.as_mut()).await?;
        if matched.is_empty() {
            debug!("No messages matched");
            return Ok(());
        }

        let mut uids: Vec<u32> = matched.iter().copied().collect();
        uids.sort_unstable();
        if dry_run {
            info!(?uids, "[dry-run] Would select");
            info!(action = %self.action, "[dry-run] Would execute");
            return Ok(());
        }

        info!(?uids, "Selected");
        self.action.execute(session.as_mut(), &matched).await?;
        info!(action = %self.action, "Executed");
        Ok(())
    }
}

#[async_trait]
impl Filter for CriterionFilter {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "filter::apply", skip_all, fields(filter = %self.name, dry_run))]
    async fn apply(&self, dry_run: bool) -> Result<()> {
        let mut account = self.account.lock().await;
        let mailbox = self
            .mailbox
            .clone()
            .unwrap_or_else(|| account.config().mailbox.clone());

        let result = self.run(&mut account, &mailbox, dry_run).await;
        if result.is_err() {
            // Reconnect on next use; the session state is unknown.
            account.invalidate();
        }
        result
    }

    fn accounts(&self) -> Vec<SharedAccount> {
        vec![Arc::clone(&self.account)]
    }
}

/// The distinct accounts used by a set of filters, by identity.
#[must_use]
pub fn unique_accounts(filters: &[Box<dyn Filter>]) -> Vec<SharedAccount> {
    let mut unique: Vec<SharedAccount> = Vec::new();
    for filter in filters {
        for account in filter.accounts() {
            if !unique.iter().any(|a| Arc::ptr_eq(a, &account)) {
                unique.push(account);
            }
        }
    }
    unique
}

/// Applies every filter in order, then logs out all involved accounts.
///
/// A failing filter is logged and does not stop the remaining filters; the
/// first error is returned after the logout.
///
/// # Errors
///
/// Returns the first filter error encountered, if any.
pub async fn apply_filters(filters: &[Box<dyn Filter>], dry_run: bool) -> Result<()> {
    let mut outcome = Ok(());
    for filter in filters {
        if let Err(e) = filter.apply(dry_run).await {
            error!(filter = filter.name(), error = %e, "Filter failed");
            if outcome.is_ok() {
                outcome = Err(e);
            }
        }
    }
    logout_all(&unique_accounts(filters)).await;
    outcome
}

// ─── Pre-built filters ───────────────────────────────────────────────────────

/// Moves mail from a specific sender to a folder, optionally marking it
/// read first.
#[must_use]
pub fn move_if_from(
    account: SharedAccount,
    sender: &str,
    folder: &str,
    mark_read: bool,
) -> CriterionFilter {
    let action = if mark_read {
        Action::MarkRead.then(Action::move_to(folder))
    } else {
        Action::move_to(folder)
    };
    CriterionFilter::new(account, crate::criteria::from_is(sender), action)
}

/// Moves mail addressed to a specific correspondent to a folder.
///
/// Checks the To field and optionally CC and BCC; optionally marks the
/// mail read before moving.
#[must_use]
pub fn move_if_to(
    account: SharedAccount,
    correspondent: &str,
    folder: &str,
    include_cc: bool,
    include_bcc: bool,
    mark_read: bool,
) -> CriterionFilter {
    let mut criterion = crate::criteria::to_is(correspondent);
    if include_cc {
        criterion = criterion.or(crate::criteria::cc_is(correspondent));
    }
    if include_bcc {
        criterion = criterion.or(crate::criteria::bcc_is(correspondent));
    }
    let action = if mark_read {
        Action::MarkRead.then(Action::move_to(folder))
    } else {
        Action::move_to(folder)
    };
    CriterionFilter::new(account, criterion, action)
}

/// Processes starred ("handled") mail: matching starred messages are
/// unstarred and then the given action runs.
///
/// Meant for workflows where starring marks a message as dealt with and a
/// later filter pass archives or files it.
#[must_use]
pub fn process_handled(
    account: SharedAccount,
    criterion: Criterion,
    action: Action,
) -> CriterionFilter {
    CriterionFilter::new(
        account,
        criterion.and(is_starred()),
        Action::Unstar.then(action),
    )
}

/// Moves duplicate messages to the trash folder, keeping the oldest copy
/// of each.
#[must_use]
pub fn remove_duplicates(account: SharedAccount) -> CriterionFilter {
    CriterionFilter::new(account, DuplicateScan, Action::Trash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::shared;
    use crate::config::AccountConfig;

    fn account(name: &str) -> SharedAccount {
        shared(Account::new(
            AccountConfig::builder()
                .name(name)
                .email("user@example.com")
                .password("pw")
                .imap_host("localhost")
                .build()
                .unwrap(),
        ))
    }

    #[test]
    fn test_unique_accounts_dedups_by_identity() {
        let a = account("a");
        let b = account("b");
        let filters: Vec<Box<dyn Filter>> = vec![
            Box::new(move_if_from(Arc::clone(&a), "x@example.com", "X", true)),
            Box::new(move_if_from(Arc::clone(&a), "y@example.com", "Y", true)),
            Box::new(remove_duplicates(Arc::clone(&b))),
        ];
        let unique = unique_accounts(&filters);
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn test_filter_names() {
        let f = move_if_from(account("a"), "x@example.com", "Archive", true);
        assert_eq!(
            f.name(),
            "from is x@example.com => mark as read; move to Archive"
        );
        let f = remove_duplicates(account("b"));
        assert_eq!(f.name(), "duplicates => trash");
    }

    #[test]
    fn test_process_handled_composition() {
        let f = process_handled(
            account("a"),
            crate::criteria::from_is("x@example.com"),
            Action::move_to("Done"),
        );
        assert_eq!(
            f.name(),
            "(from is x@example.com and starred) => unstar; move to Done"
        );
    }

    #[test]
    fn test_move_if_to_name_includes_cc_bcc() {
        let f = move_if_to(account("a"), "me@example.com", "Personal", true, false, false);
        assert_eq!(
            f.name(),
            "(to is me@example.com or cc is me@example.com) => move to Personal"
        );
    }
}
