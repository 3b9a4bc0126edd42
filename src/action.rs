//! Actions applied to matched messages.
//!
//! An [`Action`] is a declarative description of what to do with a batch of
//! UIDs. Actions chain with [`then`](Action::then); a chain runs each step
//! over the whole batch before moving to the next, so `mark_read` followed
//! by `move_to` marks every message read and only then moves them all.

use std::collections::HashSet;
use std::fmt;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::debug;

use crate::error::Result;
use crate::message::Flag;
use crate::session::{MailSession, SpecialUse};

/// What to do with a batch of matched messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Move the messages to the named folder.
    MoveTo(String),
    /// Move the messages to the server's trash folder (resolved via
    /// special-use `LIST`).
    Trash,
    /// Set `\Seen`.
    MarkRead,
    /// Clear `\Seen`.
    MarkUnread,
    /// Set `\Flagged`.
    Star,
    /// Clear `\Flagged`.
    Unstar,
    /// Set `\Answered`.
    MarkAnswered,
    /// Clear `\Answered`.
    MarkUnanswered,
    /// Set `\Deleted` and expunge the messages permanently.
    Delete,
    /// Run the inner actions in order, each over the whole batch.
    Seq(Vec<Action>),
}

impl Action {
    /// Creates a move action.
    #[must_use]
    pub fn move_to(folder: impl Into<String>) -> Self {
        Action::MoveTo(folder.into())
    }

    /// Chains another action after this one, flattening nested sequences.
    #[must_use]
    pub fn then(self, other: Action) -> Action {
        let mut steps = match self {
            Action::Seq(steps) => steps,
            action => vec![action],
        };
        match other {
            Action::Seq(mut more) => steps.append(&mut more),
            action => steps.push(action),
        }
        Action::Seq(steps)
    }

    /// Executes the action against the given UIDs.
    ///
    /// Boxed because [`Action::Seq`] recurses.
    pub(crate) fn execute<'a>(
        &'a self,
        session: &'a mut dyn MailSession,
        uids: &'a HashSet<u32>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            match self {
                Action::MoveTo(folder) => session.move_messages(uids, folder).await,
                Action::Trash => {
                    let trash = session.special_folder(SpecialUse::Trash).await?;
                    session.move_messages(uids, &trash).await
                }
                Action::MarkRead => session.add_flags(uids, &[Flag::Seen]).await,
                Action::MarkUnread => session.remove_flags(uids, &[Flag::Seen]).await,
                Action::Star => session.add_flags(uids, &[Flag::Flagged]).await,
                Action::Unstar => session.remove_flags(uids, &[Flag::Flagged]).await,
                Action::MarkAnswered => session.add_flags(uids, &[Flag::Answered]).await,
                Action::MarkUnanswered => session.remove_flags(uids, &[Flag::Answered]).await,
                Action::Delete => {
                    session.add_flags(uids, &[Flag::Deleted]).await?;
                    session.expunge(uids).await
                }
                Action::Seq(steps) => {
                    for step in steps {
                        debug!(action = %step, "Executing step");
                        step.execute(session, uids).await?;
                    }
                    Ok(())
                }
            }
        }
        .boxed()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::MoveTo(folder) => write!(f, "move to {folder}"),
            Action::Trash => f.write_str("trash"),
            Action::MarkRead => f.write_str("mark as read"),
            Action::MarkUnread => f.write_str("mark as unread"),
            Action::Star => f.write_str("star"),
            Action::Unstar => f.write_str("unstar"),
            Action::MarkAnswered => f.write_str("mark as answered"),
            Action::MarkUnanswered => f.write_str("mark as unanswered"),
            Action::Delete => f.write_str("delete"),
            Action::Seq(steps) => {
                let names: Vec<String> = steps.iter().map(ToString::to_string).collect();
                f.write_str(&names.join("; "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_then_flattens() {
        let chain = Action::MarkRead
            .then(Action::move_to("Archive"))
            .then(Action::Unstar.then(Action::Delete));
        match &chain {
            Action::Seq(steps) => assert_eq!(steps.len(), 4),
            other => panic!("expected Seq, got {other:?}"),
        }
    }

    #[test]
    fn test_display_joins_with_semicolons() {
        let chain = Action::MarkRead.then(Action::move_to("Archive"));
        assert_eq!(chain.to_string(), "mark as read; move to Archive");
        assert_eq!(Action::Trash.to_string(), "trash");
    }
}
