//! The mailbox session abstraction.
//!
//! [`MailSession`] is the seam between the filter engine and the network:
//! everything above it (criteria, actions, filters, the watcher) is written
//! against this trait, and the concrete IMAP implementation lives in
//! [`crate::imap`]. Tests substitute an in-memory implementation.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::Result;
use crate::message::Flag;
use crate::query::Query;

/// Well-known special-use mailboxes, as advertised via `SPECIAL-USE`
/// attributes on `LIST` (RFC 6154).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialUse {
    /// The trash folder (`\Trash`).
    Trash,
    /// The junk/spam folder (`\Junk`).
    Junk,
    /// The archive folder (`\Archive`).
    Archive,
    /// The sent folder (`\Sent`).
    Sent,
    /// The drafts folder (`\Drafts`).
    Drafts,
}

impl SpecialUse {
    /// The attribute name, for error messages.
    #[must_use]
    pub fn attribute(self) -> &'static str {
        match self {
            SpecialUse::Trash => r"\Trash",
            SpecialUse::Junk => r"\Junk",
            SpecialUse::Archive => r"\Archive",
            SpecialUse::Sent => r"\Sent",
            SpecialUse::Drafts => r"\Drafts",
        }
    }
}

/// A message as returned by a UID fetch: its UID, raw bytes and flags.
#[derive(Debug, Clone)]
pub struct FetchedMessage {
    /// The message UID within the selected mailbox.
    pub uid: u32,
    /// The raw RFC 2822 message bytes.
    pub raw: Vec<u8>,
    /// The flags set on the message at fetch time.
    pub flags: Vec<Flag>,
}

/// What changed in a watched mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `EXISTS` - the mailbox message count changed; usually new mail.
    Exists,
    /// `RECENT` - the recent-count changed.
    Recent,
    /// `EXPUNGE` - a message was removed.
    Expunge,
    /// A `FETCH` carrying updated flags for a message.
    FlagsChanged(Vec<Flag>),
    /// Any other unsolicited response, kept for logging.
    Other(String),
}

/// One unsolicited mailbox event observed during a long poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxEvent {
    /// The message sequence number the event refers to, when it has one.
    pub seq: Option<u32>,
    /// What kind of change this is.
    pub kind: EventKind,
}

impl MailboxEvent {
    /// `true` for events that signal mail arriving (`EXISTS`).
    #[must_use]
    pub fn is_new_mail(&self) -> bool {
        self.kind == EventKind::Exists
    }

    /// `true` for flag updates that include `\Seen`, i.e. a message
    /// was marked read.
    #[must_use]
    pub fn is_marked_read(&self) -> bool {
        matches!(&self.kind, EventKind::FlagsChanged(flags) if flags.contains(&Flag::Seen))
    }
}

/// An authenticated session on one mailbox of one account.
///
/// All message-addressing is by UID. Implementations select the target
/// mailbox via [`select`](MailSession::select) before any of the other
/// operations are used.
#[async_trait]
pub trait MailSession: Send + Sync {
    /// Selects a mailbox, read-write or read-only.
    async fn select(&mut self, mailbox: &str, read_only: bool) -> Result<()>;

    /// Runs a server-side `UID SEARCH` and returns the matching UIDs.
    async fn search(&mut self, query: &Query) -> Result<HashSet<u32>>;

    /// Fetches the raw bodies and flags of the given UIDs.
    ///
    /// Fetching preserves the unread state of the messages (`BODY.PEEK`).
    async fn fetch(&mut self, uids: &HashSet<u32>) -> Result<Vec<FetchedMessage>>;

    /// Adds flags to the given UIDs.
    async fn add_flags(&mut self, uids: &HashSet<u32>, flags: &[Flag]) -> Result<()>;

    /// Removes flags from the given UIDs.
    async fn remove_flags(&mut self, uids: &HashSet<u32>, flags: &[Flag]) -> Result<()>;

    /// Moves the given UIDs to another mailbox.
    async fn move_messages(&mut self, uids: &HashSet<u32>, mailbox: &str) -> Result<()>;

    /// Expunges the given UIDs (permanently removes `\Deleted` messages).
    async fn expunge(&mut self, uids: &HashSet<u32>) -> Result<()>;

    /// Resolves a special-use mailbox name via `LIST`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MissingSpecialFolder`](crate::Error) when the
    /// server advertises no mailbox with the requested attribute.
    async fn special_folder(&mut self, kind: SpecialUse) -> Result<String>;

    /// Blocks until the mailbox changes, the timeout elapses, or `stop`
    /// signals, returning the observed events (empty on timeout or stop).
    ///
    /// Implementations use `IDLE`; the timeout keeps the connection inside
    /// the 29-minute window RFC 2177 allows before servers may drop it.
    /// When `stop` changes, the wait is interrupted and the `IDLE` round is
    /// ended cleanly (`DONE`), so the session stays usable for a final
    /// [`logout`](MailSession::logout).
    async fn long_poll(
        &mut self,
        timeout: Duration,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Vec<MailboxEvent>>;

    /// Sends `NOOP`, collecting any pending unsolicited events.
    async fn noop(&mut self) -> Result<Vec<MailboxEvent>>;

    /// Logs out and closes the connection.
    async fn logout(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_classification() {
        let new_mail = MailboxEvent {
            seq: Some(5),
            kind: EventKind::Exists,
        };
        assert!(new_mail.is_new_mail());
        assert!(!new_mail.is_marked_read());

        let read = MailboxEvent {
            seq: Some(3),
            kind: EventKind::FlagsChanged(vec![Flag::Seen, Flag::Answered]),
        };
        assert!(read.is_marked_read());
        assert!(!read.is_new_mail());

        let starred = MailboxEvent {
            seq: Some(3),
            kind: EventKind::FlagsChanged(vec![Flag::Flagged]),
        };
        assert!(!starred.is_marked_read());
    }

    #[test]
    fn test_special_use_attributes() {
        assert_eq!(SpecialUse::Trash.attribute(), r"\Trash");
        assert_eq!(SpecialUse::Archive.attribute(), r"\Archive");
    }

    #[test]
    fn test_session_objects_are_thread_shareable() {
        // Watchers move boxed sessions into spawned tasks, which requires
        // the trait object to be both Send and Sync.
        fn assert_shareable<T: Send + Sync + ?Sized>() {}
        assert_shareable::<dyn MailSession>();
    }
}
