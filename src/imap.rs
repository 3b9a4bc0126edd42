//! The IMAP-backed [`MailSession`] implementation.
//!
//! [`ImapMailbox`] owns one authenticated async-imap session over TLS and
//! translates the trait operations into UID commands. Every command is
//! wrapped in a timeout from [`TimeoutConfig`](crate::config::TimeoutConfig),
//! and `IDLE` is used for [`long_poll`](MailSession::long_poll).

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_imap::extensions::idle::IdleResponse;
use async_imap::imap_proto::{AttributeValue, MailboxDatum, Response};
use async_imap::types::{Fetch, Name, NameAttribute, UnsolicitedResponse};
use async_imap::Session;
use async_trait::async_trait;
use futures::TryStreamExt;
use tokio::sync::watch;
use tracing::{debug, instrument, trace, warn};

use crate::account::Connect;
use crate::config::{AccountConfig, TimeoutConfig};
use crate::connection::{establish_tls_connection, TlsStream};
use crate::error::{Error, Result};
use crate::message::Flag;
use crate::query::Query;
use crate::session::{
    EventKind, FetchedMessage, MailSession, MailboxEvent, SpecialUse,
};

/// Type alias for IMAP session over TLS.
type ImapSession = Session<TlsStream>;

/// A live IMAP session on one mailbox.
///
/// The inner session is taken out while `IDLE` is in progress; if the `IDLE`
/// handshake fails the session is gone and every later operation reports
/// [`Error::SessionLost`] until the owner reconnects.
pub struct ImapMailbox {
    session: Option<ImapSession>,
    timeouts: TimeoutConfig,
    /// Special-use lookups are cached per connection.
    special: HashMap<&'static str, String>,
}

impl ImapMailbox {
    /// Connects, authenticates and selects the account's mailbox.
    #[instrument(
        name = "imap::connect",
        skip_all,
        fields(account = %config.name, server = %config.server_address(), read_only)
    )]
    pub async fn connect(config: &AccountConfig, read_only: bool) -> Result<Self> {
        let timeouts = config.timeouts.clone();
        let host = config.effective_imap_host();
        let addr = config.server_address();

        let tls_stream = tokio::time::timeout(
            timeouts.connect,
            establish_tls_connection(&host, &addr),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: addr.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("Authenticating");
        let client = async_imap::Client::new(tls_stream);
        let login = client.login(config.email(), config.password());
        let session = tokio::time::timeout(timeouts.auth, login)
            .await
            .map_err(|_| Error::AuthTimeout {
                email: config.email().to_string(),
                timeout: timeouts.auth,
            })?
            .map_err(|e| Error::ImapLogin {
                email: config.email().to_string(),
                source: e.0,
            })?;

        let mut mailbox = Self {
            session: Some(session),
            timeouts,
            special: HashMap::new(),
        };
        mailbox.select(&config.mailbox, read_only).await?;
        Ok(mailbox)
    }

    fn session(&mut self) -> Result<&mut ImapSession> {
        self.session.as_mut().ok_or(Error::SessionLost)
    }

    /// Collects all pending unsolicited responses without blocking.
    fn drain_unsolicited(session: &mut ImapSession) -> Vec<MailboxEvent> {
        let mut events = Vec::new();
        while let Ok(response) = session.unsolicited_responses.try_recv() {
            events.push(convert_unsolicited(&response));
        }
        events
    }
}

#[async_trait]
impl MailSession for ImapMailbox {
    #[instrument(name = "imap::select", skip(self), fields(mailbox = %mailbox))]
    async fn select(&mut self, mailbox: &str, read_only: bool) -> Result<()> {
        let timeout = self.timeouts.select;
        let session = self.session()?;

        let select = async {
            if read_only {
                session.examine(mailbox).await
            } else {
                session.select(mailbox).await
            }
        };
        tokio::time::timeout(timeout, select)
            .await
            .map_err(|_| Error::CommandTimeout {
                command: "SELECT",
                timeout,
            })?
            .map_err(|source| Error::SelectMailbox {
                mailbox: mailbox.to_string(),
                source,
            })?;
        Ok(())
    }

    #[instrument(name = "imap::search", skip_all, fields(query = %query))]
    async fn search(&mut self, query: &Query) -> Result<HashSet<u32>> {
        let rendered = query.to_imap();
        let timeout = self.timeouts.command;
        let session = self.session()?;

        let uids = tokio::time::timeout(timeout, session.uid_search(&rendered))
            .await
            .map_err(|_| Error::CommandTimeout {
                command: "SEARCH",
                timeout,
            })?
            .map_err(|source| Error::ImapSearch {
                query: rendered.clone(),
                source,
            })?;

        debug!(matched = uids.len(), "Search complete");
        Ok(uids)
    }

    #[instrument(name = "imap::fetch", skip_all, fields(count = uids.len()))]
    async fn fetch(&mut self, uids: &HashSet<u32>) -> Result<Vec<FetchedMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let set = uid_set(uids);
        let timeout = self.timeouts.fetch;
        let session = self.session()?;

        let fetch = async {
            let stream = session
                .uid_fetch(&set, "(BODY.PEEK[] FLAGS)")
                .await
                .map_err(|source| Error::ImapFetch {
                    uid_set: set.clone(),
                    source,
                })?;
            stream
                .try_collect::<Vec<Fetch>>()
                .await
                .map_err(|source| Error::ImapFetch {
                    uid_set: set.clone(),
                    source,
                })
        };
        let fetches = tokio::time::timeout(timeout, fetch)
            .await
            .map_err(|_| Error::CommandTimeout {
                command: "FETCH",
                timeout,
            })??;

        let mut messages = Vec::with_capacity(fetches.len());
        for fetch in &fetches {
            let flags = fetch.flags().map(|f| convert_flag(&f)).collect();
            if let Some(message) = convert_fetch(fetch.uid, fetch.body(), flags) {
                messages.push(message);
            }
        }
        debug!(fetched = messages.len(), "Fetch complete");
        Ok(messages)
    }

    #[instrument(name = "imap::add_flags", skip_all, fields(count = uids.len()))]
    async fn add_flags(&mut self, uids: &HashSet<u32>, flags: &[Flag]) -> Result<()> {
        store_flags(self, uids, flags, '+').await
    }

    #[instrument(name = "imap::remove_flags", skip_all, fields(count = uids.len()))]
    async fn remove_flags(&mut self, uids: &HashSet<u32>, flags: &[Flag]) -> Result<()> {
        store_flags(self, uids, flags, '-').await
    }

    #[instrument(
        name = "imap::move",
        skip_all,
        fields(count = uids.len(), mailbox = %mailbox)
    )]
    async fn move_messages(&mut self, uids: &HashSet<u32>, mailbox: &str) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }
        let set = uid_set(uids);
        let timeout = self.timeouts.command;
        let session = self.session()?;

        tokio::time::timeout(timeout, session.uid_mv(&set, mailbox))
            .await
            .map_err(|_| Error::CommandTimeout {
                command: "MOVE",
                timeout,
            })?
            .map_err(|source| Error::ImapMove {
                uid_set: set,
                folder: mailbox.to_string(),
                source,
            })?;
        Ok(())
    }

    #[instrument(name = "imap::expunge", skip_all, fields(count = uids.len()))]
    async fn expunge(&mut self, uids: &HashSet<u32>) -> Result<()> {
        if uids.is_empty() {
            return Ok(());
        }
        let set = uid_set(uids);
        let timeout = self.timeouts.command;
        let session = self.session()?;

        let expunge = async {
            let stream = session
                .uid_expunge(&set)
                .await
                .map_err(|source| Error::ImapExpunge {
                    uid_set: set.clone(),
                    source,
                })?;
            // The stream of expunged sequence numbers must be drained.
            stream
                .try_collect::<Vec<_>>()
                .await
                .map_err(|source| Error::ImapExpunge {
                    uid_set: set.clone(),
                    source,
                })?;
            Ok(())
        };
        tokio::time::timeout(timeout, expunge)
            .await
            .map_err(|_| Error::CommandTimeout {
                command: "EXPUNGE",
                timeout,
            })?
    }

    #[instrument(name = "imap::special_folder", skip(self), fields(kind = kind.attribute()))]
    async fn special_folder(&mut self, kind: SpecialUse) -> Result<String> {
        if let Some(name) = self.special.get(kind.attribute()) {
            return Ok(name.clone());
        }
        let timeout = self.timeouts.command;
        let session = self.session()?;

        let list = async {
            let stream = session
                .list(Some(""), Some("*"))
                .await
                .map_err(|source| Error::ImapList { source })?;
            stream
                .try_collect::<Vec<Name>>()
                .await
                .map_err(|source| Error::ImapList { source })
        };
        let names = tokio::time::timeout(timeout, list)
            .await
            .map_err(|_| Error::CommandTimeout {
                command: "LIST",
                timeout,
            })??;

        let found = names
            .iter()
            .find(|name| has_special_use(name, kind))
            .map(|name| name.name().to_string())
            .ok_or(Error::MissingSpecialFolder {
                kind: kind.attribute(),
            })?;

        debug!(folder = %found, "Resolved special-use folder");
        self.special.insert(kind.attribute(), found.clone());
        Ok(found)
    }

    #[instrument(name = "imap::long_poll", skip(self, stop), fields(timeout = ?timeout))]
    async fn long_poll(
        &mut self,
        timeout: Duration,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Vec<MailboxEvent>> {
        let mut session = self.session.take().ok_or(Error::SessionLost)?;

        // Events that arrived since the last command count as activity.
        let pending = Self::drain_unsolicited(&mut session);
        if !pending.is_empty() {
            self.session = Some(session);
            return Ok(pending);
        }

        let mut handle = session.idle();
        if let Err(source) = handle.init().await {
            // The session is consumed by the handle; it cannot be recovered
            // once the handshake fails.
            return Err(Error::ImapIdle { source });
        }

        // A stop signal drops the interrupt handle, which makes the wait
        // resolve with `ManualInterrupt` so the round can end with a clean
        // `DONE` and the session stays usable for logout. The wait future
        // borrows the handle, so its scope ends before `done()`.
        let waited = {
            let (idle_wait, interrupt) = handle.wait_with_timeout(timeout);
            tokio::pin!(idle_wait);
            tokio::select! {
                result = &mut idle_wait => result,
                _ = stop.changed() => {
                    drop(interrupt);
                    idle_wait.as_mut().await
                }
            }
        };
        let idle_response = match waited {
            Ok(response) => response,
            Err(source) => return Err(Error::ImapIdle { source }),
        };
        match &idle_response {
            IdleResponse::NewData(_) => trace!("IDLE woke with new data"),
            IdleResponse::Timeout => trace!("IDLE timed out, renewing"),
            IdleResponse::ManualInterrupt => trace!("IDLE interrupted"),
        }

        let mut session = match handle.done().await {
            Ok(session) => session,
            Err(source) => return Err(Error::ImapIdle { source }),
        };

        let mut events = Vec::new();
        if let IdleResponse::NewData(data) = &idle_response {
            events.push(parse_response_data(data.parsed()));
        }
        events.extend(Self::drain_unsolicited(&mut session));
        self.session = Some(session);
        Ok(events)
    }

    #[instrument(name = "imap::noop", skip(self))]
    async fn noop(&mut self) -> Result<Vec<MailboxEvent>> {
        let timeout = self.timeouts.command;
        let session = self.session()?;
        let mut events = Self::drain_unsolicited(session);

        tokio::time::timeout(timeout, session.noop())
            .await
            .map_err(|_| Error::CommandTimeout {
                command: "NOOP",
                timeout,
            })?
            .map_err(|source| Error::ImapNoop { source })?;

        events.extend(Self::drain_unsolicited(session));
        Ok(events)
    }

    #[instrument(name = "imap::logout", skip(self))]
    async fn logout(&mut self) -> Result<()> {
        let timeout = self.timeouts.logout;
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        tokio::time::timeout(timeout, session.logout())
            .await
            .map_err(|_| Error::CommandTimeout {
                command: "LOGOUT",
                timeout,
            })?
            .map_err(|source| Error::ImapLogout { source })?;
        Ok(())
    }
}

/// Connects accounts over real IMAP. This is the default [`Connect`]
/// implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImapConnector;

#[async_trait]
impl Connect for ImapConnector {
    async fn connect(
        &self,
        config: &AccountConfig,
        read_only: bool,
    ) -> Result<Box<dyn MailSession>> {
        let mailbox = ImapMailbox::connect(config, read_only).await?;
        Ok(Box::new(mailbox))
    }
}

/// Renders a UID set in ascending order, e.g. `3,7,12`.
fn uid_set(uids: &HashSet<u32>) -> String {
    let mut sorted: Vec<u32> = uids.iter().copied().collect();
    sorted.sort_unstable();
    sorted
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// `STORE +FLAGS.SILENT`/`-FLAGS.SILENT` on a UID set.
async fn store_flags(
    mailbox: &mut ImapMailbox,
    uids: &HashSet<u32>,
    flags: &[Flag],
    sign: char,
) -> Result<()> {
    if uids.is_empty() || flags.is_empty() {
        return Ok(());
    }
    let set = uid_set(uids);
    let list = flags
        .iter()
        .map(Flag::to_imap)
        .collect::<Vec<_>>()
        .join(" ");
    let command = format!("{sign}FLAGS.SILENT ({list})");
    let timeout = mailbox.timeouts.command;
    let session = mailbox.session()?;

    let store = async {
        let stream = session
            .uid_store(&set, &command)
            .await
            .map_err(|source| Error::ImapStore {
                uid_set: set.clone(),
                source,
            })?;
        // Even with .SILENT the response stream must be drained.
        stream
            .try_collect::<Vec<_>>()
            .await
            .map_err(|source| Error::ImapStore {
                uid_set: set.clone(),
                source,
            })?;
        Ok(())
    };
    tokio::time::timeout(timeout, store)
        .await
        .map_err(|_| Error::CommandTimeout {
            command: "STORE",
            timeout,
        })?
}

/// Builds a [`FetchedMessage`] from one `FETCH` response.
///
/// Responses without a UID cannot be addressed and responses without body
/// data would parse as empty messages, so both are skipped with a warning.
fn convert_fetch(uid: Option<u32>, body: Option<&[u8]>, flags: Vec<Flag>) -> Option<FetchedMessage> {
    let Some(uid) = uid else {
        warn!("Fetch response without UID, skipping");
        return None;
    };
    let Some(body) = body else {
        warn!(uid, "Fetch response without body data, skipping");
        return None;
    };
    Some(FetchedMessage {
        uid,
        raw: body.to_vec(),
        flags,
    })
}

fn convert_flag(flag: &async_imap::types::Flag<'_>) -> Flag {
    use async_imap::types::Flag as ImapFlag;
    match flag {
        ImapFlag::Seen => Flag::Seen,
        ImapFlag::Answered => Flag::Answered,
        ImapFlag::Flagged => Flag::Flagged,
        ImapFlag::Deleted => Flag::Deleted,
        ImapFlag::Draft => Flag::Draft,
        ImapFlag::Recent => Flag::Recent,
        ImapFlag::MayCreate => Flag::Custom(r"\*".to_string()),
        ImapFlag::Custom(s) => Flag::Custom(s.to_string()),
    }
}

fn has_special_use(name: &Name, kind: SpecialUse) -> bool {
    name.attributes().iter().any(|attr| {
        matches!(
            (attr, kind),
            (NameAttribute::Trash, SpecialUse::Trash)
                | (NameAttribute::Junk, SpecialUse::Junk)
                | (NameAttribute::Archive, SpecialUse::Archive)
                | (NameAttribute::Sent, SpecialUse::Sent)
                | (NameAttribute::Drafts, SpecialUse::Drafts)
        ) || matches!(attr, NameAttribute::Extension(label) if label.as_ref() == kind.attribute())
    })
}

fn convert_unsolicited(response: &UnsolicitedResponse) -> MailboxEvent {
    match response {
        UnsolicitedResponse::Exists(n) => MailboxEvent {
            seq: Some(*n),
            kind: EventKind::Exists,
        },
        UnsolicitedResponse::Recent(n) => MailboxEvent {
            seq: Some(*n),
            kind: EventKind::Recent,
        },
        UnsolicitedResponse::Expunge(n) => MailboxEvent {
            seq: Some(*n),
            kind: EventKind::Expunge,
        },
        UnsolicitedResponse::Other(data) => parse_response_data(data.parsed()),
        other => MailboxEvent {
            seq: None,
            kind: EventKind::Other(format!("{other:?}")),
        },
    }
}

fn parse_response_data(response: &Response<'_>) -> MailboxEvent {
    match response {
        Response::MailboxData(MailboxDatum::Exists(n)) => MailboxEvent {
            seq: Some(*n),
            kind: EventKind::Exists,
        },
        Response::MailboxData(MailboxDatum::Recent(n)) => MailboxEvent {
            seq: Some(*n),
            kind: EventKind::Recent,
        },
        Response::Expunge(n) => MailboxEvent {
            seq: Some(*n),
            kind: EventKind::Expunge,
        },
        Response::Fetch(seq, attrs) => {
            let flags = attrs
                .iter()
                .find_map(|attr| match attr {
                    AttributeValue::Flags(flags) => Some(
                        flags
                            .iter()
                            .map(|f| Flag::from_imap(f.as_ref()))
                            .collect::<Vec<_>>(),
                    ),
                    _ => None,
                })
                .unwrap_or_default();
            MailboxEvent {
                seq: Some(*seq),
                kind: EventKind::FlagsChanged(flags),
            }
        }
        other => MailboxEvent {
            seq: None,
            kind: EventKind::Other(format!("{other:?}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uid_set_ascending() {
        let uids: HashSet<u32> = [12, 3, 7].into_iter().collect();
        assert_eq!(uid_set(&uids), "3,7,12");
    }

    #[test]
    fn test_convert_flag() {
        use async_imap::types::Flag as ImapFlag;
        assert_eq!(convert_flag(&ImapFlag::Seen), Flag::Seen);
        assert_eq!(
            convert_flag(&ImapFlag::Custom("Junk".into())),
            Flag::Custom("Junk".into())
        );
    }

    #[test]
    fn test_convert_fetch_skips_incomplete_responses() {
        assert!(convert_fetch(None, Some(b"body"), vec![]).is_none());
        assert!(convert_fetch(Some(7), None, vec![]).is_none());

        let message = convert_fetch(Some(7), Some(b"body"), vec![Flag::Seen]).unwrap();
        assert_eq!(message.uid, 7);
        assert_eq!(message.raw, b"body");
        assert_eq!(message.flags, vec![Flag::Seen]);
    }
}
