//! Real-time mailbox monitoring over `IDLE`.
//!
//! A [`Watcher`] runs a background task that long-polls one account's
//! mailbox on a dedicated read-only session and feeds every batch of
//! [`MailboxEvent`]s to a [`Reaction`]. A quiet round delivers an empty
//! batch, so a reaction that triggers unconditionally doubles as a periodic
//! sweep. Errors never kill the task: the watcher logs the broken session
//! out best-effort, waits briefly and reconnects, so a flaky network or a
//! server restart only delays the next event.
//!
//! ```no_run
//! # async fn demo(account: imap_filters::SharedAccount,
//! #               filters: Vec<Box<dyn imap_filters::Filter>>) -> imap_filters::Result<()> {
//! use imap_filters::watch::{filters_on_new_mail, Watcher};
//!
//! let watcher = Watcher::start(account, filters_on_new_mail(filters)).await?;
//! // ... until shutdown:
//! watcher.stop().await;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::account::SharedAccount;
use crate::error::Result;
use crate::filter::{apply_filters, Filter};
use crate::session::{MailSession, MailboxEvent};

/// How long one `IDLE` round lasts before it is renewed.
///
/// RFC 2177 lets servers drop idle clients after 29 minutes; staying under
/// that keeps the connection alive indefinitely.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(25 * 60);

/// Pause between reconnect attempts after a watch error.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// An async callback invoked with each batch of mailbox events.
#[derive(Clone)]
pub struct Reaction {
    name: String,
    func: Arc<dyn Fn(Vec<MailboxEvent>) -> BoxFuture<'static, ()> + Send + Sync>,
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Reaction {
    /// Creates a reaction from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<MailboxEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |events| func(events).boxed()),
        }
    }

    /// The reaction's name, as used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Chains another reaction; both receive the same event batch, in order.
    #[must_use]
    pub fn chain(self, other: Reaction) -> Reaction {
        let name = format!("{}; {}", self.name, other.name);
        let first = self.func;
        let second = other.func;
        Reaction {
            name,
            func: Arc::new(move |events: Vec<MailboxEvent>| {
                let first = Arc::clone(&first);
                let second = Arc::clone(&second);
                async move {
                    first(events.clone()).await;
                    second(events).await;
                }
                .boxed()
            }),
        }
    }

    pub(crate) async fn run(&self, events: Vec<MailboxEvent>) {
        (self.func)(events).await;
    }
}

/// Logs every received event.
#[must_use]
pub fn print_events() -> Reaction {
    Reaction::new("print events", |events| async move {
        for event in events {
            info!(?event, "Mailbox event");
        }
    })
}

/// Applies the filters on every watch round, with or without activity.
///
/// Since quiet `IDLE` rounds also deliver a (then empty) batch, this runs
/// the filters at least once per [`IDLE_TIMEOUT`].
#[must_use]
pub fn filters_on_any(filters: Vec<Box<dyn Filter>>) -> Reaction {
    filters_when("apply filters", filters, |_| true)
}

/// Applies the filters only when new mail arrives (`EXISTS`).
#[must_use]
pub fn filters_on_new_mail(filters: Vec<Box<dyn Filter>>) -> Reaction {
    filters_when("apply filters on new mail", filters, |events| {
        events.iter().any(MailboxEvent::is_new_mail)
    })
}

/// Applies the filters only when a message is marked read.
#[must_use]
pub fn filters_on_read(filters: Vec<Box<dyn Filter>>) -> Reaction {
    filters_when("apply filters on read", filters, |events| {
        events.iter().any(MailboxEvent::is_marked_read)
    })
}

fn filters_when(
    name: &str,
    filters: Vec<Box<dyn Filter>>,
    trigger: impl Fn(&[MailboxEvent]) -> bool + Send + Sync + 'static,
) -> Reaction {
    let filters = Arc::new(filters);
    Reaction::new(name, move |events| {
        let filters = Arc::clone(&filters);
        let run = trigger(&events);
        async move {
            if !run {
                debug!("No triggering event in batch");
                return;
            }
            if let Err(error) = apply_filters(&filters, false).await {
                error!(%error, "Filter run failed");
            }
        }
    })
}

/// A running background watch on one account.
pub struct Watcher {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Watcher {
    /// Opens a dedicated read-only session and starts watching.
    ///
    /// Connection errors at startup are returned directly; once the watcher
    /// runs, errors are survived by reconnecting.
    ///
    /// # Errors
    ///
    /// Propagates the initial connection failure.
    pub async fn start(account: SharedAccount, reaction: Reaction) -> Result<Self> {
        let (name, session) = {
            let guard = account.lock().await;
            let session = guard.extra_session(true).await?;
            (guard.name().to_string(), session)
        };
        info!(account = %name, reaction = %reaction.name, "Watcher started");

        let (stop, stop_rx) = watch::channel(false);
        let span = info_span!("watcher", account = %name);
        let handle = tokio::spawn(watch_loop(account, reaction, session, stop_rx).instrument(span));
        Ok(Self { stop, handle })
    }

    /// Signals the watch task to stop and waits for it to finish.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(error) = self.handle.await {
            error!(%error, "Watch task panicked");
        }
    }
}

async fn watch_loop(
    account: SharedAccount,
    reaction: Reaction,
    session: Box<dyn MailSession>,
    mut stop: watch::Receiver<bool>,
) {
    if let Some(mut session) = watch_rounds(&account, &reaction, session, &mut stop).await {
        if let Err(error) = session.logout().await {
            debug!(%error, "Logout during shutdown failed");
        }
    }
    info!("Watcher stopped");
}

/// Runs `IDLE` rounds until a stop is requested, returning the session that
/// should be logged out (`None` when the stop arrived mid-reconnect and the
/// old session was already torn down).
async fn watch_rounds(
    account: &SharedAccount,
    reaction: &Reaction,
    mut session: Box<dyn MailSession>,
    stop: &mut watch::Receiver<bool>,
) -> Option<Box<dyn MailSession>> {
    loop {
        let polled = session.long_poll(IDLE_TIMEOUT, stop).await;
        if *stop.borrow() {
            return Some(session);
        }
        match polled {
            Ok(events) => {
                if events.is_empty() {
                    debug!("IDLE round elapsed without activity");
                } else {
                    debug!(count = events.len(), "Mailbox activity");
                }
                // An empty batch still runs the reaction: a reaction that
                // triggers on anything doubles as a periodic sweep.
                reaction.run(events).await;
                // Keepalive; also picks up events that arrived while the
                // reaction ran.
                if let Err(error) = session.noop().await {
                    warn!(%error, "Keepalive failed, reconnecting");
                    session = replace_session(session, account, stop).await?;
                }
            }
            Err(error) => {
                if error.is_retryable() {
                    warn!(%error, "Watch error, reconnecting");
                } else {
                    error!(%error, "Watch error, reconnecting");
                }
                session = replace_session(session, account, stop).await?;
            }
        }
    }
}

/// Tears down a broken session with a best-effort logout, then reconnects.
async fn replace_session(
    mut broken: Box<dyn MailSession>,
    account: &SharedAccount,
    stop: &mut watch::Receiver<bool>,
) -> Option<Box<dyn MailSession>> {
    if let Err(error) = broken.logout().await {
        debug!(%error, "Logout of broken session failed");
    }
    drop(broken);
    reconnect(account, stop).await
}

/// Reconnects after a delay, retrying until it succeeds or a stop is
/// requested.
async fn reconnect(
    account: &SharedAccount,
    stop: &mut watch::Receiver<bool>,
) -> Option<Box<dyn MailSession>> {
    loop {
        if *stop.borrow() {
            return None;
        }
        tokio::select! {
            _ = stop.changed() => return None,
            () = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
        let attempt = account.lock().await.extra_session(true).await;
        match attempt {
            Ok(session) => {
                info!("Reconnected");
                return Some(session);
            }
            Err(error) => warn!(%error, "Reconnect failed, retrying"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::EventKind;
    use std::sync::Mutex;

    fn event(kind: EventKind) -> MailboxEvent {
        MailboxEvent { seq: Some(1), kind }
    }

    #[tokio::test]
    async fn test_chain_runs_in_order_with_same_batch() {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let log_a = Arc::clone(&log);
        let a = Reaction::new("a", move |events| {
            let log = Arc::clone(&log_a);
            async move {
                log.lock().unwrap().push(format!("a:{}", events.len()));
            }
        });
        let log_b = Arc::clone(&log);
        let b = Reaction::new("b", move |events| {
            let log = Arc::clone(&log_b);
            async move {
                log.lock().unwrap().push(format!("b:{}", events.len()));
            }
        });

        let chained = a.chain(b);
        assert_eq!(chained.name(), "a; b");
        chained
            .run(vec![event(EventKind::Exists), event(EventKind::Recent)])
            .await;
        assert_eq!(*log.lock().unwrap(), vec!["a:2", "b:2"]);
    }

    #[test]
    fn test_event_triggers() {
        let new_mail = [event(EventKind::Exists)];
        let read = [event(EventKind::FlagsChanged(vec![crate::Flag::Seen]))];
        let expunge = [event(EventKind::Expunge)];

        assert!(new_mail.iter().any(MailboxEvent::is_new_mail));
        assert!(!read.iter().any(MailboxEvent::is_new_mail));
        assert!(read.iter().any(MailboxEvent::is_marked_read));
        assert!(!expunge.iter().any(MailboxEvent::is_marked_read));
    }
}
