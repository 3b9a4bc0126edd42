//! Composable filtering criteria.
//!
//! A [`Criterion`] pairs a client-side predicate over a [`ParsedMessage`]
//! with an optional server-side [`Query`]. The query is a pre-filter: it
//! must match at least every message the predicate matches, so the engine
//! only fetches and parses the candidates it returns. A criterion whose
//! query matches *exactly* the messages its predicate matches is *exact*,
//! and evaluation skips fetching entirely.
//!
//! Criteria combine with [`and`](Criterion::and), [`or`](Criterion::or) and
//! [`not`](Criterion::not). Combination keeps the query only where doing so
//! cannot lose matches:
//!
//! - `and`: both queries merge; if only one side has a query it still
//!   pre-filters, since every conjunction match must match it.
//! - `or`: the queries merge only if both sides have one; otherwise a
//!   query-less search is required to avoid missing matches.
//! - `not`: the query is negated only if the criterion is exact; negating
//!   a mere pre-filter would exclude messages the result must select.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::message::ParsedMessage;
use crate::query::Query;
use crate::session::MailSession;

/// Shared client-side predicate over a parsed message.
pub type Predicate = Arc<dyn Fn(&ParsedMessage) -> bool + Send + Sync>;

/// Selects a set of message UIDs in the currently selected mailbox.
///
/// Implemented by [`Criterion`] and by scans that cannot be expressed as a
/// per-message predicate, such as [`DuplicateScan`](crate::DuplicateScan).
#[async_trait]
pub trait MessageSelector: Send + Sync {
    /// Evaluates the selector against the mailbox.
    async fn select(&self, session: &mut dyn MailSession) -> Result<HashSet<u32>>;

    /// Short human-readable description for logging.
    fn describe(&self) -> String;
}

/// A filtering condition over messages.
#[derive(Clone)]
pub struct Criterion {
    name: String,
    predicate: Predicate,
    query: Option<Query>,
    exact: bool,
}

impl fmt::Debug for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Criterion")
            .field("name", &self.name)
            .field("query", &self.query)
            .field("exact", &self.exact)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Criterion {
    /// Creates a criterion evaluated purely client-side.
    ///
    /// Every message in the mailbox is fetched and tested against the
    /// predicate.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&ParsedMessage) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            query: None,
            exact: false,
        }
    }

    /// Creates a criterion with a server-side pre-filter.
    ///
    /// The query must match a superset of the messages the predicate
    /// matches; only its results are fetched and tested.
    pub fn with_query<F>(name: impl Into<String>, predicate: F, query: Query) -> Self
    where
        F: Fn(&ParsedMessage) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            query: Some(query),
            exact: false,
        }
    }

    /// Creates an exact criterion: the query matches precisely the messages
    /// the predicate matches, so evaluation needs no fetching.
    ///
    /// The predicate is still required; it is used when the criterion is
    /// combined with inexact ones.
    pub fn exact<F>(name: impl Into<String>, predicate: F, query: Query) -> Self
    where
        F: Fn(&ParsedMessage) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            query: Some(query),
            exact: true,
        }
    }

    /// The criterion's name, as used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The server-side query, if any.
    #[must_use]
    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    /// Whether evaluation can skip fetching.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.exact
    }

    /// Runs the client-side predicate against one message.
    #[must_use]
    pub fn matches(&self, message: &ParsedMessage) -> bool {
        (self.predicate)(message)
    }

    /// Both criteria must match.
    #[must_use]
    pub fn and(self, other: Criterion) -> Criterion {
        let name = format!("({} and {})", self.name, other.name);
        let p1 = Arc::clone(&self.predicate);
        let p2 = Arc::clone(&other.predicate);

        let (query, exact) = match (self.query, other.query) {
            (Some(a), Some(b)) => (Some(a.and(b)), self.exact && other.exact),
            // One-sided queries still pre-filter a conjunction.
            (Some(a), None) => (Some(a), false),
            (None, Some(b)) => (Some(b), false),
            (None, None) => (None, false),
        };

        Criterion {
            name,
            predicate: Arc::new(move |m| p1(m) && p2(m)),
            query,
            exact,
        }
    }

    /// Either criterion may match.
    #[must_use]
    pub fn or(self, other: Criterion) -> Criterion {
        let name = format!("({} or {})", self.name, other.name);
        let p1 = Arc::clone(&self.predicate);
        let p2 = Arc::clone(&other.predicate);

        let (query, exact) = match (self.query, other.query) {
            (Some(a), Some(b)) => (Some(a.or(b)), self.exact && other.exact),
            // A one-sided query would miss matches of the other side.
            _ => (None, false),
        };

        Criterion {
            name,
            predicate: Arc::new(move |m| p1(m) || p2(m)),
            query,
            exact,
        }
    }

    /// The criterion must not match.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Criterion {
        let name = format!("(not {})", self.name);
        let p = Arc::clone(&self.predicate);

        // Negating a pre-filter is unsound: messages outside the query may
        // satisfy the negation. Only exact queries survive negation.
        let (query, exact) = if self.exact {
            (self.query.map(Query::not), true)
        } else {
            (None, false)
        };

        Criterion {
            name,
            predicate: Arc::new(move |m| !p(m)),
            query,
            exact,
        }
    }
}

#[async_trait]
impl MessageSelector for Criterion {
    #[instrument(name = "criterion::select", skip_all, fields(criterion = %self.name))]
    async fn select(&self, session: &mut dyn MailSession) -> Result<HashSet<u32>> {
        let query = self.query.clone().unwrap_or(Query::All);
        let candidates = session.search(&query).await?;

        if self.exact {
            debug!(matched = candidates.len(), "Resolved server-side");
            return Ok(candidates);
        }

        let fetched = session.fetch(&candidates).await?;
        let mut matched = HashSet::new();
        for message in fetched {
            match ParsedMessage::parse(&message.raw, message.flags) {
                Ok(parsed) => {
                    if (self.predicate)(&parsed) {
                        matched.insert(message.uid);
                    }
                }
                Err(error) => {
                    warn!(uid = message.uid, %error, "Failed to parse message, skipping");
                }
            }
        }
        debug!(
            candidates = candidates.len(),
            matched = matched.len(),
            "Resolved client-side"
        );
        Ok(matched)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact_seen() -> Criterion {
        Criterion::exact("seen", |m| m.has_flag(&crate::Flag::Seen), Query::Seen)
    }

    fn inexact_subject(s: &str) -> Criterion {
        let owned = s.to_string();
        Criterion::with_query(
            format!("subject is {s}"),
            move |m| m.subject == owned,
            Query::Subject(s.to_string()),
        )
    }

    fn predicate_only() -> Criterion {
        Criterion::new("has date", |m| m.date.is_some())
    }

    #[test]
    fn test_and_merges_queries() {
        let c = exact_seen().and(inexact_subject("hi"));
        assert_eq!(
            c.query(),
            Some(&Query::And(vec![
                Query::Seen,
                Query::Subject("hi".into())
            ]))
        );
        assert!(!c.is_exact());
    }

    #[test]
    fn test_and_keeps_one_sided_query_but_not_exactness() {
        let c = exact_seen().and(predicate_only());
        assert_eq!(c.query(), Some(&Query::Seen));
        assert!(!c.is_exact());
    }

    #[test]
    fn test_and_of_exact_criteria_is_exact() {
        let c = exact_seen().and(Criterion::exact(
            "flagged",
            |m| m.has_flag(&crate::Flag::Flagged),
            Query::Flagged,
        ));
        assert!(c.is_exact());
        assert_eq!(
            c.query(),
            Some(&Query::And(vec![Query::Seen, Query::Flagged]))
        );
    }

    #[test]
    fn test_or_drops_one_sided_query() {
        let c = exact_seen().or(predicate_only());
        assert_eq!(c.query(), None);
        assert!(!c.is_exact());
    }

    #[test]
    fn test_or_merges_two_queries() {
        let c = exact_seen().or(inexact_subject("hi"));
        assert_eq!(
            c.query(),
            Some(&Query::Or(
                Box::new(Query::Seen),
                Box::new(Query::Subject("hi".into()))
            ))
        );
        assert!(!c.is_exact());
    }

    #[test]
    fn test_not_negates_only_exact_queries() {
        let c = exact_seen().not();
        assert_eq!(c.query(), Some(&Query::Not(Box::new(Query::Seen))));
        assert!(c.is_exact());

        let c = inexact_subject("hi").not();
        assert_eq!(c.query(), None);
        assert!(!c.is_exact());
    }

    #[test]
    fn test_combined_predicate() {
        let c = inexact_subject("hi").and(predicate_only().not());
        let mut msg = ParsedMessage {
            subject: "hi".into(),
            ..ParsedMessage::default()
        };
        assert!(c.matches(&msg));
        msg.date = chrono::DateTime::from_timestamp(0, 0);
        assert!(!c.matches(&msg));
    }

    #[test]
    fn test_combination_names() {
        let c = exact_seen().and(inexact_subject("hi")).not();
        assert_eq!(c.to_string(), "(not (seen and subject is hi))");
    }
}
