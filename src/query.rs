//! Server-side search query expressions.
//!
//! A [`Query`] is a structured, recursively composable search term. Criteria carry
//! an optional `Query` so that as much narrowing as possible happens on the server
//! before any message body is fetched. The tree is rendered to IMAP SEARCH syntax
//! ([RFC 3501 §6.4.4](https://tools.ietf.org/html/rfc3501#section-6.4.4)) at the
//! session boundary.
//!
//! # Example
//!
//! ```
//! use imap_filters::query::Query;
//!
//! let q = Query::From("alice@example.com".into()).and(Query::Unseen);
//! assert_eq!(q.to_imap(), r#"FROM "alice@example.com" UNSEEN"#);
//!
//! let q = Query::Subject("invoice".into()).or(Query::Subject("receipt".into()));
//! assert_eq!(q.to_imap(), r#"OR (SUBJECT "invoice") (SUBJECT "receipt")"#);
//! ```

use chrono::NaiveDate;

/// A server-evaluable search expression.
///
/// `And` is the implicit conjunction of RFC 3501 (terms concatenated with
/// spaces); `Or` and `Not` render with explicit keywords and parenthesized
/// operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Matches every message in the folder.
    All,
    /// `FROM` containing the given string.
    From(String),
    /// `TO` containing the given string.
    To(String),
    /// `CC` containing the given string.
    Cc(String),
    /// `BCC` containing the given string.
    Bcc(String),
    /// `SUBJECT` containing the given string.
    Subject(String),
    /// Messages with the `\Seen` flag.
    Seen,
    /// Messages without the `\Seen` flag.
    Unseen,
    /// Messages with the `\Flagged` flag.
    Flagged,
    /// Messages without the `\Flagged` flag.
    Unflagged,
    /// Messages with the `\Answered` flag.
    Answered,
    /// Messages without the `\Answered` flag.
    Unanswered,
    /// Messages whose Date header is strictly before the given date.
    SentBefore(NaiveDate),
    /// Conjunction of all inner terms.
    And(Vec<Query>),
    /// Disjunction of exactly two terms.
    Or(Box<Query>, Box<Query>),
    /// Negation of a term.
    Not(Box<Query>),
}

impl Query {
    /// Combines two queries conjunctively, flattening nested `And` terms.
    #[must_use]
    pub fn and(self, other: Query) -> Query {
        let mut terms = match self {
            Query::And(terms) => terms,
            q => vec![q],
        };
        match other {
            Query::And(mut more) => terms.append(&mut more),
            q => terms.push(q),
        }
        Query::And(terms)
    }

    /// Combines two queries disjunctively.
    #[must_use]
    pub fn or(self, other: Query) -> Query {
        Query::Or(Box::new(self), Box::new(other))
    }

    /// Negates this query.
    #[must_use]
    pub fn not(self) -> Query {
        Query::Not(Box::new(self))
    }

    /// Renders this query as an IMAP SEARCH string.
    #[must_use]
    pub fn to_imap(&self) -> String {
        match self {
            Query::All => "ALL".into(),
            Query::From(s) => format!("FROM {}", quote(s)),
            Query::To(s) => format!("TO {}", quote(s)),
            Query::Cc(s) => format!("CC {}", quote(s)),
            Query::Bcc(s) => format!("BCC {}", quote(s)),
            Query::Subject(s) => format!("SUBJECT {}", quote(s)),
            Query::Seen => "SEEN".into(),
            Query::Unseen => "UNSEEN".into(),
            Query::Flagged => "FLAGGED".into(),
            Query::Unflagged => "UNFLAGGED".into(),
            Query::Answered => "ANSWERED".into(),
            Query::Unanswered => "UNANSWERED".into(),
            Query::SentBefore(date) => format!("SENTBEFORE {}", date.format("%d-%b-%Y")),
            Query::And(terms) => terms
                .iter()
                .map(Query::to_imap)
                .collect::<Vec<_>>()
                .join(" "),
            Query::Or(a, b) => format!("OR ({}) ({})", a.to_imap(), b.to_imap()),
            Query::Not(q) => format!("NOT ({})", q.to_imap()),
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_imap())
    }
}

/// Quotes a search string literal, escaping embedded quotes and backslashes.
fn quote(s: &str) -> String {
    let escaped = s.replace('\\', r"\\").replace('"', r#"\""#);
    format!("\"{escaped}\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atoms_render() {
        assert_eq!(Query::All.to_imap(), "ALL");
        assert_eq!(Query::Seen.to_imap(), "SEEN");
        assert_eq!(
            Query::From("a@x.com".into()).to_imap(),
            r#"FROM "a@x.com""#
        );
    }

    #[test]
    fn test_sent_before_renders_imap_date() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(Query::SentBefore(date).to_imap(), "SENTBEFORE 01-Jan-2025");
    }

    #[test]
    fn test_and_flattens() {
        let q = Query::From("a".into())
            .and(Query::Subject("b".into()))
            .and(Query::Unseen);
        assert_eq!(q.to_imap(), r#"FROM "a" SUBJECT "b" UNSEEN"#);
        match q {
            Query::And(terms) => assert_eq!(terms.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_or_and_not_parenthesize() {
        let q = Query::From("a".into())
            .or(Query::To("b".into()))
            .not();
        assert_eq!(q.to_imap(), r#"NOT (OR (FROM "a") (TO "b"))"#);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(
            Query::Subject(r#"say "hi""#.into()).to_imap(),
            r#"SUBJECT "say \"hi\"""#
        );
    }
}
