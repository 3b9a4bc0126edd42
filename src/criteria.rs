//! Built-in criteria.
//!
//! Three tiers, by how much work the server can take over:
//!
//! - *Exact* criteria (flag checks, [`from_contains`], [`older_than`]) are
//!   answered entirely by `SEARCH`.
//! - *Pre-filtered* criteria ([`from_is`], [`subject_is`]) use a query to
//!   narrow the candidates, then verify against the parsed message, since
//!   IMAP string search is a substring match.
//! - *Client-only* criteria (the `_matches` regex family) fetch everything.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::criterion::Criterion;
use crate::error::{Error, Result};
use crate::message::Flag;
use crate::query::Query;

// ─── Exact criteria ──────────────────────────────────────────────────────────

/// Matches every message in the mailbox.
#[must_use]
pub fn select_all() -> Criterion {
    Criterion::exact("all", |_| true, Query::All)
}

/// Matches messages that have been read.
#[must_use]
pub fn is_read() -> Criterion {
    Criterion::exact("read", |m| m.has_flag(&Flag::Seen), Query::Seen)
}

/// Matches messages that are unread.
#[must_use]
pub fn is_unread() -> Criterion {
    Criterion::exact("unread", |m| !m.has_flag(&Flag::Seen), Query::Unseen)
}

/// Matches starred (`\Flagged`) messages.
#[must_use]
pub fn is_starred() -> Criterion {
    Criterion::exact("starred", |m| m.has_flag(&Flag::Flagged), Query::Flagged)
}

/// Matches unstarred messages.
#[must_use]
pub fn is_unstarred() -> Criterion {
    Criterion::exact(
        "unstarred",
        |m| !m.has_flag(&Flag::Flagged),
        Query::Unflagged,
    )
}

/// Matches answered messages.
#[must_use]
pub fn is_answered() -> Criterion {
    Criterion::exact(
        "answered",
        |m| m.has_flag(&Flag::Answered),
        Query::Answered,
    )
}

/// Matches unanswered messages.
#[must_use]
pub fn is_unanswered() -> Criterion {
    Criterion::exact(
        "unanswered",
        |m| !m.has_flag(&Flag::Answered),
        Query::Unanswered,
    )
}

/// Matches messages whose sender address contains the given string.
#[must_use]
pub fn from_contains(s: impl Into<String>) -> Criterion {
    let s = s.into();
    let needle = s.to_lowercase();
    Criterion::exact(
        format!("from contains {s}"),
        move |m| {
            m.from
                .iter()
                .any(|a| a.address.to_lowercase().contains(&needle))
        },
        Query::From(s),
    )
}

/// Matches messages whose To addresses contain the given string.
#[must_use]
pub fn to_contains(s: impl Into<String>) -> Criterion {
    let s = s.into();
    let needle = s.to_lowercase();
    Criterion::exact(
        format!("to contains {s}"),
        move |m| {
            m.to
                .iter()
                .any(|a| a.address.to_lowercase().contains(&needle))
        },
        Query::To(s),
    )
}

/// Matches messages whose Cc addresses contain the given string.
#[must_use]
pub fn cc_contains(s: impl Into<String>) -> Criterion {
    let s = s.into();
    let needle = s.to_lowercase();
    Criterion::exact(
        format!("cc contains {s}"),
        move |m| {
            m.cc
                .iter()
                .any(|a| a.address.to_lowercase().contains(&needle))
        },
        Query::Cc(s),
    )
}

/// Matches messages whose Bcc addresses contain the given string.
#[must_use]
pub fn bcc_contains(s: impl Into<String>) -> Criterion {
    let s = s.into();
    let needle = s.to_lowercase();
    Criterion::exact(
        format!("bcc contains {s}"),
        move |m| {
            m.bcc
                .iter()
                .any(|a| a.address.to_lowercase().contains(&needle))
        },
        Query::Bcc(s),
    )
}

/// Matches messages whose subject contains the given substring.
#[must_use]
pub fn subject_contains(s: impl Into<String>) -> Criterion {
    let s = s.into();
    let needle = s.to_lowercase();
    Criterion::exact(
        format!("subject contains {s}"),
        move |m| m.subject.to_lowercase().contains(&needle),
        Query::Subject(s),
    )
}

/// A date boundary for [`older_than`], in mailbox-local day precision.
///
/// Converts from [`NaiveDate`], [`NaiveDateTime`] (the time of day is
/// dropped) and, via [`FromStr`](std::str::FromStr), from the IMAP
/// `DD-Mon-YYYY` form:
///
/// ```
/// use imap_filters::criteria::DateCutoff;
///
/// let cutoff: DateCutoff = "01-Jan-2025".parse().expect("valid date");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateCutoff(NaiveDate);

impl DateCutoff {
    /// The cutoff date.
    #[must_use]
    pub fn date(self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DateCutoff {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl From<NaiveDateTime> for DateCutoff {
    fn from(dt: NaiveDateTime) -> Self {
        Self(dt.date())
    }
}

impl std::str::FromStr for DateCutoff {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NaiveDate::parse_from_str(s, "%d-%b-%Y")
            .map(Self)
            .map_err(|_| Error::InvalidDate {
                input: s.to_string(),
            })
    }
}

/// Matches messages sent strictly before the cutoff date.
///
/// Messages without a parsable Date header never match.
#[must_use]
pub fn older_than(cutoff: impl Into<DateCutoff>) -> Criterion {
    let cutoff = cutoff.into().date();
    Criterion::exact(
        format!("older than {}", cutoff.format("%d-%b-%Y")),
        move |m| m.date.is_some_and(|d| d.date_naive() < cutoff),
        Query::SentBefore(cutoff),
    )
}

// ─── Pre-filtered criteria ───────────────────────────────────────────────────

/// Matches messages from exactly the given address.
#[must_use]
pub fn from_is(addr: impl Into<String>) -> Criterion {
    let addr = addr.into();
    let wanted = addr.clone();
    Criterion::with_query(
        format!("from is {addr}"),
        move |m| m.from.iter().any(|a| a.address.eq_ignore_ascii_case(&wanted)),
        Query::From(addr),
    )
}

/// Matches messages addressed (To) to exactly the given address.
#[must_use]
pub fn to_is(addr: impl Into<String>) -> Criterion {
    let addr = addr.into();
    let wanted = addr.clone();
    Criterion::with_query(
        format!("to is {addr}"),
        move |m| m.to.iter().any(|a| a.address.eq_ignore_ascii_case(&wanted)),
        Query::To(addr),
    )
}

/// Matches messages CC'd to exactly the given address.
#[must_use]
pub fn cc_is(addr: impl Into<String>) -> Criterion {
    let addr = addr.into();
    let wanted = addr.clone();
    Criterion::with_query(
        format!("cc is {addr}"),
        move |m| m.cc.iter().any(|a| a.address.eq_ignore_ascii_case(&wanted)),
        Query::Cc(addr),
    )
}

/// Matches messages BCC'd to exactly the given address.
#[must_use]
pub fn bcc_is(addr: impl Into<String>) -> Criterion {
    let addr = addr.into();
    let wanted = addr.clone();
    Criterion::with_query(
        format!("bcc is {addr}"),
        move |m| m.bcc.iter().any(|a| a.address.eq_ignore_ascii_case(&wanted)),
        Query::Bcc(addr),
    )
}

/// Matches messages with exactly the given subject line.
#[must_use]
pub fn subject_is(subject: impl Into<String>) -> Criterion {
    let subject = subject.into();
    let wanted = subject.clone();
    Criterion::with_query(
        format!("subject is {subject}"),
        move |m| m.subject == wanted,
        Query::Subject(subject),
    )
}

// ─── Client-only criteria ────────────────────────────────────────────────────

/// Compiles a pattern that must match the entire input.
fn full_match(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{pattern})$")).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Matches messages whose sender address matches the whole regex pattern.
///
/// # Errors
///
/// Fails if the pattern is not a valid regular expression.
pub fn from_matches(pattern: &str) -> Result<Criterion> {
    let re = full_match(pattern)?;
    Ok(Criterion::new(
        format!("from matches {pattern}"),
        move |m| m.from.iter().any(|a| re.is_match(&a.address)),
    ))
}

/// Matches messages whose sender display name matches the whole pattern.
///
/// # Errors
///
/// Fails if the pattern is not a valid regular expression.
pub fn from_name_matches(pattern: &str) -> Result<Criterion> {
    let re = full_match(pattern)?;
    Ok(Criterion::new(
        format!("from name matches {pattern}"),
        move |m| {
            m.from
                .iter()
                .any(|a| a.name.as_deref().is_some_and(|n| re.is_match(n)))
        },
    ))
}

/// Matches messages with a To address matching the whole pattern,
/// optionally also checking CC and BCC.
///
/// # Errors
///
/// Fails if the pattern is not a valid regular expression.
pub fn to_matches(pattern: &str, incl_cc: bool, incl_bcc: bool) -> Result<Criterion> {
    let re = full_match(pattern)?;
    let mut criterion = Criterion::new(format!("to matches {pattern}"), move |m| {
        m.to.iter().any(|a| re.is_match(&a.address))
    });
    if incl_cc {
        criterion = criterion.or(cc_matches(pattern)?);
    }
    if incl_bcc {
        criterion = criterion.or(bcc_matches(pattern)?);
    }
    Ok(criterion)
}

/// Matches messages with a CC address matching the whole pattern.
///
/// # Errors
///
/// Fails if the pattern is not a valid regular expression.
pub fn cc_matches(pattern: &str) -> Result<Criterion> {
    let re = full_match(pattern)?;
    Ok(Criterion::new(
        format!("cc matches {pattern}"),
        move |m| m.cc.iter().any(|a| re.is_match(&a.address)),
    ))
}

/// Matches messages with a BCC address matching the whole pattern.
///
/// # Errors
///
/// Fails if the pattern is not a valid regular expression.
pub fn bcc_matches(pattern: &str) -> Result<Criterion> {
    let re = full_match(pattern)?;
    Ok(Criterion::new(
        format!("bcc matches {pattern}"),
        move |m| m.bcc.iter().any(|a| re.is_match(&a.address)),
    ))
}

/// Matches messages whose subject matches the whole pattern.
///
/// # Errors
///
/// Fails if the pattern is not a valid regular expression.
pub fn subject_matches(pattern: &str) -> Result<Criterion> {
    let re = full_match(pattern)?;
    Ok(Criterion::new(
        format!("subject matches {pattern}"),
        move |m| re.is_match(&m.subject),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Address, ParsedMessage};

    fn msg_from(addr: &str) -> ParsedMessage {
        ParsedMessage {
            from: vec![Address::bare(addr)],
            ..ParsedMessage::default()
        }
    }

    #[test]
    fn test_from_is_query_and_predicate() {
        let c = from_is("alice@example.com");
        assert_eq!(c.query(), Some(&Query::From("alice@example.com".into())));
        assert!(!c.is_exact());
        assert!(c.matches(&msg_from("alice@example.com")));
        assert!(c.matches(&msg_from("ALICE@EXAMPLE.COM")));
        assert!(!c.matches(&msg_from("bob+alice@example.com")));
    }

    #[test]
    fn test_from_contains_is_exact() {
        let c = from_contains("@example.com");
        assert!(c.is_exact());
        assert_eq!(c.query(), Some(&Query::From("@example.com".into())));
        assert!(c.matches(&msg_from("alice@example.com")));
        assert!(!c.matches(&msg_from("alice@other.org")));
    }

    #[test]
    fn test_flag_criteria_are_exact() {
        assert!(is_unread().is_exact());
        assert_eq!(is_unread().query(), Some(&Query::Unseen));
        assert_eq!(is_starred().query(), Some(&Query::Flagged));
    }

    #[test]
    fn test_older_than_all_forms_agree() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let from_date = older_than(date);
        let from_datetime = older_than(date.and_hms_opt(13, 30, 0).unwrap());
        let from_str = older_than("01-Jan-2025".parse::<DateCutoff>().unwrap());

        let expected = Some(&Query::SentBefore(date));
        assert_eq!(from_date.query(), expected);
        assert_eq!(from_datetime.query(), expected);
        assert_eq!(from_str.query(), expected);
        assert!(from_date.is_exact());
    }

    #[test]
    fn test_older_than_predicate() {
        let c = older_than(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        let mut msg = ParsedMessage::default();
        assert!(!c.matches(&msg), "missing date never matches");

        msg.date = chrono::DateTime::from_timestamp(1_600_000_000, 0); // 2020
        assert!(c.matches(&msg));

        msg.date = chrono::DateTime::from_timestamp(1_800_000_000, 0); // 2027
        assert!(!c.matches(&msg));
    }

    #[test]
    fn test_older_than_skips_malformed_date_headers() {
        // A garbage Date header must not parse as the epoch, which would
        // match every cutoff and sweep the message into the action.
        let raw = b"From: a@example.com\r\nDate: not a date\r\nSubject: x\r\n\r\nhi";
        let msg = ParsedMessage::parse(raw, vec![]).unwrap();
        assert!(msg.date.is_none());

        let c = older_than(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert!(!c.matches(&msg));
    }

    #[test]
    fn test_invalid_cutoff_string() {
        let result = "2025-01-01".parse::<DateCutoff>();
        assert!(matches!(result, Err(Error::InvalidDate { .. })));
    }

    #[test]
    fn test_regex_criteria_full_match() {
        let c = from_matches(r".*@example\.com").unwrap();
        assert_eq!(c.query(), None);
        assert!(c.matches(&msg_from("alice@example.com")));
        // fullmatch semantics: a substring hit is not enough
        let c = from_matches(r"alice@").unwrap();
        assert!(!c.matches(&msg_from("alice@example.com")));
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let result = subject_matches("(unclosed");
        assert!(matches!(result, Err(Error::InvalidPattern { .. })));
    }

    #[test]
    fn test_to_matches_includes_cc_and_bcc() {
        let c = to_matches(r".*@corp\.com", true, true).unwrap();
        let msg = ParsedMessage {
            cc: vec![Address::bare("eve@corp.com")],
            ..ParsedMessage::default()
        };
        assert!(c.matches(&msg));

        let no_cc = to_matches(r".*@corp\.com", false, false).unwrap();
        assert!(!no_cc.matches(&msg));
    }
}
