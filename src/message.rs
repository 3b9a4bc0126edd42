//! Parsed message model.
//!
//! Criteria that cannot be decided server-side evaluate a predicate against a
//! [`ParsedMessage`]: the header fields the built-in criteria care about, plus
//! the IMAP flags the message carried when it was fetched. Parsing is done
//! with `mailparse` and is deliberately forgiving - a malformed address header
//! yields an empty address list and an unparsable Date yields `None`, so one
//! broken message never aborts a batch evaluation.

use chrono::{DateTime, Utc};
use mailparse::{MailAddr, MailHeaderMap, MailParseError};

/// One mailbox from an address header: display name plus address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Display name, when the header carried one.
    pub name: Option<String>,
    /// The bare email address.
    pub address: String,
}

impl Address {
    /// Creates an address with a display name.
    #[must_use]
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    /// Creates an address without a display name.
    #[must_use]
    pub fn bare(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }
}

/// An IMAP message flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flag {
    /// `\Seen` - the message has been read.
    Seen,
    /// `\Answered` - the message has been answered.
    Answered,
    /// `\Flagged` - the message is flagged/starred.
    Flagged,
    /// `\Deleted` - the message is marked for deletion.
    Deleted,
    /// `\Draft` - the message is a draft.
    Draft,
    /// `\Recent` - the message is recent.
    Recent,
    /// Any other flag or keyword.
    Custom(String),
}

impl Flag {
    /// Renders the flag in IMAP syntax (e.g. `\Seen`).
    #[must_use]
    pub fn to_imap(&self) -> String {
        match self {
            Flag::Seen => r"\Seen".into(),
            Flag::Answered => r"\Answered".into(),
            Flag::Flagged => r"\Flagged".into(),
            Flag::Deleted => r"\Deleted".into(),
            Flag::Draft => r"\Draft".into(),
            Flag::Recent => r"\Recent".into(),
            Flag::Custom(s) => s.clone(),
        }
    }

    /// Parses a flag from its IMAP representation.
    #[must_use]
    pub fn from_imap(s: &str) -> Self {
        match s {
            r"\Seen" => Flag::Seen,
            r"\Answered" => Flag::Answered,
            r"\Flagged" => Flag::Flagged,
            r"\Deleted" => Flag::Deleted,
            r"\Draft" => Flag::Draft,
            r"\Recent" => Flag::Recent,
            other => Flag::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_imap())
    }
}

/// A parsed message: the headers criteria match on, plus fetched flags.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    /// Senders from the `From` header.
    pub from: Vec<Address>,
    /// Recipients from the `To` header.
    pub to: Vec<Address>,
    /// Recipients from the `Cc` header.
    pub cc: Vec<Address>,
    /// Recipients from the `Bcc` header.
    pub bcc: Vec<Address>,
    /// Subject line, empty if absent.
    pub subject: String,
    /// Parsed `Date` header; `None` when absent or unparsable.
    pub date: Option<DateTime<Utc>>,
    /// `Message-ID` header, if present.
    pub message_id: Option<String>,
    /// IMAP flags attached at fetch time.
    pub flags: Vec<Flag>,
}

impl ParsedMessage {
    /// Parses a raw RFC 2822 message and attaches the given flags.
    ///
    /// # Errors
    ///
    /// Returns an error only when the message structure itself cannot be
    /// parsed; individual malformed headers degrade to empty/`None` fields.
    pub fn parse(raw: &[u8], flags: Vec<Flag>) -> std::result::Result<Self, MailParseError> {
        let mail = mailparse::parse_mail(raw)?;

        let subject = mail
            .headers
            .get_first_value("Subject")
            .unwrap_or_default();

        let date = mail
            .headers
            .get_first_value("Date")
            .and_then(|raw| parse_date(&raw));

        let message_id = mail
            .headers
            .get_first_value("Message-ID")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        Ok(Self {
            from: addresses(&mail, "From"),
            to: addresses(&mail, "To"),
            cc: addresses(&mail, "Cc"),
            bcc: addresses(&mail, "Bcc"),
            subject,
            date,
            message_id,
            flags,
        })
    }

    /// Returns `true` if the message carries the given flag.
    #[must_use]
    pub fn has_flag(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }
}

/// Parses a `Date` header value, yielding `None` for garbage.
///
/// RFC 2822 parsing comes first. `mailparse::dateparse` is more tolerant of
/// real-world deviations (comments, odd whitespace) but maps unparsable input
/// to the epoch, so its result is only trusted when nonzero; a genuine epoch
/// date is still accepted through the strict branch.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(raw.trim()) {
        return Some(date.with_timezone(&Utc));
    }
    match mailparse::dateparse(raw) {
        Ok(secs) if secs != 0 => DateTime::from_timestamp(secs, 0),
        _ => None,
    }
}

/// Extracts the (name, address) pairs of one address header.
///
/// A missing or malformed header yields an empty list rather than an error.
fn addresses(mail: &mailparse::ParsedMail<'_>, header: &str) -> Vec<Address> {
    let Some(h) = mail.headers.get_first_header(header) else {
        return Vec::new();
    };
    let Ok(parsed) = mailparse::addrparse_header(h) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for addr in parsed.iter() {
        match addr {
            MailAddr::Single(single) => out.push(Address {
                name: single.display_name.clone(),
                address: single.addr.clone(),
            }),
            MailAddr::Group(group) => {
                for single in &group.addrs {
                    out.push(Address {
                        name: single.display_name.clone(),
                        address: single.addr.clone(),
                    });
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &[u8] = b"From: Alice Example <alice@example.com>\r\n\
To: Bob <bob@example.com>, carol@example.com\r\n\
Cc: Dave <dave@example.com>\r\n\
Subject: Hello there\r\n\
Date: Wed, 01 Jan 2025 12:00:00 +0000\r\n\
Message-ID: <abc123@example.com>\r\n\
\r\n\
body text";

    #[test]
    fn test_parses_address_headers() {
        let msg = ParsedMessage::parse(RAW, vec![]).unwrap();
        assert_eq!(
            msg.from,
            vec![Address::new("Alice Example", "alice@example.com")]
        );
        assert_eq!(msg.to.len(), 2);
        assert_eq!(msg.to[1], Address::bare("carol@example.com"));
        assert_eq!(msg.cc, vec![Address::new("Dave", "dave@example.com")]);
        assert!(msg.bcc.is_empty());
    }

    #[test]
    fn test_parses_subject_date_message_id() {
        let msg = ParsedMessage::parse(RAW, vec![]).unwrap();
        assert_eq!(msg.subject, "Hello there");
        assert_eq!(msg.message_id.as_deref(), Some("<abc123@example.com>"));
        let date = msg.date.expect("date parses");
        assert_eq!(date.date_naive().to_string(), "2025-01-01");
    }

    #[test]
    fn test_missing_headers_degrade_gracefully() {
        let msg = ParsedMessage::parse(b"X-Other: nothing\r\n\r\nhi", vec![]).unwrap();
        assert!(msg.from.is_empty());
        assert_eq!(msg.subject, "");
        assert!(msg.date.is_none());
        assert!(msg.message_id.is_none());
    }

    #[test]
    fn test_unparsable_date_is_none() {
        // `mailparse::dateparse` maps garbage to the epoch; that must not
        // leak through as 1970-01-01, or date cutoffs would match it.
        let raw = b"Date: not a date\r\nSubject: x\r\n\r\nhi";
        let msg = ParsedMessage::parse(raw, vec![]).unwrap();
        assert!(msg.date.is_none());

        assert!(parse_date("not a date").is_none());
        assert!(parse_date("").is_none());
        assert!(parse_date("Friday maybe, 2025").is_none());
    }

    #[test]
    fn test_genuine_epoch_date_parses() {
        let date = parse_date("Thu, 01 Jan 1970 00:00:00 +0000").expect("epoch parses");
        assert_eq!(date.timestamp(), 0);
    }

    #[test]
    fn test_date_with_trailing_comment_parses() {
        let date = parse_date("Sun, 02 Oct 2016 07:06:22 -0700 (PDT)").expect("date parses");
        assert_eq!(date.date_naive().to_string(), "2016-10-02");
        assert_eq!(date.timestamp(), 1_475_417_182);
    }

    #[test]
    fn test_flags_attach_and_roundtrip() {
        let msg = ParsedMessage::parse(RAW, vec![Flag::Seen, Flag::Custom("Junk".into())]).unwrap();
        assert!(msg.has_flag(&Flag::Seen));
        assert!(!msg.has_flag(&Flag::Flagged));
        assert_eq!(Flag::from_imap(r"\Seen"), Flag::Seen);
        assert_eq!(Flag::from_imap("Junk"), Flag::Custom("Junk".into()));
        assert_eq!(Flag::Flagged.to_imap(), r"\Flagged");
    }
}
