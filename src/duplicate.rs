//! Duplicate message detection.
//!
//! [`DuplicateScan`] selects every copy of a message except the first, so a
//! filter can delete or archive redundant copies. Messages group by
//! Message-ID when one is present and otherwise by a subject/sender/date
//! fingerprint. Within a group the lowest UID, i.e. the oldest copy in the
//! mailbox, is kept.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::criterion::MessageSelector;
use crate::error::Result;
use crate::message::ParsedMessage;
use crate::query::Query;
use crate::session::MailSession;

/// Selects duplicate messages, keeping one copy of each.
///
/// Duplicates cannot be found server-side; the scan fetches the whole
/// mailbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateScan;

/// The grouping key of one message.
fn duplicate_key(message: &ParsedMessage) -> String {
    if let Some(id) = &message.message_id {
        return format!("msgid:{id}");
    }
    let from = message
        .from
        .first()
        .map(|a| a.address.as_str())
        .unwrap_or_default();
    let date = message.date.map(|d| d.to_rfc3339()).unwrap_or_default();
    format!("fallback:{}|{from}|{date}", message.subject)
}

#[async_trait]
impl MessageSelector for DuplicateScan {
    #[instrument(name = "duplicate::select", skip_all)]
    async fn select(&self, session: &mut dyn MailSession) -> Result<HashSet<u32>> {
        let uids = session.search(&Query::All).await?;
        if uids.is_empty() {
            debug!("Mailbox is empty");
            return Ok(HashSet::new());
        }

        let fetched = session.fetch(&uids).await?;
        let mut groups: HashMap<String, Vec<u32>> = HashMap::new();
        for message in fetched {
            match ParsedMessage::parse(&message.raw, message.flags) {
                Ok(parsed) => {
                    groups
                        .entry(duplicate_key(&parsed))
                        .or_default()
                        .push(message.uid);
                }
                Err(error) => {
                    warn!(uid = message.uid, %error, "Failed to parse message, skipping");
                }
            }
        }

        let mut duplicates = HashSet::new();
        for uids in groups.values_mut() {
            if uids.len() < 2 {
                continue;
            }
            uids.sort_unstable();
            duplicates.extend(uids.iter().skip(1));
        }

        debug!(
            groups = groups.len(),
            duplicates = duplicates.len(),
            "Duplicate scan complete"
        );
        Ok(duplicates)
    }

    fn describe(&self) -> String {
        "duplicates".into()
    }
}
