use std::collections::HashSet;

use google_gmail1::api::Message;
use indexmap::IndexMap;

use super::client::MailboxApi;
use crate::error::FetchError;

/// Messages from one sender, in the order they were first seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderRecord {
    pub sender: String,
    pub count: usize,
    pub message_ids: Vec<String>,
}

impl SenderRecord {
    fn new(sender: String) -> Self {
        Self {
            sender,
            count: 0,
            message_ids: Vec::new(),
        }
    }

    fn push(&mut self, message_id: String) {
        self.message_ids.push(message_id);
        self.count += 1;
    }
}

#[derive(Debug, Default)]
pub struct SenderAggregate {
    /// Keyed by sender identity, in first-seen order.
    pub records: IndexMap<String, SenderRecord>,
    /// Ids whose metadata could not be fetched or carried no `From` header.
    pub dropped: Vec<String>,
    pub pages: usize,
}

impl SenderAggregate {
    pub fn total_messages(&self) -> usize {
        self.records.values().map(|r| r.count).sum()
    }

    /// Senders by descending count, ties broken by ascending identity.
    pub fn into_ranked(self) -> Vec<SenderRecord> {
        let mut ranked = self.records.into_values().collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.sender.cmp(&b.sender)));
        ranked
    }

    fn insert(&mut self, sender: String, message_id: String) {
        self.records
            .entry(sender.clone())
            .or_insert_with(|| SenderRecord::new(sender))
            .push(message_id);
    }
}

/// Canonical identity of a `From` header value: the contents of the last
/// `<...>` pair when there is one, the raw value otherwise.
pub fn extract_sender(from: &str) -> &str {
    from.rfind('<')
        .and_then(|start| {
            let rest = &from[start + 1..];
            rest.find('>').map(|end| &rest[..end])
        })
        .unwrap_or(from)
}

pub fn sender_header(message: &Message) -> Option<&str> {
    message
        .payload
        .as_ref()?
        .headers
        .as_ref()?
        .iter()
        .find(|h| {
            h.name
                .as_deref()
                .is_some_and(|name| name.eq_ignore_ascii_case("from"))
        })?
        .value
        .as_deref()
}

/// Walks every page of the mailbox and groups message ids by sender.
///
/// Only a failed page listing aborts the walk. A message whose metadata
/// cannot be fetched, or that has no sender, is recorded in
/// [`SenderAggregate::dropped`] and skipped.
pub async fn aggregate<A>(api: &A) -> Result<SenderAggregate, FetchError>
where
    A: MailboxApi + ?Sized,
{
    let mut aggregate = SenderAggregate::default();
    let mut seen = HashSet::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = api
            .list_messages(page_token.as_deref())
            .await
            .map_err(|source| FetchError::ListFailed {
                page: aggregate.pages + 1,
                source,
            })?;
        aggregate.pages += 1;

        let ids = page
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id);

        for id in ids {
            if !seen.insert(id.clone()) {
                tracing::debug!("Message {id} listed twice, counting it once");
                continue;
            }

            let message = match api.get_message_metadata(&id).await {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("Skipping message {id}: {e}");
                    aggregate.dropped.push(id);
                    continue;
                }
            };

            match sender_header(&message) {
                Some(from) => {
                    let sender = extract_sender(from).to_string();
                    aggregate.insert(sender, id);
                }
                None => {
                    tracing::warn!("Skipping message {id}: no From header");
                    aggregate.dropped.push(id);
                }
            }
        }

        tracing::debug!(
            "Harvested page {}, {} messages so far",
            aggregate.pages,
            aggregate.total_messages()
        );

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    tracing::info!(
        "Harvested {} messages from {} senders over {} pages ({} dropped)",
        aggregate.total_messages(),
        aggregate.records.len(),
        aggregate.pages,
        aggregate.dropped.len()
    );

    Ok(aggregate)
}
