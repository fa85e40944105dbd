//! Paginated retrieval of a channel's full history.

use crate::error::HostError;
use crate::host::{self, ChatHost};
use crate::relay::registry::{Cancelled, CopyTicket};
use crate::{ChannelId, MessageId, SourceMessage};

/// Messages per page request; the platform maximum.
pub const PAGE_SIZE: u8 = 100;

/// Why a full-history fetch stopped short.
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    /// The job was stopped between page requests.
    #[error("history fetch cancelled")]
    Cancelled,

    /// A page request failed even after retries. Pages accumulated so far
    /// are discarded with it.
    #[error("history page fetch failed: {0}")]
    Fetch(#[source] HostError),
}

impl From<Cancelled> for PageError {
    fn from(_: Cancelled) -> Self {
        PageError::Cancelled
    }
}

/// Fetch the entire backlog of `source`, returned oldest first.
///
/// Pages arrive newest first from the platform. Each request asks for
/// messages strictly older than the last one seen, and the loop ends on
/// the first empty page, so page boundaries need no alignment with the
/// history length. The ticket is checked before every request: a stop
/// during a long backlog aborts the job before anything is replayed.
pub async fn fetch_all<H: ChatHost>(
    host: &H,
    source: ChannelId,
    dest: ChannelId,
    ticket: &CopyTicket,
) -> Result<Vec<SourceMessage>, PageError> {
    let mut messages: Vec<SourceMessage> = Vec::new();
    let mut before: Option<MessageId> = None;

    loop {
        ticket.checkpoint()?;

        // Large backlogs take a while to pull down; the typing indicator
        // on the destination doubles as a progress signal.
        if let Err(error) = host.typing(dest).await {
            tracing::debug!(%error, channel = dest, "typing indicator failed");
        }

        let page = host::with_retries("fetch_page", || host.fetch_page(source, PAGE_SIZE, before))
            .await
            .map_err(PageError::Fetch)?;

        let Some(oldest) = page.last() else {
            break;
        };
        before = Some(oldest.id);
        messages.extend(page);
    }

    messages.reverse();
    tracing::debug!(source, count = messages.len(), "history fetch complete");
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::registry::CopyRegistry;
    use crate::relay::testhost::{ScriptedHost, text_message};

    const SOURCE: ChannelId = 100;
    const DEST: ChannelId = 200;

    fn seeded_host(count: u64) -> ScriptedHost {
        let host = ScriptedHost::new();
        for id in 1..=count {
            host.push_history(text_message(SOURCE, id, "alice", &format!("message {id}")));
        }
        host
    }

    /// An empty channel produces an empty history and exactly one page
    /// request.
    #[tokio::test]
    async fn empty_channel_yields_nothing() {
        let registry = CopyRegistry::new();
        let ticket = registry.begin(DEST, SOURCE).expect("admission");
        let host = ScriptedHost::new();

        let messages = fetch_all(&host, SOURCE, DEST, &ticket).await.expect("fetch");
        assert!(messages.is_empty());
        assert_eq!(host.fetch_page_calls(), 1);
    }

    /// 250 messages come back oldest first across three full requests plus
    /// the terminating empty one, with no gaps or duplicates.
    #[tokio::test]
    async fn reassembles_paged_history_in_order() {
        let registry = CopyRegistry::new();
        let ticket = registry.begin(DEST, SOURCE).expect("admission");
        let host = seeded_host(250);

        let messages = fetch_all(&host, SOURCE, DEST, &ticket).await.expect("fetch");
        assert_eq!(messages.len(), 250);
        let ids: Vec<u64> = messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, (1..=250).collect::<Vec<u64>>(), "oldest first, contiguous");
        assert_eq!(host.fetch_page_calls(), 4);
    }

    /// A history whose length is an exact multiple of the page size ends on
    /// an empty page rather than a short one.
    #[test]
    fn page_aligned_history_terminates() {
        let registry = CopyRegistry::new();
        let ticket = registry.begin(DEST, SOURCE).expect("admission");
        let host = seeded_host(200);

        let messages =
            tokio_test::block_on(fetch_all(&host, SOURCE, DEST, &ticket)).expect("fetch");
        assert_eq!(messages.len(), 200);
        assert_eq!(host.fetch_page_calls(), 3, "two full pages plus the empty one");
    }

    /// A permanently failing page discards everything fetched so far.
    #[tokio::test]
    async fn failed_page_discards_partial_history() {
        let registry = CopyRegistry::new();
        let ticket = registry.begin(DEST, SOURCE).expect("admission");
        let host = seeded_host(250);
        host.fail_fetch_call(2);

        let error = fetch_all(&host, SOURCE, DEST, &ticket)
            .await
            .expect_err("second page fails");
        assert!(matches!(error, PageError::Fetch(_)));
    }

    /// A transient page failure is retried and the history still comes
    /// back complete.
    #[tokio::test(start_paused = true)]
    async fn transient_page_failure_is_retried() {
        let registry = CopyRegistry::new();
        let ticket = registry.begin(DEST, SOURCE).expect("admission");
        let host = seeded_host(150);
        host.fail_fetch_call_transiently(2);

        let messages = fetch_all(&host, SOURCE, DEST, &ticket).await.expect("fetch");
        assert_eq!(messages.len(), 150);
        assert_eq!(host.fetch_page_calls(), 4, "one extra request for the retry");
    }

    /// Stopping the job between pages aborts the fetch without another
    /// request.
    #[tokio::test]
    async fn stop_between_pages_cancels_fetch() {
        let registry = CopyRegistry::new();
        let ticket = registry.begin(DEST, SOURCE).expect("admission");
        let host = seeded_host(250);
        host.stop_after_fetches(2, registry.clone(), DEST);

        let error = fetch_all(&host, SOURCE, DEST, &ticket)
            .await
            .expect_err("stop lands between pages");
        assert!(matches!(error, PageError::Cancelled));
        assert_eq!(host.fetch_page_calls(), 2, "no request after the stop");
    }
}
