//! The online-search abstraction: the uniform contract every provider
//! implements, the life-cycle of one search, and the streaming of found
//! entries and progress back to the consumer.
//!
//! A search is one task per provider. The provider's `execute` drives its
//! chain of HTTP requests against a [`SearchSession`], which carries the
//! event channel, the cancellation token, and the step counter. The runner
//! in [`start_search`] turns the return value of `execute` into the single
//! terminal [`SearchEvent::Stopped`] of that search, so providers cannot
//! accidentally emit zero or two terminals.

pub mod federator;
pub mod helpers;
pub mod query;
pub mod sanitize;
pub mod spec_parser;

use crate::error::{SearchError, SearchOutcome};
use crate::http::remove_api_key;
use crate::model::BibEntry;
use async_trait::async_trait;
use reqwest::Response;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

pub use query::{QueryKey, SearchQuery};

/// Events emitted while a provider search runs.
#[derive(Debug)]
pub enum SearchEvent {
    Progress { current: u32, total: u32 },
    FoundEntry(BibEntry),
    /// Exactly one per started search, always last.
    Stopped(SearchOutcome),
}

/// A best-effort user-visible notification (e.g. a desktop popup). The
/// hook is optional; without one, notifications are silently skipped.
#[derive(Debug, Clone)]
pub struct Notification {
    pub title: String,
    pub text: String,
    pub icon: String,
    pub timeout: Duration,
}

pub type NotificationHook = Arc<dyn Fn(Notification) + Send + Sync>;

/// The uniform contract implemented by every scholarly provider.
#[async_trait]
pub trait OnlineSearch: Send + Sync {
    /// Human-readable provider name, e.g. "arXiv.org".
    fn label(&self) -> &'static str;

    /// Stable machine name: the label stripped to alphanumerics.
    fn name(&self) -> String {
        self.label()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect::<String>()
            .to_lowercase()
    }

    /// The provider's website.
    fn homepage(&self) -> Url;

    /// Where to look for the provider's icon; defaults to
    /// `<homepage>/favicon.ico`.
    fn favicon_url(&self) -> Url {
        let mut url = self.homepage();
        url.set_path("/favicon.ico");
        url
    }

    /// Drive the provider's request chain for one query. Entries and
    /// progress go through the session; the returned result becomes the
    /// terminal status.
    async fn execute(
        &self,
        session: &SearchSession,
        query: &SearchQuery,
    ) -> Result<(), SearchError>;
}

/// Per-search state shared between the runner and the provider code.
pub struct SearchSession {
    label: &'static str,
    tx: mpsc::UnboundedSender<SearchEvent>,
    cancel: CancellationToken,
    cur_step: AtomicU32,
    num_steps: AtomicU32,
    notify: Option<NotificationHook>,
}

impl SearchSession {
    fn new(
        label: &'static str,
        tx: mpsc::UnboundedSender<SearchEvent>,
        cancel: CancellationToken,
        notify: Option<NotificationHook>,
    ) -> Self {
        Self {
            label,
            tx,
            cancel,
            cur_step: AtomicU32::new(0),
            num_steps: AtomicU32::new(1),
            notify,
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Declare the number of protocol steps and emit the initial progress.
    pub fn progress_init(&self, total: u32) {
        self.cur_step.store(0, Ordering::Relaxed);
        self.num_steps.store(total.max(1), Ordering::Relaxed);
        self.emit_progress();
    }

    /// Advance the step counter by one and emit progress.
    pub fn step(&self) {
        self.cur_step.fetch_add(1, Ordering::Relaxed);
        self.emit_progress();
    }

    /// Grow the total step count, e.g. when a redirect adds a request.
    /// Keeps the reported progress monotonically non-decreasing.
    pub fn add_steps(&self, extra: u32) {
        self.num_steps.fetch_add(extra, Ordering::Relaxed);
        self.emit_progress();
    }

    fn emit_progress(&self) {
        let total = self.num_steps.load(Ordering::Relaxed);
        let current = self.cur_step.load(Ordering::Relaxed).min(total);
        let _ = self.tx.send(SearchEvent::Progress { current, total });
    }

    /// Sanitize an entry, stamp its origin, and stream it to the consumer.
    /// Returns false for entries that sanitize down to nothing.
    pub fn publish(&self, mut entry: BibEntry) -> bool {
        sanitize::sanitize_entry(&mut entry);
        sanitize::stamp_origin(&mut entry, self.label);
        if entry.id.is_empty() {
            warn!(provider = self.label, "Discarding entry with empty id");
            return false;
        }
        self.tx.send(SearchEvent::FoundEntry(entry)).is_ok()
    }

    /// Central response classifier, the gate every HTTP completion passes
    /// through. Converts a post-cancellation arrival into `Cancelled`,
    /// maps transport and HTTP status errors onto the outcome enum, and
    /// raises a user-visible notification on failure.
    pub fn guard(
        &self,
        result: Result<Response, reqwest::Error>,
    ) -> Result<Response, SearchError> {
        if self.is_cancelled() {
            debug!(provider = self.label, "Search got cancelled");
            return Err(SearchError::Cancelled);
        }
        let error = match result {
            Ok(response) => match response.error_for_status() {
                Ok(response) => return Ok(response),
                Err(e) => SearchError::from(e),
            },
            Err(e) => SearchError::from(e),
        };
        warn!(provider = self.label, error = %error, "Search request failed");
        self.send_visual_notification(
            format!("Searching '{}' failed with error message:\n\n{error}", self.label),
            Duration::from_secs(7),
        );
        Err(error)
    }

    /// Read a response body as text; an empty body is only worth a warning.
    pub async fn read_text(&self, response: Response) -> Result<String, SearchError> {
        let request_url = response.url().clone();
        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;
        if self.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        if body.is_empty() {
            warn!(
                provider = self.label,
                url = %remove_api_key(&request_url),
                "Search returned no data"
            );
        }
        Ok(body)
    }

    /// Best-effort desktop notification; skipped when no hook is set.
    pub fn send_visual_notification(&self, text: String, timeout: Duration) {
        if let Some(hook) = &self.notify {
            hook(Notification {
                title: self.label.to_string(),
                text,
                icon: "bibfetch".to_string(),
                timeout,
            });
        }
    }
}

/// Refuse a search before it starts (e.g. the query lacks a required
/// field). The delay keeps the terminal event from arriving before the
/// caller had a chance to hook up its event loop.
pub async fn delayed_stop(error: SearchError) -> SearchError {
    tokio::time::sleep(Duration::from_millis(500)).await;
    error
}

/// Handle to one running provider search.
pub struct SearchHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SearchHandle {
    /// Request cancellation. In-flight responses still arrive and are
    /// converted into a `Cancelled` terminal; no event is lost.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Start one provider search. Returns the handle and the event stream; the
/// stream ends with exactly one `Stopped` event.
pub fn start_search(
    engine: Arc<dyn OnlineSearch>,
    query: SearchQuery,
    cancel: CancellationToken,
    notify: Option<NotificationHook>,
) -> (SearchHandle, mpsc::UnboundedReceiver<SearchEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let session = SearchSession::new(engine.label(), tx.clone(), cancel.clone(), notify);

    let join = tokio::spawn(async move {
        let outcome = match engine.execute(&session, &query).await {
            Ok(()) => SearchOutcome::Success,
            Err(error) => {
                let outcome = error.outcome();
                if outcome == SearchOutcome::Cancelled {
                    debug!(provider = engine.label(), "Search cancelled");
                } else {
                    warn!(provider = engine.label(), %error, "Search stopped with error");
                }
                outcome
            }
        };
        // Final progress tick so consumers see a full bar
        let total = session.num_steps.load(Ordering::Relaxed);
        session.cur_step.store(total, Ordering::Relaxed);
        session.emit_progress();
        let _ = tx.send(SearchEvent::Stopped(outcome));
    });

    (SearchHandle { cancel, join }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;

    struct StaticEngine {
        fail: bool,
    }

    #[async_trait]
    impl OnlineSearch for StaticEngine {
        fn label(&self) -> &'static str {
            "Static Test Engine"
        }

        fn homepage(&self) -> Url {
            Url::parse("https://example.org/").unwrap()
        }

        async fn execute(
            &self,
            session: &SearchSession,
            _query: &SearchQuery,
        ) -> Result<(), SearchError> {
            session.progress_init(1);
            if self.fail {
                return Err(SearchError::Network("unreachable".into()));
            }
            let mut entry = BibEntry::new(EntryKind::Misc, "static1");
            entry.set_plain(BibEntry::TITLE, "A static result");
            session.publish(entry);
            session.step();
            Ok(())
        }
    }

    async fn drain(mut rx: mpsc::UnboundedReceiver<SearchEvent>) -> Vec<SearchEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn successful_search_emits_entry_then_single_terminal() {
        let engine = Arc::new(StaticEngine { fail: false });
        let (handle, rx) = start_search(
            engine,
            SearchQuery::free_text("anything", 5),
            CancellationToken::new(),
            None,
        );
        let events = drain(rx).await;
        handle.join().await;

        let terminals: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SearchEvent::Stopped(_)))
            .collect();
        assert_eq!(terminals.len(), 1);
        assert!(matches!(
            events.last().unwrap(),
            SearchEvent::Stopped(SearchOutcome::Success)
        ));
        let found = events
            .iter()
            .any(|e| matches!(e, SearchEvent::FoundEntry(entry) if entry.field_text(BibEntry::FETCHED_FROM) == "Static Test Engine"));
        assert!(found, "published entry carries x-fetchedfrom");
    }

    #[tokio::test]
    async fn failing_search_maps_error_to_terminal() {
        let engine = Arc::new(StaticEngine { fail: true });
        let (_handle, rx) = start_search(
            engine,
            SearchQuery::free_text("anything", 5),
            CancellationToken::new(),
            None,
        );
        let events = drain(rx).await;
        assert!(matches!(
            events.last().unwrap(),
            SearchEvent::Stopped(SearchOutcome::NetworkError)
        ));
    }

    #[tokio::test]
    async fn delayed_stop_takes_about_half_a_second() {
        let started = std::time::Instant::now();
        let error = delayed_stop(SearchError::InvalidArguments("empty query".into())).await;
        assert!(started.elapsed() >= Duration::from_millis(450));
        assert_eq!(error.outcome(), SearchOutcome::InvalidArguments);
    }

    #[test]
    fn machine_name_strips_non_alphanumerics() {
        let engine = StaticEngine { fail: false };
        assert_eq!(engine.name(), "statictestengine");
    }
}
