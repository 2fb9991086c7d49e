//! Fan a single query out to every enabled provider and aggregate the
//! results: entries are forwarded as they arrive, per-provider progress is
//! folded into one overall permille value, and a single `Finished` event
//! strictly follows the last provider terminal.

use super::{start_search, NotificationHook, OnlineSearch, SearchEvent, SearchQuery};
use crate::error::{Error, SearchOutcome};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Events of a federated search.
#[derive(Debug)]
pub enum FederatedEvent {
    FoundEntry {
        provider: String,
        entry: crate::model::BibEntry,
    },
    /// Overall progress in permille across all providers.
    Progress { permille: u32 },
    /// One provider reached its terminal state.
    ProviderStopped {
        provider: String,
        outcome: SearchOutcome,
    },
    /// All providers are done; always the last event.
    Finished,
}

/// The provider-federation engine.
pub struct SearchFederator {
    engines: Vec<Arc<dyn OnlineSearch>>,
    notify: Option<NotificationHook>,
    running: Arc<AtomicBool>,
}

impl SearchFederator {
    #[must_use]
    pub fn new(engines: Vec<Arc<dyn OnlineSearch>>) -> Self {
        Self {
            engines,
            notify: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Install a hook for user-visible error notifications.
    #[must_use]
    pub fn with_notification_hook(mut self, hook: NotificationHook) -> Self {
        self.notify = Some(hook);
        self
    }

    /// Labels of the participating providers.
    #[must_use]
    pub fn engine_labels(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.label()).collect()
    }

    #[must_use]
    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }

    /// Start a federated search. A federator runs one search at a time; a
    /// second `submit` while one is in flight is rejected; cancel or
    /// drain the previous search first.
    pub fn submit(&self, query: SearchQuery) -> crate::error::Result<FederatedSearch> {
        if self.engines.is_empty() {
            return Err(Error::InvalidInput {
                field: "engines".to_string(),
                reason: "no search engine is enabled".to_string(),
            });
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidInput {
                field: "query".to_string(),
                reason: "a federated search is already running".to_string(),
            });
        }

        info!(
            engines = self.engines.len(),
            results = query.num_results,
            "Starting federated search"
        );

        let cancel = CancellationToken::new();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (collect_tx, mut collect_rx) = mpsc::unbounded_channel::<(usize, SearchEvent)>();

        let mut labels = Vec::with_capacity(self.engines.len());
        for (index, engine) in self.engines.iter().enumerate() {
            labels.push(engine.label().to_string());
            let (_handle, mut rx) = start_search(
                Arc::clone(engine),
                query.clone(),
                cancel.child_token(),
                self.notify.clone(),
            );
            let collect_tx = collect_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if collect_tx.send((index, event)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(collect_tx);

        let engine_total = self.engines.len();
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            let mut permille: HashMap<usize, u32> = HashMap::new();
            let mut last_overall = 0u32;
            let mut stopped = 0usize;

            while let Some((index, event)) = collect_rx.recv().await {
                match event {
                    SearchEvent::Progress { current, total } => {
                        let clamped = current.min(total);
                        let value = if total > 0 { clamped * 1000 / total } else { 0 };
                        permille.insert(index, value);
                        let overall = permille.values().sum::<u32>() / engine_total as u32;
                        if overall != last_overall {
                            last_overall = overall;
                            let _ = event_tx.send(FederatedEvent::Progress { permille: overall });
                        }
                    }
                    SearchEvent::FoundEntry(entry) => {
                        let _ = event_tx.send(FederatedEvent::FoundEntry {
                            provider: labels[index].clone(),
                            entry,
                        });
                    }
                    SearchEvent::Stopped(outcome) => {
                        debug!(provider = %labels[index], %outcome, "Provider finished");
                        stopped += 1;
                        let _ = event_tx.send(FederatedEvent::ProviderStopped {
                            provider: labels[index].clone(),
                            outcome,
                        });
                    }
                }
            }
            // All per-engine forwarders have hung up, which requires every
            // provider to have delivered its terminal event.
            debug_assert_eq!(stopped, engine_total);
            let _ = event_tx.send(FederatedEvent::Finished);
            running.store(false, Ordering::SeqCst);
        });

        Ok(FederatedSearch {
            rx: event_rx,
            cancel,
        })
    }
}

/// Consumer side of one federated search.
pub struct FederatedSearch {
    rx: mpsc::UnboundedReceiver<FederatedEvent>,
    cancel: CancellationToken,
}

impl FederatedSearch {
    /// Next event; `None` after `Finished` has been delivered.
    pub async fn next_event(&mut self) -> Option<FederatedEvent> {
        self.rx.recv().await
    }

    /// Ask every provider to stop. Entries already in flight are still
    /// delivered; each provider then terminates with `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
