use crate::agent::cdp::{CDPClient, CdpEvent, DETACHED_EVENT};
use crate::engine::classifier::{is_portal_host, PageContext};
use crate::engine::dispatcher::{ActionDispatcher, PageOutcome};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const LOAD_EVENT: &str = "Page.loadEventFired";

/// Where navigations come from. Implemented by the CDP client.
#[async_trait]
pub trait NavigationSource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<CdpEvent>;
    async fn current_url(&self) -> Result<String>;
}

#[async_trait]
impl NavigationSource for CDPClient {
    fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        CDPClient::subscribe(self)
    }

    async fn current_url(&self) -> Result<String> {
        CDPClient::current_url(self).await
    }
}

pub type OutcomeSender = mpsc::UnboundedSender<(PageContext, PageOutcome)>;

/// Runs the dispatcher once per page load on the portal host.
pub struct PageWatcher {
    source: Arc<dyn NavigationSource>,
    dispatcher: Arc<ActionDispatcher>,
    hostname: String,
    outcomes: Option<OutcomeSender>,
}

impl PageWatcher {
    pub fn new(
        source: Arc<dyn NavigationSource>,
        dispatcher: Arc<ActionDispatcher>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            source,
            dispatcher,
            hostname: hostname.into(),
            outcomes: None,
        }
    }

    /// Report each finished dispatch on `tx`.
    pub fn with_outcomes(mut self, tx: OutcomeSender) -> Self {
        self.outcomes = Some(tx);
        self
    }

    /// Watch until `shutdown` is cancelled or the page connection goes away.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        // Subscribe before reading the current page so no load is missed in between.
        let mut events = self.source.subscribe();
        let mut current: Option<JoinHandle<()>> = None;

        self.on_navigation(&mut current).await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Page watcher stopping");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) if event.method == LOAD_EVENT => {
                        self.on_navigation(&mut current).await
                    }
                    Ok(event) if event.method == DETACHED_EVENT => {
                        tracing::info!("Page connection closed, watcher exiting");
                        break;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Page watcher lagged, {} events skipped", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }

        if let Some(run) = current.take() {
            run.abort();
        }
        Ok(())
    }

    async fn on_navigation(&self, current: &mut Option<JoinHandle<()>>) {
        // Whatever the previous page was doing targets a document that is gone.
        if let Some(previous) = current.take() {
            if !previous.is_finished() {
                tracing::debug!("Aborting dispatch for previous page");
            }
            previous.abort();
        }

        let url = match self.source.current_url().await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Could not read page URL: {}", e);
                return;
            }
        };

        if !is_portal_host(&url, &self.hostname) {
            tracing::debug!("Ignoring page outside {}: {}", self.hostname, url);
            return;
        }

        let page = PageContext::from_url(url);
        let dispatcher = self.dispatcher.clone();
        let outcomes = self.outcomes.clone();
        *current = Some(tokio::spawn(async move {
            let outcome = dispatcher.dispatch(&page).await;
            if let Some(tx) = outcomes {
                let _ = tx.send((page, outcome));
            }
        }));
    }
}
