//! Single-slot transient notifications.
//!
//! The surface owns the active handle and its dismissal task. Showing a new
//! message aborts the previous timer and removes the previous element before
//! inserting, so at most one notification exists at a time.

use crate::agent::dom::PageDom;
use crate::error::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const ELEMENT_ID_PREFIX: &str = "portalpilot-notification";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationHandle(u64);

impl NotificationHandle {
    pub fn element_id(&self) -> String {
        format!("{}-{}", ELEMENT_ID_PREFIX, self.0)
    }
}

struct ActiveNotification {
    handle: NotificationHandle,
    timer: JoinHandle<()>,
}

pub struct NotificationSurface {
    dom: Arc<dyn PageDom>,
    dismiss_after: Duration,
    slot: Arc<Mutex<Option<ActiveNotification>>>,
    next_id: AtomicU64,
}

impl NotificationSurface {
    pub fn new(dom: Arc<dyn PageDom>, dismiss_after: Duration) -> Self {
        Self {
            dom,
            dismiss_after,
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn show(&self, message: &str) -> Result<NotificationHandle> {
        self.clear().await?;

        let handle = NotificationHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.dom.insert_notification(&handle.element_id(), message).await?;
        tracing::info!("Notification: {}", message);

        let timer = tokio::spawn(dismiss_later(
            self.dom.clone(),
            self.slot.clone(),
            handle,
            self.dismiss_after,
        ));
        let stale = self.slot.lock().replace(ActiveNotification { handle, timer });
        if let Some(stale) = stale {
            // Another show landed between our clear and insert.
            stale.timer.abort();
            self.dom.remove_notification(&stale.handle.element_id()).await?;
        }
        Ok(handle)
    }

    /// Remove the active notification, if any, and cancel its timer.
    pub async fn clear(&self) -> Result<()> {
        let previous = self.slot.lock().take();
        if let Some(previous) = previous {
            previous.timer.abort();
            self.dom.remove_notification(&previous.handle.element_id()).await?;
        }
        Ok(())
    }

    pub fn active(&self) -> Option<NotificationHandle> {
        self.slot.lock().as_ref().map(|a| a.handle)
    }
}

impl Drop for NotificationSurface {
    fn drop(&mut self) {
        if let Some(active) = self.slot.lock().take() {
            active.timer.abort();
        }
    }
}

async fn dismiss_later(
    dom: Arc<dyn PageDom>,
    slot: Arc<Mutex<Option<ActiveNotification>>>,
    handle: NotificationHandle,
    after: Duration,
) {
    tokio::time::sleep(after).await;

    let still_active = {
        let mut guard = slot.lock();
        if guard.as_ref().map(|a| a.handle) == Some(handle) {
            guard.take();
            true
        } else {
            false
        }
    };
    if !still_active {
        return;
    }

    if let Err(e) = dom.remove_notification(&handle.element_id()).await {
        tracing::warn!("Failed to dismiss notification: {}", e);
    }
}
