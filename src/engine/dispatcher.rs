use crate::agent::dom::PageDom;
use crate::config::TimingConfig;
use crate::engine::classifier::{LoginParameters, PageContext, PageKind};
use crate::engine::filler::{FieldFiller, MatchMode};
use crate::engine::notification::NotificationSurface;
use crate::engine::selectors::{
    click_all_labelled, DISCOM_SELECT, MOBILE_INPUT, SUBMIT_FALLBACK_SCOPE, SUBMIT_LABEL,
    SUBMIT_PRIMARY,
};
use crate::error::Result;
use serde::Serialize;
use std::sync::Arc;

pub const LOGIN_FILLED_MESSAGE: &str = "Auto-filled! Enter Captcha & Click Login";
pub const OTP_MESSAGE: &str = "Enter OTP and click Submit Otp";
pub const AUTO_SUBMIT_MESSAGE: &str = "Auto-submitting...";
pub const DASHBOARD_MESSAGE: &str = "Login Successful! Welcome to DGVCL Dashboard";

/// What a single dispatch did to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PageOutcome {
    Ignored,
    AwaitingLoginParameters,
    LoginFilled { mobile: bool, discom: bool },
    AwaitingOtp,
    SubmitClicked { clicks: usize, fallback: bool },
    SubmitNotFound,
    DashboardReached,
    Interrupted { reason: String },
}

/// Runs the per-page action for one navigation. Holds no state between runs.
pub struct ActionDispatcher {
    dom: Arc<dyn PageDom>,
    notifications: Arc<NotificationSurface>,
    timing: TimingConfig,
}

impl ActionDispatcher {
    pub fn new(
        dom: Arc<dyn PageDom>,
        notifications: Arc<NotificationSurface>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            dom,
            notifications,
            timing,
        }
    }

    /// DOM errors stop here and come back as `Interrupted`.
    pub async fn dispatch(&self, page: &PageContext) -> PageOutcome {
        tracing::debug!("Dispatching {} for {}", page.page_kind, page.url);
        match self.handle(page).await {
            Ok(outcome) => {
                tracing::info!("Page {} handled: {:?}", page.page_kind, outcome);
                outcome
            }
            Err(e) => {
                tracing::warn!("Page {} interrupted: {}", page.page_kind, e);
                PageOutcome::Interrupted { reason: e.to_string() }
            }
        }
    }

    async fn handle(&self, page: &PageContext) -> Result<PageOutcome> {
        match page.page_kind {
            PageKind::Login => self.handle_login(page).await,
            PageKind::Otp => {
                self.notifications.show(OTP_MESSAGE).await?;
                Ok(PageOutcome::AwaitingOtp)
            }
            PageKind::SelectUser => self.handle_select_user().await,
            PageKind::Dashboard => {
                self.notifications.show(DASHBOARD_MESSAGE).await?;
                Ok(PageOutcome::DashboardReached)
            }
            PageKind::Unknown => Ok(PageOutcome::Ignored),
        }
    }

    /// Prefill only. The CAPTCHA needs a human, so this page is never submitted.
    async fn handle_login(&self, page: &PageContext) -> Result<PageOutcome> {
        let params = LoginParameters::from_url(&page.url);
        let Some((mobile, discom)) = params.complete() else {
            tracing::info!("Login page without mobile/discom parameters, nothing to fill");
            return Ok(PageOutcome::AwaitingLoginParameters);
        };

        tokio::time::sleep(self.timing.login_settle()).await;

        let filler = FieldFiller::new(self.dom.as_ref());
        let mobile_filled = filler.fill(&MOBILE_INPUT, mobile).await?;
        let discom_selected = filler
            .select_option(&DISCOM_SELECT, discom, MatchMode::CaseSensitive)
            .await?;

        self.notifications.show(LOGIN_FILLED_MESSAGE).await?;
        Ok(PageOutcome::LoginFilled {
            mobile: mobile_filled,
            discom: discom_selected,
        })
    }

    async fn handle_select_user(&self) -> Result<PageOutcome> {
        tokio::time::sleep(self.timing.select_user_settle()).await;

        if let Some(button) = SUBMIT_PRIMARY.first_match(self.dom.as_ref()).await? {
            self.notifications.show(AUTO_SUBMIT_MESSAGE).await?;
            self.dom.click(&button).await?;
            return Ok(PageOutcome::SubmitClicked {
                clicks: 1,
                fallback: false,
            });
        }

        // Fallback clicks are silent: no notification.
        let clicks =
            click_all_labelled(self.dom.as_ref(), SUBMIT_FALLBACK_SCOPE, SUBMIT_LABEL).await?;
        if clicks == 0 {
            tracing::warn!("No submit control found on user select page");
            return Ok(PageOutcome::SubmitNotFound);
        }
        tracing::info!("Clicked {} control(s) labelled {:?}", clicks, SUBMIT_LABEL);
        Ok(PageOutcome::SubmitClicked { clicks, fallback: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::dom::{DomEvent, ElementLabel, ElementRef, SelectOptionEntry};
    use crate::agent::memory::{MemoryDom, MemoryElement};
    use crate::error::PilotError;
    use async_trait::async_trait;
    use std::time::Duration;

    fn dispatcher(dom: Arc<MemoryDom>) -> ActionDispatcher {
        let timing = TimingConfig::default();
        let surface = Arc::new(NotificationSurface::new(
            dom.clone(),
            timing.notification_dismiss(),
        ));
        ActionDispatcher::new(dom, surface, timing)
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_without_parameters_does_nothing() {
        let dom = Arc::new(MemoryDom::portal_page(PageKind::Login));
        let outcome = dispatcher(dom.clone())
            .dispatch(&PageContext::from_url("https://portal.guvnl.in/login.php?mobile=999"))
            .await;

        assert_eq!(outcome, PageOutcome::AwaitingLoginParameters);
        assert!(dom.notifications().is_empty());
        assert!(dom.elements().iter().all(|e| e.events.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_waits_for_settle_delay() {
        let dom = Arc::new(MemoryDom::portal_page(PageKind::Login));
        let d = dispatcher(dom.clone());
        let page = PageContext::from_url("https://portal.guvnl.in/login.php?mobile=1&discom=DGVCL");

        let start = tokio::time::Instant::now();
        d.dispatch(&page).await;
        assert!(start.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_user_fallback_clicks_every_submit_label() {
        let dom = Arc::new(
            MemoryDom::new()
                .with_element(MemoryElement::new("button").text("Submit"))
                .with_element(MemoryElement::new("button").text("Submit")),
        );
        let outcome = dispatcher(dom.clone())
            .dispatch(&PageContext::from_url("https://portal.guvnl.in/Submit_Otp.php"))
            .await;

        assert_eq!(
            outcome,
            PageOutcome::SubmitClicked {
                clicks: 2,
                fallback: true
            }
        );
        assert_eq!(dom.total_clicks(), 2);
        assert!(dom.notifications().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_user_without_controls() {
        let dom =
            Arc::new(MemoryDom::new().with_element(MemoryElement::new("button").text("Cancel")));
        let outcome = dispatcher(dom.clone())
            .dispatch(&PageContext::from_url("https://portal.guvnl.in/Submit_Otp.php"))
            .await;
        assert_eq!(outcome, PageOutcome::SubmitNotFound);
        assert_eq!(dom.total_clicks(), 0);
        assert!(dom.notifications().is_empty());
    }

    /// Every DOM call fails, like a detached CDP session.
    struct BrokenDom;

    #[async_trait]
    impl PageDom for BrokenDom {
        async fn query_selector(&self, _: &str) -> Result<Option<ElementRef>> {
            Err(PilotError::Cdp("WebSocket not connected".into()))
        }
        async fn query_selector_all(&self, _: &str) -> Result<Vec<ElementRef>> {
            Err(PilotError::Cdp("WebSocket not connected".into()))
        }
        async fn set_value(&self, _: &ElementRef, _: &str) -> Result<()> {
            Err(PilotError::Cdp("WebSocket not connected".into()))
        }
        async fn dispatch_event(&self, _: &ElementRef, _: DomEvent) -> Result<()> {
            Err(PilotError::Cdp("WebSocket not connected".into()))
        }
        async fn highlight(&self, _: &ElementRef) -> Result<()> {
            Err(PilotError::Cdp("WebSocket not connected".into()))
        }
        async fn options(&self, _: &ElementRef) -> Result<Vec<SelectOptionEntry>> {
            Err(PilotError::Cdp("WebSocket not connected".into()))
        }
        async fn select_index(&self, _: &ElementRef, _: usize) -> Result<()> {
            Err(PilotError::Cdp("WebSocket not connected".into()))
        }
        async fn label(&self, _: &ElementRef) -> Result<ElementLabel> {
            Err(PilotError::Cdp("WebSocket not connected".into()))
        }
        async fn click(&self, _: &ElementRef) -> Result<()> {
            Err(PilotError::Cdp("WebSocket not connected".into()))
        }
        async fn insert_notification(&self, _: &str, _: &str) -> Result<()> {
            Err(PilotError::Cdp("WebSocket not connected".into()))
        }
        async fn remove_notification(&self, _: &str) -> Result<()> {
            Err(PilotError::Cdp("WebSocket not connected".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dom_errors_become_interrupted() {
        let dom: Arc<dyn PageDom> = Arc::new(BrokenDom);
        let surface = Arc::new(NotificationSurface::new(dom.clone(), Duration::from_secs(5)));
        let d = ActionDispatcher::new(dom, surface, TimingConfig::default());

        let outcome = d
            .dispatch(&PageContext::from_url("https://portal.guvnl.in/checkOtp.php"))
            .await;
        match outcome {
            PageOutcome::Interrupted { reason } => assert!(reason.contains("not connected")),
            other => panic!("expected Interrupted, got {:?}", other),
        }
    }
}
