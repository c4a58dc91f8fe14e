//! The backend job: open the name-change form in Chrome and fill it,
//! reporting checkpoints on the status board.

use crate::agent::cdp::CDPClient;
use crate::agent::dom::{CdpDom, PageDom};
use crate::automation::schema::{AutomationRequest, JobStatus, TOTAL_FIELDS};
use crate::backend::status::StatusBoard;
use crate::config::{BrowserConfig, FormConfig};
use crate::engine::filler::{FieldFiller, MatchMode};
use crate::engine::notification::NotificationSurface;
use crate::engine::selectors::{
    SelectorChain, CITY_SELECT, EMAIL_INPUT, FORM_MOBILE_INPUT, SERVICE_NUMBER_INPUT, TEXT_INPUTS,
    T_NUMBER_INPUT,
};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

const VERIFY_PAUSE: Duration = Duration::from_secs(1);
const PAGE_NOTICE_DURATION: Duration = Duration::from_secs(10);

/// Runs one automation job to completion, reporting on `board`.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, request: AutomationRequest, board: Arc<StatusBoard>);
}

enum FieldTarget {
    /// Dropdown matched case-insensitively
    Select(SelectorChain),
    /// Text input, falling back to the n-th text input on the page
    Input(SelectorChain, usize),
}

struct FormStep {
    progress: u32,
    message: &'static str,
    target: FieldTarget,
}

static FORM_STEPS: [FormStep; TOTAL_FIELDS as usize] = [
    FormStep {
        progress: 50,
        message: "Filling City field...",
        target: FieldTarget::Select(CITY_SELECT),
    },
    FormStep {
        progress: 60,
        message: "Filling Service Number...",
        target: FieldTarget::Input(SERVICE_NUMBER_INPUT, 0),
    },
    FormStep {
        progress: 70,
        message: "Filling T Number...",
        target: FieldTarget::Input(T_NUMBER_INPUT, 1),
    },
    FormStep {
        progress: 80,
        message: "Filling Mobile Number...",
        target: FieldTarget::Input(FORM_MOBILE_INPUT, 2),
    },
    FormStep {
        progress: 90,
        message: "Filling Email Address...",
        target: FieldTarget::Input(EMAIL_INPUT, 3),
    },
];

/// Fill the application on `dom`. Returns how many fields were set.
pub async fn fill_application(
    dom: &dyn PageDom,
    request: &AutomationRequest,
    board: &StatusBoard,
    pause: Duration,
) -> Result<u32> {
    let filler = FieldFiller::new(dom);
    let values = [
        &request.city,
        &request.service_number,
        &request.t_number,
        &request.mobile,
        &request.email,
    ];
    let mut filled = 0;

    for (step, value) in FORM_STEPS.iter().zip(values) {
        let log = match &step.target {
            FieldTarget::Select(_) => format!("Selecting city: {}", value),
            FieldTarget::Input(chain, _) => format!("Entering {}", chain.name.replace('_', " ")),
        };
        board.update(JobStatus::Running, step.progress, step.message, filled, Some(log.as_str()));

        if value.is_empty() {
            tracing::warn!("No value for step {:?}, skipping", step.message);
            continue;
        }

        let ok = match &step.target {
            FieldTarget::Select(chain) => {
                filler
                    .select_option(chain, value, MatchMode::CaseInsensitive)
                    .await?
            }
            FieldTarget::Input(chain, position) => {
                filler.fill(chain, value).await?
                    || filler.fill_nth(TEXT_INPUTS, *position, value).await?
            }
        };
        if ok {
            filled += 1;
        }
        tokio::time::sleep(pause).await;
    }

    Ok(filled)
}

/// Drives a real Chrome through CDP.
pub struct BrowserFormJob {
    browser: BrowserConfig,
    form: FormConfig,
}

impl BrowserFormJob {
    pub fn new(browser: BrowserConfig, form: FormConfig) -> Self {
        Self { browser, form }
    }

    async fn load_form(&self, client: &CDPClient) -> Result<()> {
        client.navigate(&self.form.name_change_url).await?;
        client
            .wait_for_selector("form", Duration::from_millis(self.form.form_wait_ms))
            .await
    }
}

#[async_trait]
impl JobRunner for BrowserFormJob {
    async fn run(&self, request: AutomationRequest, board: Arc<StatusBoard>) {
        board.update(
            JobStatus::Running,
            10,
            "Opening browser...",
            0,
            Some("Initializing browser automation"),
        );
        board.update(
            JobStatus::Running,
            20,
            "Navigating to Torrent Power website...",
            0,
            Some("Opening Torrent Power portal"),
        );
        board.update(
            JobStatus::Running,
            30,
            "Setting up browser driver...",
            0,
            Some("Configuring Chrome browser"),
        );

        let client = match CDPClient::launch(
            &self.browser.chrome_path,
            self.browser.cdp_port,
            self.browser.headless,
            self.browser.user_data_dir.as_deref(),
        )
        .await
        {
            Ok(client) => Arc::new(client),
            Err(e) => {
                tracing::error!("Browser setup failed: {}", e);
                board.fail("Failed to setup browser", "Browser setup failed");
                return;
            }
        };

        board.update(
            JobStatus::Running,
            40,
            "Loading application form...",
            0,
            Some("Loading name change form"),
        );
        if let Err(e) = self.load_form(&client).await {
            tracing::error!("Website navigation failed: {}", e);
            board.fail("Failed to load website", "Website navigation failed");
            close_browser(client).await;
            return;
        }

        let dom: Arc<dyn PageDom> = Arc::new(CdpDom::new(client.clone()));
        let pause = Duration::from_millis(self.form.field_pause_ms);
        let filled = match fill_application(dom.as_ref(), &request, &board, pause).await {
            Ok(filled) => filled,
            Err(e) => {
                tracing::error!("Form filling error: {}", e);
                board.fail(&format!("Error: {}", e), &format!("Automation error: {}", e));
                drop(dom);
                close_browser(client).await;
                return;
            }
        };

        if filled == 0 {
            board.fail("Form filling failed", "Failed to fill form fields");
            drop(dom);
            close_browser(client).await;
            return;
        }

        let summary = if filled == TOTAL_FIELDS {
            "All fields filled successfully".to_string()
        } else {
            format!("{} of {} fields filled", filled, TOTAL_FIELDS)
        };
        board.update(
            JobStatus::Running,
            95,
            "Verifying filled data...",
            filled,
            Some(summary.as_str()),
        );

        let notice = NotificationSurface::new(dom.clone(), PAGE_NOTICE_DURATION);
        let text = format!(
            "Form auto-filled. Fields filled: {}/{}. Please review before submitting.",
            filled, TOTAL_FIELDS
        );
        if let Err(e) = notice.show(&text).await {
            tracing::warn!("Could not show page notice: {}", e);
        }
        tokio::time::sleep(VERIFY_PAUSE).await;

        board.update(
            JobStatus::Completed,
            100,
            "Automation completed successfully!",
            filled,
            Some("Form auto-fill completed"),
        );

        tokio::time::sleep(Duration::from_millis(self.form.review_hold_ms)).await;
        drop(notice);
        drop(dom);
        close_browser(client).await;
        board.update(
            JobStatus::Completed,
            100,
            "Browser closed",
            filled,
            Some("Browser closed automatically"),
        );
    }
}

/// Close gracefully when we hold the last reference; otherwise `Drop` kills Chrome.
async fn close_browser(client: Arc<CDPClient>) {
    match Arc::try_unwrap(client) {
        Ok(mut client) => {
            if let Err(e) = client.close().await {
                tracing::warn!("Failed to close browser: {}", e);
            }
        }
        Err(_) => tracing::debug!("Browser still referenced, leaving it to drop"),
    }
}
