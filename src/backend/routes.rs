use crate::automation::schema::{
    AutomationRequest, AutomationStatus, LaunchAck, DEFAULT_CITY, TOTAL_FIELDS,
};
use crate::backend::job::JobRunner;
use crate::backend::status::StatusBoard;
use crate::error::{PilotError, Result};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const PROVIDER: &str = "torrent_power";
pub const JOB_AUTOMATION_TYPE: &str = "rpa_cdp";

/// The running job and the board it writes to. Each start gets a fresh
/// board, so a replaced job can never write into its successor's status.
struct JobSlot {
    board: Arc<StatusBoard>,
    handle: Option<JoinHandle<()>>,
}

pub struct BackendContext {
    runner: Arc<dyn JobRunner>,
    portal_url: String,
    job: Mutex<JobSlot>,
}

impl BackendContext {
    pub fn new(runner: Arc<dyn JobRunner>, portal_url: impl Into<String>) -> Self {
        Self {
            runner,
            portal_url: portal_url.into(),
            job: Mutex::new(JobSlot {
                board: Arc::new(StatusBoard::new()),
                handle: None,
            }),
        }
    }

    /// Board of the current (or last) job.
    pub fn board(&self) -> Arc<StatusBoard> {
        self.job.lock().board.clone()
    }

    /// Start `request` on a fresh board, aborting any job still running.
    fn spawn_job(&self, request: AutomationRequest) {
        let mut slot = self.job.lock();
        if let Some(previous) = slot.handle.take() {
            if !previous.is_finished() {
                tracing::warn!("Replacing an automation job that was still running");
            }
            previous.abort();
        }
        let board = Arc::new(StatusBoard::new());
        slot.board = board.clone();
        let runner = self.runner.clone();
        slot.handle = Some(tokio::spawn(async move { runner.run(request, board).await }));
    }
}

pub type BackendState = Arc<BackendContext>;

type ApiResult<T> = std::result::Result<T, (StatusCode, Json<Value>)>;

fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

async fn bearer_auth(
    State(expected): State<String>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, StatusCode> {
    if request.uri().path() == "/api/health" {
        return Ok(next.run(request).await);
    }
    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match provided {
        Some(token) if token == expected => Ok(next.run(request).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

pub fn router(state: BackendState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/torrent-automation/start-automation", post(start_automation))
        .route("/api/torrent-automation/automation-status", get(automation_status))
        .route("/api/torrent-automation/test-connection", get(test_connection))
        .route("/api/torrent-automation/supported-fields", get(supported_fields))
        .with_state(state)
}

/// Router with auth, concurrency limit and CORS applied.
pub fn app(state: BackendState, api_token: Option<String>) -> Router {
    use tower::limit::ConcurrencyLimitLayer;
    let base_router = router(state);
    let routes = match api_token.filter(|t| !t.is_empty()) {
        Some(token) => base_router.route_layer(middleware::from_fn_with_state(token, bearer_auth)),
        None => base_router,
    };
    routes.layer(ConcurrencyLimitLayer::new(32)).layer(
        tower_http::cors::CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION]),
    )
}

pub async fn run_server(state: BackendState, bind: &str, api_token: Option<String>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| PilotError::Config(format!("Failed to bind {}: {}", bind, e)))?;
    let app = app(state, api_token);
    tracing::info!("Automation backend listening on http://{}", bind);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

// ---------------------------------------------------------------------------
// Automation
// ---------------------------------------------------------------------------

async fn start_automation(
    State(state): State<BackendState>,
    Json(request): Json<AutomationRequest>,
) -> ApiResult<Json<LaunchAck>> {
    tracing::info!(
        "Automation request: city={:?} service_number={:?} t_number={:?}",
        request.city,
        request.service_number,
        request.t_number
    );

    if let Some(detail) = request.validation_error() {
        tracing::warn!("Rejected automation request: {}", detail);
        return Err((StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))));
    }

    state.spawn_job(request);

    Ok(Json(LaunchAck {
        success: true,
        message: "Automation started successfully".to_string(),
        details: Some(
            "Automation is running in background. Check status endpoint for updates.".to_string(),
        ),
        timestamp: Some(now()),
        provider: Some(PROVIDER.to_string()),
        automation_type: Some(JOB_AUTOMATION_TYPE.to_string()),
        portal_url: Some(state.portal_url.clone()),
        fields_filled: Some(0),
        total_fields: Some(TOTAL_FIELDS),
        error: None,
    }))
}

async fn automation_status(State(state): State<BackendState>) -> Json<AutomationStatus> {
    Json(state.board().snapshot())
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

async fn test_connection(State(state): State<BackendState>) -> Json<Value> {
    let status = state.board().snapshot().status;
    Json(json!({
        "success": true,
        "message": "Torrent Power automation service is ready",
        "timestamp": now(),
        "automation_type": JOB_AUTOMATION_TYPE,
        "browser": "Chrome via DevTools Protocol",
        "service_status": status,
        "portal_url": state.portal_url,
        "features": [
            "Browser automation ready",
            "Real form filling",
            "Visual field highlighting",
            "User-controlled submission",
        ],
    }))
}

async fn supported_fields() -> Json<Value> {
    Json(json!({
        "success": true,
        "provider": PROVIDER,
        "automation_type": JOB_AUTOMATION_TYPE,
        "supported_fields": {
            "city": {
                "type": "dropdown",
                "required": true,
                "default": DEFAULT_CITY,
                "options": ["Ahmedabad", "Surat", "Gandhinagar", "Bhavnagar"],
                "description": "City/Location for service",
            },
            "service_number": {
                "type": "text",
                "required": true,
                "pattern": "^[A-Z0-9]+$",
                "description": "Service/Consumer Number",
            },
            "t_number": {
                "type": "text",
                "required": true,
                "pattern": "^T[0-9]+$",
                "description": "Transaction Number (T No)",
            },
            "mobile": {
                "type": "tel",
                "required": true,
                "pattern": "^[0-9]{10}$",
                "description": "10-digit mobile number",
            },
            "email": {
                "type": "email",
                "required": true,
                "description": "Email address for notifications",
            },
        },
        "workflow_steps": [
            "1. Launch Chrome with remote debugging",
            "2. Navigate to the Torrent Power name change form",
            "3. Wait for form elements to load",
            "4. Locate and fill form fields using selector chains",
            "5. Highlight filled fields",
            "6. Show a review notice on the page",
            "7. Leave submission to the applicant",
        ],
        "timestamp": now(),
    }))
}
