use crate::error::{PilotError, Result};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, WsMessage>;

/// Buffered CDP events per subscriber
const EVENT_CAPACITY: usize = 256;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_RETRIES: u32 = 30;

/// Emitted locally when the WebSocket to the page goes away.
pub const DETACHED_EVENT: &str = "Inspector.detached";

/// A CDP event pushed by the browser (a message without an `id`).
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: serde_json::Value,
}

/// CDP client speaking raw WebSocket to a single page target
pub struct CDPClient {
    ws_tx: Option<Arc<Mutex<WsSink>>>,
    responses: Arc<Mutex<HashMap<u32, tokio::sync::oneshot::Sender<serde_json::Value>>>>,
    events: broadcast::Sender<CdpEvent>,
    /// Chrome process ID, only set when this client spawned Chrome
    chrome_pid: Option<u32>,
    msg_id: Arc<Mutex<u32>>,
    cdp_port: u16,
}

impl CDPClient {
    pub fn new(cdp_port: u16) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ws_tx: None,
            responses: Arc::new(Mutex::new(HashMap::new())),
            events,
            chrome_pid: None,
            msg_id: Arc::new(Mutex::new(1)),
            cdp_port,
        }
    }

    pub fn cdp_port(&self) -> u16 {
        self.cdp_port
    }

    pub fn is_connected(&self) -> bool {
        self.ws_tx.is_some()
    }

    /// Attach to an already running Chrome started with `--remote-debugging-port`.
    pub async fn attach(cdp_port: u16) -> Result<Self> {
        let mut client = Self::new(cdp_port);
        client.connect_page_target().await?;
        Ok(client)
    }

    /// Launch Chrome with CDP enabled and connect
    pub async fn launch(
        chrome_path: &Path,
        cdp_port: u16,
        headless: bool,
        user_data_dir: Option<&Path>,
    ) -> Result<Self> {
        let mut client = Self::new(cdp_port);
        let mut cmd = Command::new(chrome_path);

        if let Some(dir) = user_data_dir {
            cmd.arg(format!("--user-data-dir={}", dir.display()));
        }
        cmd.arg(format!("--remote-debugging-port={}", cdp_port));

        if headless {
            cmd.arg("--headless=new");
            cmd.arg("--disable-gpu");
            cmd.arg("--no-sandbox");
            cmd.arg("--disable-dev-shm-usage");
        }

        cmd.arg("--no-first-run");
        cmd.arg("--no-default-browser-check");
        cmd.arg("--disable-notifications");
        cmd.arg("--disable-popup-blocking");
        cmd.arg("--window-size=1920,1080");
        cmd.arg("about:blank");

        let child = cmd
            .spawn()
            .map_err(|e| PilotError::Cdp(format!("Failed to launch Chrome: {}", e)))?;
        client.chrome_pid = Some(child.id());
        tracing::info!(
            "Launched Chrome pid={} cdp_port={} headless={}",
            child.id(),
            cdp_port,
            headless
        );

        client.connect_page_target().await?;
        Ok(client)
    }

    /// Poll `/json/list` until a page target accepts a WebSocket connection.
    async fn connect_page_target(&mut self) -> Result<()> {
        let list_url = format!("http://127.0.0.1:{}/json/list", self.cdp_port);
        let mut last_error = String::new();

        for attempt in 1..=CONNECT_RETRIES {
            match self.try_connect(&list_url).await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = e,
            }
            tracing::debug!("Retry {}/{}: {}", attempt, CONNECT_RETRIES, last_error);
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        Err(PilotError::Cdp(format!(
            "Failed to connect to Chrome after {} retries: {}",
            CONNECT_RETRIES, last_error
        )))
    }

    async fn try_connect(&mut self, list_url: &str) -> std::result::Result<(), String> {
        let response = reqwest::get(list_url)
            .await
            .map_err(|e| format!("Connection error: {}", e))?;
        if !response.status().is_success() {
            return Err(format!("HTTP error: {}", response.status()));
        }

        let targets = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| format!("Failed to parse targets response: {}", e))?;

        let ws_url = targets
            .as_array()
            .and_then(|arr| {
                arr.iter()
                    .find(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
            })
            .ok_or("No page target found")?
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or("No webSocketDebuggerUrl in page target")?
            .to_string();

        tracing::info!("Connecting to page target WebSocket: {}", ws_url);
        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| format!("Failed to connect WebSocket: {}", e))?;

        let (tx, rx) = StreamExt::split(ws_stream);
        self.ws_tx = Some(Arc::new(Mutex::new(tx)));
        tokio::spawn(read_loop(rx, self.responses.clone(), self.events.clone()));

        self.send_command("Page.enable", json!({}))
            .await
            .map_err(|e| e.to_string())?;
        self.send_command("Runtime.enable", json!({}))
            .await
            .map_err(|e| e.to_string())?;
        tracing::info!("CDP client connected on port {}", self.cdp_port);
        Ok(())
    }

    /// Send a CDP command and wait for its response
    pub async fn send_command(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let tx = self
            .ws_tx
            .as_ref()
            .ok_or_else(|| PilotError::Cdp("WebSocket not connected".to_string()))?;

        let (id, rx) = {
            let mut msg_id = self.msg_id.lock().await;
            let id = *msg_id;
            *msg_id += 1;

            let (tx, rx) = tokio::sync::oneshot::channel();
            self.responses.lock().await.insert(id, tx);
            (id, rx)
        };

        let command = json!({
            "id": id,
            "method": method,
            "params": params
        });

        tx.lock()
            .await
            .send(WsMessage::Text(command.to_string()))
            .await
            .map_err(|e| PilotError::Cdp(format!("Failed to send {}: {}", method, e)))?;

        let response = match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(PilotError::Cdp("Response channel closed".to_string())),
            Err(_) => {
                self.responses.lock().await.remove(&id);
                return Err(PilotError::Cdp(format!("Command timeout: {}", method)));
            }
        };

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(PilotError::Cdp(format!("{} failed: {}", method, message)));
        }

        Ok(response)
    }

    /// Evaluate a JavaScript expression in the page and return its value.
    /// Thrown exceptions become errors; `undefined` becomes `Value::Null`.
    pub async fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        let response = self
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await?;

        let result = response.get("result").cloned().unwrap_or_default();
        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| details.get("text"))
                .and_then(|t| t.as_str())
                .unwrap_or("script threw");
            return Err(PilotError::Cdp(format!("Evaluation failed: {}", text)));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(serde_json::Value::Null))
    }

    /// Navigate to a URL
    pub async fn navigate(&self, url: &str) -> Result<()> {
        let response = self
            .send_command("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = response
            .get("result")
            .and_then(|r| r.get("errorText"))
            .and_then(|e| e.as_str())
        {
            return Err(PilotError::Cdp(format!(
                "Navigation to {} failed: {}",
                url, error_text
            )));
        }
        tracing::info!("Navigated to: {}", url);
        Ok(())
    }

    /// Current URL as reported by the page
    pub async fn current_url(&self) -> Result<String> {
        let value = self.evaluate("window.location.href").await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PilotError::Cdp("window.location.href is not a string".to_string()))
    }

    /// Wait until `selector` matches an element
    pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let start = std::time::Instant::now();
        let expression = format!("!!document.querySelector({})", json!(selector));

        loop {
            // Pages mid-navigation can reject evaluation; keep polling until the deadline.
            match self.evaluate(&expression).await {
                Ok(v) if v.as_bool() == Some(true) => {
                    tracing::debug!("Element found: {}", selector);
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => tracing::trace!("wait_for_selector probe failed: {}", e),
            }

            if start.elapsed() > timeout {
                return Err(PilotError::Cdp(format!(
                    "Timeout waiting for element: {}",
                    selector
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Subscribe to CDP events (messages without an `id`)
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Close the WebSocket and kill Chrome if this client started it
    pub async fn close(&mut self) -> Result<()> {
        if let Some(tx) = self.ws_tx.take() {
            let mut tx_guard = tx.lock().await;
            let _ = tx_guard.close().await;
        }

        if let Some(pid) = self.chrome_pid.take() {
            kill_chrome(pid);
        }

        tracing::info!("CDP client closed on port {}", self.cdp_port);
        Ok(())
    }
}

impl Drop for CDPClient {
    fn drop(&mut self) {
        if let Some(pid) = self.chrome_pid.take() {
            kill_chrome(pid);
        }
    }
}

/// Route responses to their waiting senders and fan events out to subscribers.
async fn read_loop(
    mut rx: futures::stream::SplitStream<WsStream>,
    responses: Arc<Mutex<HashMap<u32, tokio::sync::oneshot::Sender<serde_json::Value>>>>,
    events: broadcast::Sender<CdpEvent>,
) {
    while let Some(msg) = rx.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) else {
                    continue;
                };
                if let Some(id) = json.get("id").and_then(|i| i.as_u64()) {
                    if let Some(sender) = responses.lock().await.remove(&(id as u32)) {
                        let _ = sender.send(json);
                    }
                } else if let Some(method) = json.get("method").and_then(|m| m.as_str()) {
                    let _ = events.send(CdpEvent {
                        method: method.to_string(),
                        params: json.get("params").cloned().unwrap_or_default(),
                    });
                }
                tracing::trace!("WS received: {}", text.chars().take(100).collect::<String>());
            }
            Ok(WsMessage::Close(_)) => {
                tracing::debug!("WebSocket closed");
                break;
            }
            Err(e) => {
                tracing::debug!("WebSocket error: {:?}", e);
                break;
            }
            _ => {}
        }
    }

    // Fail pending commands now instead of at their timeout.
    responses.lock().await.clear();
    let _ = events.send(CdpEvent {
        method: DETACHED_EVENT.to_string(),
        params: json!({ "reason": "websocket closed" }),
    });
}

fn kill_chrome(pid: u32) {
    #[cfg(unix)]
    {
        let _ = Command::new("kill").arg(pid.to_string()).spawn();
    }
    #[cfg(windows)]
    {
        let _ = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .spawn();
    }
}
