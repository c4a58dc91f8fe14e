//! DOM port used by the page engine, and its CDP-backed implementation.
//!
//! Elements are addressed through [`ElementRef`]s. The CDP implementation tags
//! each element it hands out with a `data-pp-ref` attribute so later calls can
//! find the same node again without holding remote object ids.

use crate::agent::cdp::CDPClient;
use crate::error::{PilotError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Background applied to fields the engine has filled
pub const HIGHLIGHT_COLOR: &str = "#90EE90";

const NOTIFICATION_STYLE: &str = "position:fixed;top:20px;right:20px;background:#4CAF50;\
    color:white;padding:15px 25px;border-radius:10px;font-size:16px;z-index:999999;\
    box-shadow:0 4px 20px rgba(0,0,0,0.3);";

/// Opaque handle to an element found by a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ref:{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectOptionEntry {
    pub index: usize,
    pub text: String,
    pub value: String,
}

/// What a control displays: its `value` property and its raw `textContent`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ElementLabel {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub text: String,
}

/// Synthetic events the filler dispatches after changing a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomEvent {
    Input,
    Change,
}

impl DomEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomEvent::Input => "input",
            DomEvent::Change => "change",
        }
    }
}

/// Best-effort DOM access. Absence is `Ok(None)` / empty, never an error;
/// `Err` is reserved for transport failures.
#[async_trait]
pub trait PageDom: Send + Sync {
    async fn query_selector(&self, selector: &str) -> Result<Option<ElementRef>>;
    async fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementRef>>;
    async fn set_value(&self, element: &ElementRef, value: &str) -> Result<()>;
    /// Dispatch a bubbling event of the given kind on the element.
    async fn dispatch_event(&self, element: &ElementRef, event: DomEvent) -> Result<()>;
    async fn highlight(&self, element: &ElementRef) -> Result<()>;
    async fn options(&self, element: &ElementRef) -> Result<Vec<SelectOptionEntry>>;
    async fn select_index(&self, element: &ElementRef, index: usize) -> Result<()>;
    async fn label(&self, element: &ElementRef) -> Result<ElementLabel>;
    async fn click(&self, element: &ElementRef) -> Result<()>;
    async fn insert_notification(&self, id: &str, message: &str) -> Result<()>;
    async fn remove_notification(&self, id: &str) -> Result<()>;
}

/// `PageDom` over a live page through `Runtime.evaluate`.
pub struct CdpDom {
    client: Arc<CDPClient>,
}

impl CdpDom {
    pub fn new(client: Arc<CDPClient>) -> Self {
        Self { client }
    }

    /// Run `body` with `el` bound to the referenced element. The snippet
    /// evaluates to `null` when the element is gone.
    async fn with_element(&self, element: &ElementRef, body: &str) -> Result<serde_json::Value> {
        let expression = format!(
            "(function() {{ const el = document.querySelector({}); if (!el) return null; {} }})()",
            json!(ref_selector(element)),
            body
        );
        self.client.evaluate(&expression).await
    }

    async fn expect_element(&self, element: &ElementRef, body: &str) -> Result<serde_json::Value> {
        let value = self.with_element(element, body).await?;
        if value.is_null() {
            return Err(PilotError::Cdp(format!("Element {} detached", element)));
        }
        Ok(value)
    }
}

fn ref_selector(element: &ElementRef) -> String {
    format!("[data-pp-ref=\"{}\"]", element.0)
}

/// Decode the array of ref ids returned by a tagging query. Anything other
/// than an array of strings means the page did not run our snippet.
fn decode_refs(value: serde_json::Value) -> Result<Vec<ElementRef>> {
    let ids: Vec<String> = serde_json::from_value(value)?;
    Ok(ids.into_iter().map(ElementRef).collect())
}

const TAG_ELEMENT_JS: &str = "function tag(el) { \
    if (!el.dataset.ppRef) { \
        window.__ppSeq = (window.__ppSeq || 0) + 1; \
        el.dataset.ppRef = String(window.__ppSeq); \
    } \
    return el.dataset.ppRef; }";

#[async_trait]
impl PageDom for CdpDom {
    async fn query_selector(&self, selector: &str) -> Result<Option<ElementRef>> {
        let expression = format!(
            "(function() {{ {} const el = document.querySelector({}); \
             return el ? tag(el) : null; }})()",
            TAG_ELEMENT_JS,
            json!(selector)
        );
        let value = self.client.evaluate(&expression).await?;
        Ok(value.as_str().map(|id| ElementRef(id.to_string())))
    }

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementRef>> {
        let expression = format!(
            "(function() {{ {} return Array.from(document.querySelectorAll({})).map(tag); }})()",
            TAG_ELEMENT_JS,
            json!(selector)
        );
        decode_refs(self.client.evaluate(&expression).await?)
    }

    async fn set_value(&self, element: &ElementRef, value: &str) -> Result<()> {
        let body = format!("el.value = {}; return true;", json!(value));
        self.expect_element(element, &body).await.map(|_| ())
    }

    async fn dispatch_event(&self, element: &ElementRef, event: DomEvent) -> Result<()> {
        let body = format!(
            "el.dispatchEvent(new Event({}, {{ bubbles: true }})); return true;",
            json!(event.as_str())
        );
        self.expect_element(element, &body).await.map(|_| ())
    }

    async fn highlight(&self, element: &ElementRef) -> Result<()> {
        let body = format!("el.style.backgroundColor = {}; return true;", json!(HIGHLIGHT_COLOR));
        self.expect_element(element, &body).await.map(|_| ())
    }

    async fn options(&self, element: &ElementRef) -> Result<Vec<SelectOptionEntry>> {
        let value = self
            .expect_element(
                element,
                "return Array.from(el.options || []) \
                 .map((o, i) => ({ index: i, text: o.text, value: o.value }));",
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn select_index(&self, element: &ElementRef, index: usize) -> Result<()> {
        let body = format!("el.selectedIndex = {}; return true;", index);
        self.expect_element(element, &body).await.map(|_| ())
    }

    async fn label(&self, element: &ElementRef) -> Result<ElementLabel> {
        let value = self
            .expect_element(
                element,
                "return { value: typeof el.value === 'string' ? el.value : '', \
                 text: el.textContent || '' };",
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        self.expect_element(element, "el.click(); return true;")
            .await
            .map(|_| ())
    }

    async fn insert_notification(&self, id: &str, message: &str) -> Result<()> {
        let expression = format!(
            "(function() {{ const n = document.createElement('div'); n.id = {}; \
             n.className = 'portalpilot-notification'; n.style.cssText = {}; \
             n.textContent = {}; \
             (document.body || document.documentElement).appendChild(n); return true; }})()",
            json!(id),
            json!(NOTIFICATION_STYLE),
            json!(message)
        );
        self.client.evaluate(&expression).await.map(|_| ())
    }

    async fn remove_notification(&self, id: &str) -> Result<()> {
        let expression = format!(
            "(function() {{ const n = document.getElementById({}); \
             if (n) n.remove(); return true; }})()",
            json!(id)
        );
        self.client.evaluate(&expression).await.map(|_| ())
    }
}
