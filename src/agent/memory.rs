//! In-memory `PageDom` used for dry runs (`portalpilot simulate`) and tests.
//!
//! Element state (live value, events, clicks, highlight) lives in a list
//! indexed by insertion order. Selectors are matched by rendering that list
//! to HTML, each node tagged with its index, and querying it with `scraper`.

use crate::agent::dom::{
    DomEvent, ElementLabel, ElementRef, PageDom, SelectOptionEntry, HIGHLIGHT_COLOR,
};
use crate::engine::classifier::PageKind;
use crate::error::{PilotError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use std::fmt::Write;

const INDEX_ATTR: &str = "data-pp-index";
const VOID_TAGS: &[&str] = &["input", "img", "br", "hr", "meta", "link"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryElement {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    /// Live `value` property; starts from the `value` attribute
    pub value: String,
    pub text: String,
    /// (text, value) pairs for `select` elements
    pub options: Vec<(String, String)>,
    pub selected_index: Option<usize>,
    pub background: Option<String>,
    pub events: Vec<&'static str>,
    pub clicks: usize,
    /// Index of the enclosing element; `None` for children of `body`
    pub parent: Option<usize>,
}

impl MemoryElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        if name == "value" {
            self.value = value.to_string();
        }
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn option(mut self, text: &str, value: &str) -> Self {
        self.options.push((text.to_string(), value.to_string()));
        if self.selected_index.is_none() {
            self.selected_index = Some(0);
        }
        self
    }

    pub fn selected_option(&self) -> Option<&(String, String)> {
        self.selected_index.and_then(|i| self.options.get(i))
    }
}

#[derive(Debug, Default)]
struct MemoryPage {
    elements: Vec<MemoryElement>,
    notifications: Vec<(String, String)>,
}

#[derive(Debug, Default)]
pub struct MemoryDom {
    page: Mutex<MemoryPage>,
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(self, element: MemoryElement) -> Self {
        self.page.lock().elements.push(element);
        self
    }

    /// Append `element` inside the element at `parent`.
    pub fn with_child(self, parent: usize, element: MemoryElement) -> Self {
        self.page.lock().elements.push(MemoryElement {
            parent: Some(parent),
            ..element
        });
        self
    }

    /// A stand-in for the portal page of the given kind.
    pub fn portal_page(kind: PageKind) -> Self {
        let dom = Self::new();
        match kind {
            PageKind::Login => dom
                .with_element(
                    MemoryElement::new("input")
                        .attr("type", "text")
                        .attr("placeholder", "Mobile No"),
                )
                .with_element(
                    MemoryElement::new("select")
                        .option("Select DISCOM", "")
                        .option("DGVCL - Dakshin Gujarat Vij Company Ltd.", "DGVCL")
                        .option("MGVCL - Madhya Gujarat Vij Company Ltd.", "MGVCL")
                        .option("PGVCL - Paschim Gujarat Vij Company Ltd.", "PGVCL")
                        .option("UGVCL - Uttar Gujarat Vij Company Ltd.", "UGVCL"),
                )
                .with_element(
                    MemoryElement::new("input")
                        .attr("type", "text")
                        .attr("placeholder", "Captcha"),
                )
                .with_element(MemoryElement::new("button").attr("type", "submit").text("Login")),
            PageKind::Otp => dom
                .with_element(
                    MemoryElement::new("input")
                        .attr("type", "text")
                        .attr("placeholder", "OTP"),
                )
                .with_element(
                    MemoryElement::new("input")
                        .attr("type", "submit")
                        .attr("value", "Submit Otp"),
                ),
            PageKind::SelectUser => dom
                .with_element(MemoryElement::new("select").option("Consumer 1", "1"))
                .with_element(
                    MemoryElement::new("input")
                        .attr("type", "submit")
                        .attr("value", "Submit"),
                ),
            PageKind::Dashboard | PageKind::Unknown => dom,
        }
    }

    pub fn element(&self, element: &ElementRef) -> Option<MemoryElement> {
        let index: usize = element.0.parse().ok()?;
        self.page.lock().elements.get(index).cloned()
    }

    pub fn elements(&self) -> Vec<MemoryElement> {
        self.page.lock().elements.clone()
    }

    /// Notifications currently present, oldest first, as (id, message).
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.page.lock().notifications.clone()
    }

    pub fn total_clicks(&self) -> usize {
        self.page.lock().elements.iter().map(|e| e.clicks).sum()
    }

    fn update<T>(
        &self,
        element: &ElementRef,
        f: impl FnOnce(&mut MemoryElement) -> T,
    ) -> Result<T> {
        let index: usize = element
            .0
            .parse()
            .map_err(|_| PilotError::Cdp(format!("Invalid element {}", element)))?;
        let mut page = self.page.lock();
        let el = page
            .elements
            .get_mut(index)
            .ok_or_else(|| PilotError::Cdp(format!("Element {} detached", element)))?;
        Ok(f(el))
    }

    /// Matches in document order. An unparsable selector is an error, as it
    /// is for `document.querySelector`.
    fn matching(&self, selector: &str) -> Result<Vec<ElementRef>> {
        let parsed = Selector::parse(selector)
            .map_err(|e| PilotError::Cdp(format!("Invalid selector {}: {:?}", selector, e)))?;
        let html = Html::parse_document(&self.page.lock().render());
        Ok(html
            .select(&parsed)
            .filter_map(|node| node.value().attr(INDEX_ATTR))
            .map(|index| ElementRef(index.to_string()))
            .collect())
    }
}

impl MemoryPage {
    fn render(&self) -> String {
        let mut out = String::from("<!DOCTYPE html><html><head></head><body>");
        self.render_children(None, &mut out);
        out.push_str("</body></html>");
        out
    }

    fn render_children(&self, parent: Option<usize>, out: &mut String) {
        for (index, el) in self.elements.iter().enumerate() {
            if el.parent == parent {
                self.render_element(index, el, out);
            }
        }
    }

    fn render_element(&self, index: usize, el: &MemoryElement, out: &mut String) {
        let _ = write!(out, "<{} {}=\"{}\"", el.tag, INDEX_ATTR, index);
        for (name, value) in &el.attrs {
            let _ = write!(out, " {}=\"{}\"", name, escape(value));
        }
        out.push('>');
        if VOID_TAGS.contains(&el.tag.as_str()) {
            return;
        }
        out.push_str(&escape(&el.text));
        for (text, value) in &el.options {
            let _ = write!(
                out,
                "<option value=\"{}\">{}</option>",
                escape(value),
                escape(text)
            );
        }
        self.render_children(Some(index), out);
        let _ = write!(out, "</{}>", el.tag);
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl PageDom for MemoryDom {
    async fn query_selector(&self, selector: &str) -> Result<Option<ElementRef>> {
        Ok(self.matching(selector)?.into_iter().next())
    }

    async fn query_selector_all(&self, selector: &str) -> Result<Vec<ElementRef>> {
        self.matching(selector)
    }

    async fn set_value(&self, element: &ElementRef, value: &str) -> Result<()> {
        self.update(element, |el| el.value = value.to_string())
    }

    async fn dispatch_event(&self, element: &ElementRef, event: DomEvent) -> Result<()> {
        self.update(element, |el| el.events.push(event.as_str()))
    }

    async fn highlight(&self, element: &ElementRef) -> Result<()> {
        self.update(element, |el| el.background = Some(HIGHLIGHT_COLOR.to_string()))
    }

    async fn options(&self, element: &ElementRef) -> Result<Vec<SelectOptionEntry>> {
        self.update(element, |el| {
            el.options
                .iter()
                .enumerate()
                .map(|(index, (text, value))| SelectOptionEntry {
                    index,
                    text: text.clone(),
                    value: value.clone(),
                })
                .collect()
        })
    }

    async fn select_index(&self, element: &ElementRef, index: usize) -> Result<()> {
        self.update(element, |el| {
            el.selected_index = Some(index);
            if let Some((_, value)) = el.options.get(index) {
                el.value = value.clone();
            }
        })
    }

    async fn label(&self, element: &ElementRef) -> Result<ElementLabel> {
        self.update(element, |el| ElementLabel {
            value: el.value.clone(),
            text: el.text.clone(),
        })
    }

    async fn click(&self, element: &ElementRef) -> Result<()> {
        self.update(element, |el| el.clicks += 1)
    }

    async fn insert_notification(&self, id: &str, message: &str) -> Result<()> {
        self.page
            .lock()
            .notifications
            .push((id.to_string(), message.to_string()));
        Ok(())
    }

    async fn remove_notification(&self, id: &str) -> Result<()> {
        self.page.lock().notifications.retain(|(nid, _)| nid != id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_quoted_comma_and_case_flag() {
        let dom = MemoryDom::new()
            .with_element(MemoryElement::new("input").attr("placeholder", "Mobile, 10 digits"));
        let hit = dom
            .query_selector("input[placeholder=\"Mobile, 10 digits\"]")
            .await
            .unwrap();
        assert_eq!(hit, Some(ElementRef("0".into())));

        let hit = dom.query_selector("input[placeholder*=\"mobile\" i]").await.unwrap();
        assert_eq!(hit, Some(ElementRef("0".into())));
    }

    #[tokio::test]
    async fn test_descendant_combinator_uses_parents() {
        let dom = MemoryDom::new()
            .with_element(MemoryElement::new("input").attr("placeholder", "Mobile search"))
            .with_element(MemoryElement::new("form").attr("id", "apply"))
            .with_child(1, MemoryElement::new("input").attr("placeholder", "Mobile No"));

        let hit = dom.query_selector("form input[placeholder*=\"Mobile\"]").await.unwrap();
        assert_eq!(hit, Some(ElementRef("2".into())));
        let all = dom.query_selector_all("input").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_selector_is_an_error() {
        let dom = MemoryDom::new().with_element(MemoryElement::new("input"));
        assert!(dom.query_selector("input[").await.is_err());
    }

    #[tokio::test]
    async fn test_markup_in_values_is_escaped() {
        let dom = MemoryDom::new().with_element(
            MemoryElement::new("button")
                .attr("title", "a\"><b>")
                .text("<Submit>"),
        );
        let hit = dom.query_selector("button[title=\"a\\\"><b>\"]").await.unwrap();
        assert_eq!(hit, Some(ElementRef("0".into())));
        assert!(dom.query_selector("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_selector_list_matches_in_document_order() {
        let dom = MemoryDom::new()
            .with_element(MemoryElement::new("button").text("Cancel"))
            .with_element(MemoryElement::new("input").attr("type", "submit"))
            .with_element(MemoryElement::new("div"));

        let all = dom.query_selector_all("input, button").await.unwrap();
        assert_eq!(all, vec![ElementRef("0".into()), ElementRef("1".into())]);

        let submit = dom.query_selector("input[type='submit']").await.unwrap();
        assert_eq!(submit, Some(ElementRef("1".into())));
    }

    #[tokio::test]
    async fn test_value_property_is_separate_from_attribute() {
        let dom =
            MemoryDom::new().with_element(MemoryElement::new("input").attr("value", "Submit"));
        let el = ElementRef("0".into());
        dom.set_value(&el, "changed").await.unwrap();

        assert!(dom.query_selector("input[value=\"Submit\"]").await.unwrap().is_some());
        assert_eq!(dom.label(&el).await.unwrap().value, "changed");
    }

    #[test]
    fn test_login_fixture_shape() {
        let dom = MemoryDom::portal_page(PageKind::Login);
        let elements = dom.elements();
        assert_eq!(elements[0].attrs.get("placeholder").unwrap(), "Mobile No");
        assert_eq!(elements[1].tag, "select");
        assert_eq!(elements[1].options.len(), 5);
    }
}
