use crate::agent::dom::{DomEvent, ElementRef, PageDom};
use crate::engine::selectors::SelectorChain;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    CaseSensitive,
    CaseInsensitive,
}

impl MatchMode {
    fn contains(&self, haystack: &str, needle: &str) -> bool {
        match self {
            MatchMode::CaseSensitive => haystack.contains(needle),
            MatchMode::CaseInsensitive => haystack.to_lowercase().contains(&needle.to_lowercase()),
        }
    }
}

/// Sets control values so page scripts observe them as user input.
///
/// A missing element is `Ok(false)` and a warning; `Err` means the DOM
/// transport itself failed.
pub struct FieldFiller<'a> {
    dom: &'a dyn PageDom,
}

impl<'a> FieldFiller<'a> {
    pub fn new(dom: &'a dyn PageDom) -> Self {
        Self { dom }
    }

    pub async fn fill(&self, chain: &SelectorChain, value: &str) -> Result<bool> {
        match chain.first_match(self.dom).await? {
            Some(element) => {
                self.fill_element(&element, value).await?;
                tracing::info!("Filled {}", chain.name);
                Ok(true)
            }
            None => {
                tracing::warn!("No element for {} (tried {:?})", chain.name, chain.selectors);
                Ok(false)
            }
        }
    }

    /// Fill the `index`-th element matching `selector`.
    pub async fn fill_nth(&self, selector: &str, index: usize, value: &str) -> Result<bool> {
        let elements = self.dom.query_selector_all(selector).await?;
        match elements.get(index) {
            Some(element) => {
                self.fill_element(element, value).await?;
                tracing::info!("Filled {}[{}]", selector, index);
                Ok(true)
            }
            None => {
                tracing::warn!(
                    "Only {} matches for {}, wanted index {}",
                    elements.len(),
                    selector,
                    index
                );
                Ok(false)
            }
        }
    }

    pub async fn fill_element(&self, element: &ElementRef, value: &str) -> Result<()> {
        self.dom.set_value(element, value).await?;
        self.dom.dispatch_event(element, DomEvent::Input).await?;
        self.dom.dispatch_event(element, DomEvent::Change).await?;
        self.dom.highlight(element).await
    }

    /// Select the first option whose text or value contains `needle`.
    pub async fn select_option(
        &self,
        chain: &SelectorChain,
        needle: &str,
        mode: MatchMode,
    ) -> Result<bool> {
        let Some(element) = chain.first_match(self.dom).await? else {
            tracing::warn!("No element for {} (tried {:?})", chain.name, chain.selectors);
            return Ok(false);
        };

        let options = self.dom.options(&element).await?;
        let Some(option) = options
            .iter()
            .find(|o| mode.contains(&o.text, needle) || mode.contains(&o.value, needle))
        else {
            tracing::warn!(
                "{}: no option contains {:?} among {} options",
                chain.name,
                needle,
                options.len()
            );
            return Ok(false);
        };

        self.dom.select_index(&element, option.index).await?;
        self.dom.dispatch_event(&element, DomEvent::Change).await?;
        self.dom.highlight(&element).await?;
        tracing::info!("Selected {} option {:?}", chain.name, option.text);
        Ok(true)
    }
}
