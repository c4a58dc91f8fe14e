//! Ordered selector chains and the two lookup policies built on them.
//!
//! `first_match` commits to the first chain entry that finds an element.
//! `click_all_labelled` is a separate policy: it acts on every match.

use crate::agent::dom::{ElementRef, PageDom};
use crate::error::Result;

/// CSS selectors tried in order, most specific first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorChain {
    pub name: &'static str,
    pub selectors: &'static [&'static str],
}

impl SelectorChain {
    pub const fn new(name: &'static str, selectors: &'static [&'static str]) -> Self {
        Self { name, selectors }
    }

    /// First element found by any selector, in chain order.
    pub async fn first_match(&self, dom: &dyn PageDom) -> Result<Option<ElementRef>> {
        for selector in self.selectors {
            if let Some(element) = dom.query_selector(selector).await? {
                tracing::debug!("{}: matched {} via {}", self.name, element, selector);
                return Ok(Some(element));
            }
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Portal login workflow
// ---------------------------------------------------------------------------

pub const MOBILE_INPUT: SelectorChain = SelectorChain::new(
    "mobile",
    &[
        "input[placeholder=\"Mobile No\"]",
        "input[placeholder*=\"Mobile\"]",
    ],
);

pub const DISCOM_SELECT: SelectorChain = SelectorChain::new("discom", &["select"]);

pub const SUBMIT_PRIMARY: SelectorChain = SelectorChain::new(
    "submit",
    &[
        "input[type=\"submit\"]",
        "button[type=\"submit\"]",
        "input[value=\"Submit\"]",
    ],
);

pub const SUBMIT_FALLBACK_SCOPE: &str = "input, button";
pub const SUBMIT_LABEL: &str = "Submit";

/// Click every element under `scope` whose value or text is exactly `label`.
/// Returns how many were clicked.
pub async fn click_all_labelled(dom: &dyn PageDom, scope: &str, label: &str) -> Result<usize> {
    let mut clicked = 0;
    for element in dom.query_selector_all(scope).await? {
        let shown = dom.label(&element).await?;
        if shown.value == label || shown.text == label {
            dom.click(&element).await?;
            clicked += 1;
        }
    }
    Ok(clicked)
}

// ---------------------------------------------------------------------------
// Name-change application form
// ---------------------------------------------------------------------------

/// Text inputs in document order, used for positional fallbacks.
pub const TEXT_INPUTS: &str = "input[type=\"text\"]";

pub const CITY_SELECT: SelectorChain = SelectorChain::new(
    "city",
    &["select[name*=\"city\"]", "select[id*=\"city\"]", "select"],
);

pub const SERVICE_NUMBER_INPUT: SelectorChain = SelectorChain::new(
    "service_number",
    &[
        "input[placeholder*=\"Service Number\"]",
        "input[placeholder*=\"Service\"]",
        "input[name*=\"service\"]",
        "input[id*=\"service\"]",
    ],
);

pub const T_NUMBER_INPUT: SelectorChain = SelectorChain::new(
    "t_number",
    &[
        "input[placeholder*=\"T No\"]",
        "input[placeholder*=\"T-No\"]",
        "input[placeholder*=\"TNo\"]",
        "input[name*=\"tno\"]",
        "input[id*=\"tno\"]",
    ],
);

pub const FORM_MOBILE_INPUT: SelectorChain = SelectorChain::new(
    "mobile",
    &[
        "input[type=\"tel\"]",
        "input[placeholder*=\"Mobile\"]",
        "input[placeholder*=\"mobile\"]",
        "input[name*=\"mobile\"]",
        "input[id*=\"mobile\"]",
    ],
);

pub const EMAIL_INPUT: SelectorChain = SelectorChain::new(
    "email",
    &[
        "input[type=\"email\"]",
        "input[placeholder*=\"Email\"]",
        "input[placeholder*=\"email\"]",
        "input[name*=\"email\"]",
        "input[id*=\"email\"]",
    ],
);
