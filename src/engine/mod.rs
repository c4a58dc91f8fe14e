//! Page-state driven automation of the portal login workflow.
//!
//! A navigation is classified from its URL, then the dispatcher applies the
//! fixed action for that page kind after its settle delay.

pub mod classifier;
pub mod dispatcher;
pub mod filler;
pub mod notification;
pub mod selectors;
pub mod watcher;

pub use classifier::{is_portal_host, LoginParameters, PageContext, PageKind};
pub use dispatcher::{ActionDispatcher, PageOutcome};
pub use filler::{FieldFiller, MatchMode};
pub use notification::{NotificationHandle, NotificationSurface};
pub use selectors::SelectorChain;
pub use watcher::{NavigationSource, PageWatcher};
