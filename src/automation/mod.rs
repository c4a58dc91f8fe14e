//! Name-change automation: start the backend job and turn its status
//! snapshots into panel state.

pub mod client;
pub mod launcher;
pub mod panel;
pub mod poller;
pub mod schema;

pub use client::{AutomationBackend, BackendClient};
pub use launcher::AutomationLauncher;
pub use panel::{AutomationPanel, PanelCallbacks};
pub use poller::{PollExit, ProgressSink, StatusPoller};
pub use schema::*;
