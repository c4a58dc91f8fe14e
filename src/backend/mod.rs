//! Status backend: accepts automation requests, runs the form job and
//! serves its progress for polling.

pub mod job;
pub mod routes;
pub mod status;

pub use job::{fill_application, BrowserFormJob, JobRunner};
pub use routes::{app, router, run_server, BackendContext, BackendState};
pub use status::StatusBoard;
