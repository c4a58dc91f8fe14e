//! Automation status backend: serves start/status endpoints and runs the
//! browser form job.

use clap::Parser;
use portalpilot_lib::backend::{run_server, BackendContext, BrowserFormJob};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "portalpilot-backend", version, about = "Name-change automation backend")]
struct Args {
    /// Address to listen on (defaults to backend.bind)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    portalpilot_lib::init_logging();
    let args = Args::parse();

    let config = portalpilot_lib::load_effective_config()?;
    let bind = args.bind.unwrap_or_else(|| config.backend.bind.clone());

    let job = BrowserFormJob::new(config.browser.clone(), config.form.clone());
    let state = Arc::new(BackendContext::new(Arc::new(job), config.form.name_change_url.clone()));

    run_server(state, &bind, config.backend.api_token.clone()).await?;
    Ok(())
}
