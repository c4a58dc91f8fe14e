//! portalpilot: portal page engine and name-change automation client.

use anyhow::Context;
use clap::{Parser, Subcommand};
use portalpilot_lib::agent::{CDPClient, CdpDom, MemoryDom, PageDom};
use portalpilot_lib::automation::{
    AutomationPanel, AutomationResult, AutomationUiState, BackendClient, PanelCallbacks,
    PanelSnapshot, UserData, REMEDIATION_STEPS,
};
use portalpilot_lib::config::{self, PilotConfig};
use portalpilot_lib::engine::{
    is_portal_host, ActionDispatcher, NotificationSurface, PageContext, PageWatcher,
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "portalpilot",
    version,
    about = "DGVCL portal auto-fill and name-change automation"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the page engine against Chrome until interrupted
    Watch {
        /// Remote debugging port (defaults to browser.cdp_port)
        #[arg(long)]
        port: Option<u16>,
        /// Launch Chrome instead of attaching to a running one
        #[arg(long)]
        launch: bool,
        /// Navigate here first; without a value, the portal start page
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        open: Option<String>,
    },
    /// Start a name-change automation and follow its progress
    Run {
        /// Applicant data as a JSON object, or @path to a JSON file
        #[arg(long)]
        user_data: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        service_number: Option<String>,
        #[arg(long)]
        t_number: Option<String>,
        #[arg(long)]
        mobile: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        confirm_email: Option<String>,
    },
    /// Dispatch once against an in-memory copy of the portal page for URL
    Simulate { url: String },
    /// Show the config file location and effective settings
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    portalpilot_lib::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Config => {
            println!("# {}", config::get_config_path().display());
            let config = portalpilot_lib::load_effective_config()?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Watch { port, launch, open } => {
            let config = portalpilot_lib::load_effective_config()?;
            watch(&config, port, launch, open).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Simulate { url } => {
            let config = portalpilot_lib::load_effective_config()?;
            simulate(&config, &url).await
        }
        Command::Run {
            user_data,
            city,
            service_number,
            t_number,
            mobile,
            email,
            confirm_email,
        } => {
            let config = portalpilot_lib::load_effective_config()?;
            let mut data = match user_data {
                Some(raw) => parse_user_data(&raw)?,
                None => UserData::new(),
            };
            // Flags use the keys that win the fallback lookup.
            for (key, value) in [
                ("city", city),
                ("serviceNumber", service_number),
                ("tNumber", t_number),
                ("mobile", mobile),
                ("email", email),
                ("confirmEmail", confirm_email),
            ] {
                if let Some(value) = value {
                    data = data.set(key, value);
                }
            }
            run(&config, data).await
        }
    }
}

fn parse_user_data(raw: &str) -> anyhow::Result<UserData> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?,
        None => raw.to_string(),
    };
    let value: serde_json::Value =
        serde_json::from_str(&text).context("user data is not valid JSON")?;
    Ok(UserData::try_from(value)?)
}

// ---------------------------------------------------------------------------
// watch
// ---------------------------------------------------------------------------

async fn watch(
    config: &PilotConfig,
    port: Option<u16>,
    launch: bool,
    open: Option<String>,
) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.browser.cdp_port);
    let client = if launch {
        CDPClient::launch(
            &config.browser.chrome_path,
            port,
            config.browser.headless,
            config.browser.user_data_dir.as_deref(),
        )
        .await?
    } else {
        CDPClient::attach(port).await?
    };
    let client = Arc::new(client);

    if let Some(url) = open {
        let url = if url.is_empty() { config.portal.start_url.clone() } else { url };
        client.navigate(&url).await?;
    }

    let dom: Arc<dyn PageDom> = Arc::new(CdpDom::new(client.clone()));
    let surface = Arc::new(NotificationSurface::new(
        dom.clone(),
        config.timing.notification_dismiss(),
    ));
    let dispatcher = Arc::new(ActionDispatcher::new(dom, surface, config.timing.clone()));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let watcher = PageWatcher::new(client.clone(), dispatcher, config.portal.hostname.clone())
        .with_outcomes(tx);

    let printer = tokio::spawn(async move {
        while let Some((page, outcome)) = rx.recv().await {
            println!("{} {}: {:?}", page.page_kind, page.url, outcome);
        }
    });

    let shutdown = CancellationToken::new();
    let ctrl_c = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        })
    };

    tracing::info!("Watching pages on {} (Ctrl-C to stop)", config.portal.hostname);
    watcher.run(shutdown).await?;
    ctrl_c.abort();
    drop(watcher);
    let _ = printer.await;
    Ok(())
}

// ---------------------------------------------------------------------------
// simulate
// ---------------------------------------------------------------------------

async fn simulate(config: &PilotConfig, url: &str) -> anyhow::Result<ExitCode> {
    if !is_portal_host(url, &config.portal.hostname) {
        println!("ignored: {} is not on {}", url, config.portal.hostname);
        return Ok(ExitCode::SUCCESS);
    }

    let page = PageContext::from_url(url);
    let dom = Arc::new(MemoryDom::portal_page(page.page_kind));
    let surface = Arc::new(NotificationSurface::new(
        dom.clone(),
        config.timing.notification_dismiss(),
    ));
    let dispatcher = ActionDispatcher::new(dom.clone(), surface, config.timing.clone());

    let outcome = dispatcher.dispatch(&page).await;
    println!("page: {}", page.page_kind);
    println!("outcome: {}", serde_json::to_string(&outcome)?);
    for (i, el) in dom.elements().iter().enumerate() {
        let selected = el.selected_option().map(|(text, _)| text.as_str()).unwrap_or("");
        println!(
            "  [{}] <{}> value={:?} selected={:?} clicks={} highlighted={}",
            i,
            el.tag,
            el.value,
            selected,
            el.clicks,
            el.background.is_some()
        );
    }
    for (id, message) in dom.notifications() {
        println!("  notification {}: {}", id, message);
    }
    Ok(ExitCode::SUCCESS)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn run(config: &PilotConfig, data: UserData) -> anyhow::Result<ExitCode> {
    let backend = Arc::new(BackendClient::new(&config.backend)?);
    tracing::info!("Using automation backend at {}", backend.base_url());

    let callbacks = PanelCallbacks::new()
        .on_complete(|result| {
            tracing::info!("Automation finished, success={}", result.is_success())
        })
        .on_close(|| tracing::info!("Automation panel closed"));
    let panel = AutomationPanel::new(data, backend, config.timing.clone(), callbacks);
    let mut snapshots = panel.subscribe();
    panel.start()?;

    let mut renderer = Renderer::default();
    renderer.draw(&snapshots.borrow_and_update().clone());

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                renderer.draw(&snapshot);
                if snapshot.state.is_terminal() {
                    return Ok(match snapshot.result {
                        Some(AutomationResult::Completed(_)) => ExitCode::SUCCESS,
                        _ => ExitCode::FAILURE,
                    });
                }
            }
            _ = tokio::signal::ctrl_c() => {
                panel.close();
                println!("Cancelled.");
                return Ok(ExitCode::from(130));
            }
        }
    }
    Ok(ExitCode::FAILURE)
}

#[derive(Default)]
struct Renderer {
    status_line: String,
    logs_printed: usize,
}

impl Renderer {
    fn draw(&mut self, snapshot: &PanelSnapshot) {
        if snapshot.state == AutomationUiState::Running {
            // Logs are replaced wholesale; start over if the backend's log shrank.
            if snapshot.logs.len() < self.logs_printed {
                self.logs_printed = 0;
            }
            for line in &snapshot.logs[self.logs_printed..] {
                println!("  > {}", line);
            }
            self.logs_printed = snapshot.logs.len();

            let status_line = format!(
                "[{:>3}%] {}/{} fields  {}",
                snapshot.progress,
                snapshot.fields_completed,
                snapshot.total_fields,
                snapshot.message
            );
            if status_line != self.status_line {
                println!("{}", status_line);
                self.status_line = status_line;
            }
        }

        match &snapshot.result {
            Some(AutomationResult::Completed(summary)) => {
                println!("{}", summary.message);
                println!("{}", summary.details);
                for field in &summary.fields_completed {
                    println!("  {:<15} {:<10} {}", field.field, field.status, field.value);
                }
                if summary.not_submitted {
                    println!(
                        "The application was filled but NOT submitted. \
                         Review and submit it in the browser."
                    );
                }
            }
            Some(AutomationResult::Failed(failure)) => {
                println!("{}", snapshot.message);
                if snapshot.show_remediation() {
                    println!("Troubleshooting:");
                    for step in REMEDIATION_STEPS {
                        println!("  - {}", step);
                    }
                }
                tracing::debug!("Failure result: {:?}", failure);
            }
            None => {}
        }
    }
}
