use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use xcore_panel::render::{render_dashboard, render_logs, render_nodes};
use xcore_panel::{
    initialize_tracing, wait_for_shutdown_signal, Command, CommandPresenter, DeployForm, DeployOutcome, HttpPanelApi, InboundConfig,
    PanelArgs, PanelClient, PanelConfig, RefreshOutcome, TerminateOutcome,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const RENDER_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = PanelArgs::parse();
    initialize_tracing(args.verbose);
    let _log_span = tracing::info_span!("xcore-panel", version = env!("CARGO_PKG_VERSION")).entered();

    if args.generate_config {
        PanelConfig::generate_default_file(&args.config)?;
        return Ok(());
    }

    let config = PanelConfig::load(&args)?;
    info!(event = "config.loaded", path = ?args.config, "Config loaded from path.");
    info!(event = "panel.api.configured", url = %config.panel.api_base, "Backend API configured.");

    let links = config.link_policy();
    info!(
        event = "panel.links.configured",
        host = %links.host(),
        connect_port = ?links.connect_port(),
        "Link policy decided."
    );

    let api = HttpPanelApi::new(&config.panel.api_base, config.request_timeout())?;
    let presenter = CommandPresenter::new(config.tools.qr_command.clone(), config.tools.clipboard_command.clone());
    let panel = Arc::new(
        PanelClient::new(Arc::new(api), Arc::new(presenter), links)
            .with_stale_after(config.stale_after())
            .with_notice_ttl(config.notice_ttl()),
    );

    match args.command.clone().unwrap_or(Command::Watch) {
        Command::Watch => watch(panel, config.refresh_interval()).await,
        Command::Status => {
            panel.refresh().await;
            let state = panel.snapshot();
            println!("{}", render_dashboard(&state, panel.is_stale(), None));
            Ok(())
        }
        Command::Nodes => {
            load(&panel, &config).await?;
            println!("{}", render_nodes(&panel.snapshot().data, panel.links()));
            Ok(())
        }
        Command::Logs => {
            load(&panel, &config).await?;
            println!("{}", render_logs(&panel.snapshot().data.logs));
            Ok(())
        }
        Command::Deploy { port, path } => {
            let mut form = DeployForm::new(port, path);
            match panel.deploy(&mut form).await {
                DeployOutcome::Deployed => {
                    println!("{}", xcore_panel::notify::NODE_DEPLOYED);
                    Ok(())
                }
                DeployOutcome::Incomplete => Err("both --port and --path are required".into()),
                DeployOutcome::Failed { message } => Err(message.into()),
            }
        }
        Command::Terminate { port } => match panel.terminate(port).await {
            TerminateOutcome::Terminated => {
                println!("{}", xcore_panel::notify::TERMINATED);
                Ok(())
            }
            TerminateOutcome::Failed => Err(format!("failed to terminate inbound {}", port).into()),
        },
        Command::Link { port, copy } => {
            let inbound = inbound_for(&panel, &config, port).await?;
            let uri = panel.connection_uri(&inbound);
            println!("{}", uri);
            if copy && !panel.copy_text(&uri).await {
                return Err("failed to copy link to clipboard".into());
            }
            Ok(())
        }
        Command::Qr { port } => {
            let inbound = inbound_for(&panel, &config, port).await?;
            if panel.present_qr(&inbound).await {
                Ok(())
            } else {
                Err(format!("failed to render QR code with {:?}", config.tools.qr_command).into())
            }
        }
    }
}

/// Refresh once for one-shot commands that need live data.
async fn load(panel: &PanelClient, config: &PanelConfig) -> Result<(), BoxError> {
    match panel.refresh().await {
        RefreshOutcome::Failed => Err(format!("backend unreachable at {}", config.panel.api_base).into()),
        _ => Ok(()),
    }
}

async fn inbound_for(panel: &PanelClient, config: &PanelConfig, port: u16) -> Result<InboundConfig, BoxError> {
    load(panel, config).await?;
    panel
        .find_inbound(port)
        .ok_or_else(|| format!("no inbound listening on port {}", port).into())
}

async fn watch(panel: Arc<PanelClient>, refresh_interval: Duration) -> Result<(), BoxError> {
    let shutdown_token = CancellationToken::new();
    let shutdown_token_signal = shutdown_token.clone();

    tokio::spawn(async move {
        if wait_for_shutdown_signal().await.is_some() {
            shutdown_token_signal.cancel();
        }
    });

    info!(event = "panel.watch.start", version = env!("CARGO_PKG_VERSION"), "Dashboard started.");
    let poller = panel.spawn_poller(refresh_interval);
    let mut render_ticker = tokio::time::interval(RENDER_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                info!(event = "shutdown.start", "Graceful shutdown started.");
                break;
            }
            _ = render_ticker.tick() => {
                let state = panel.snapshot();
                let notice = panel.notice();
                // Clear the terminal and home the cursor before each frame.
                print!("\x1b[2J\x1b[H");
                println!("{}", render_dashboard(&state, panel.is_stale(), notice.as_ref()));
            }
        }
    }

    poller.stop().await;
    Ok(())
}
