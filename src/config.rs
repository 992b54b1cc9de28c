// src/config.rs - Panel configuration

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::link::{LinkParams, LinkPolicy};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub panel: PanelSettings,
    #[serde(default)]
    pub link: LinkSettings,
    #[serde(default)]
    pub tools: ToolSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSettings {
    /// Origin of the backend REST API, e.g. `http://127.0.0.1:3000`
    pub api_base: String,
    pub request_timeout_secs: u64,
    pub refresh_interval_ms: u64,
    pub stale_after_ms: u64,
    pub notice_ttl_ms: u64,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:3000".to_string(),
            request_timeout_secs: 10,
            refresh_interval_ms: 2000,
            stale_after_ms: 5000,
            notice_ttl_ms: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Host clients connect to; may contain `{port}`
    pub host: String,
    pub public_port: u16,
    /// `None` detects forwarding from the host name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_public_port: Option<bool>,
    pub label_prefix: String,
    pub encryption: String,
    pub security: String,
    pub transport: String,
}

impl Default for LinkSettings {
    fn default() -> Self {
        let params = LinkParams::default();
        Self {
            host: "127.0.0.1".to_string(),
            public_port: 443,
            force_public_port: None,
            label_prefix: params.label_prefix,
            encryption: params.encryption,
            security: params.security,
            transport: params.transport,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub qr_command: Vec<String>,
    pub clipboard_command: Vec<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            qr_command: vec!["qrencode".to_string(), "-t".to_string(), "ansiutf8".to_string()],
            clipboard_command: vec![
                "xclip".to_string(),
                "-selection".to_string(),
                "clipboard".to_string(),
            ],
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "xcore-panel")]
#[command(about = "X-CORE inbound control panel")]
pub struct PanelArgs {
    #[arg(short, long, default_value = "panel.toml")]
    pub config: PathBuf,
    #[arg(short, long)]
    pub api_base: Option<String>,
    #[arg(short = 'H', long)]
    pub host: Option<String>,
    /// Always connect links through the public port
    #[arg(long)]
    pub force_public_port: bool,
    /// Never connect links through the public port
    #[arg(long, conflicts_with = "force_public_port")]
    pub direct_port: bool,
    #[arg(long)]
    pub refresh_interval_ms: Option<u64>,
    #[arg(long)]
    pub generate_config: bool,
    #[arg(short, long)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Live dashboard, refreshed until interrupted
    Watch,
    /// One refresh, then print the dashboard
    Status,
    /// List inbounds with their connection links
    Nodes,
    /// Print the traffic capture feed
    Logs,
    /// Create an inbound
    Deploy {
        #[arg(short, long)]
        port: String,
        #[arg(long)]
        path: String,
    },
    /// Remove an inbound
    Terminate { port: u16 },
    /// Print the connection link of an inbound
    Link {
        port: u16,
        #[arg(long)]
        copy: bool,
    },
    /// Show the connection link of an inbound as a QR code
    Qr { port: u16 },
}

impl PanelConfig {
    pub fn load(args: &PanelArgs) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let mut config = if args.config.exists() {
            let content = fs::read_to_string(&args.config)?;
            toml::from_str(&content)?
        } else {
            tracing::info!("Config file {:?} not found, using defaults", args.config);
            Self::default()
        };

        if let Some(base) = &args.api_base {
            config.panel.api_base = base.clone();
        }
        if let Some(host) = &args.host {
            config.link.host = host.clone();
        }
        if args.force_public_port {
            config.link.force_public_port = Some(true);
        }
        if args.direct_port {
            config.link.force_public_port = Some(false);
        }
        if let Some(interval) = args.refresh_interval_ms {
            config.panel.refresh_interval_ms = interval;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let base = url::Url::parse(&self.panel.api_base)
            .map_err(|e| format!("Invalid api_base {:?}: {}", self.panel.api_base, e))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(format!("api_base must be http or https, got {:?}", base.scheme()).into());
        }
        if self.panel.refresh_interval_ms == 0 {
            return Err("refresh_interval_ms must be greater than zero".into());
        }
        if self.link.host.is_empty() {
            return Err("link host must not be empty".into());
        }
        Ok(())
    }

    pub fn generate_default_file(path: &PathBuf) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let config = Self::default();
        let content = toml::to_string_pretty(&config)?;
        fs::write(path, content)?;
        tracing::info!("Generated default panel config: {:?}", path);
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.panel.request_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.panel.refresh_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.panel.stale_after_ms)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.panel.notice_ttl_ms)
    }

    pub fn link_params(&self) -> LinkParams {
        LinkParams {
            encryption: self.link.encryption.clone(),
            security: self.link.security.clone(),
            transport: self.link.transport.clone(),
            label_prefix: self.link.label_prefix.clone(),
        }
    }

    /// Decide once how connection links are addressed.
    pub fn link_policy(&self) -> LinkPolicy {
        let host = self.link.host.clone();
        let params = self.link_params();
        match self.link.force_public_port {
            Some(true) => LinkPolicy::forwarded(host, self.link.public_port, params),
            Some(false) => LinkPolicy::direct(host, params),
            None => LinkPolicy::detect(host, self.link.public_port, params),
        }
    }
}
