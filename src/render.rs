// src/render.rs - Plain-text dashboard views

use chrono::Local;

use crate::link::{build_connection_uri, LinkPolicy};
use crate::notify::{Notice, NoticeKind};
use crate::snapshot::ClientState;
use crate::types::{DashboardData, LogEntry, SampleStat};

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const RECENT_ACTIVITY: usize = 3;

pub fn status_label(stale: bool) -> &'static str {
    if stale { "SYSTEM DISCONNECTED" } else { "API SYNCHRONIZED" }
}

/// Full dashboard: status, stat cards, inbounds, usage chart and recent activity.
pub fn render_dashboard(state: &ClientState, stale: bool, notice: Option<&Notice>) -> String {
    let data = &state.data;
    let mut lines = Vec::new();

    let synced = state
        .last_synced_at
        .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    lines.push(format!("X-CORE  [{}]  last sync {}", status_label(stale), synced));
    lines.push(render_stat_cards(data));

    if let Some(notice) = notice {
        let marker = match notice.kind {
            NoticeKind::Success => "OK",
            NoticeKind::Error => "!!",
        };
        lines.push(format!("[{}] {}", marker, notice.message));
    }

    lines.push(String::new());
    lines.push("ACTIVE INBOUNDS".to_string());
    if data.inbounds.is_empty() {
        lines.push("  No active configurations".to_string());
    }
    for ib in &data.inbounds {
        let latest = ib.latest_stat();
        lines.push(format!(
            "  :{:<5} {:<20} up {:>8.1} kB/s  down {:>8.1} kB/s  total {:.2} MB",
            ib.port,
            ib.path,
            latest.up,
            latest.down,
            ib.total_consumed_mb()
        ));
    }

    lines.push(String::new());
    match data.inbounds.first() {
        Some(ib) => {
            lines.push(format!("USAGE ANALYTICS (60s)  :{}", ib.port));
            lines.push(format!("  {}", sparkline(ib.window())));
        }
        None => {
            lines.push("USAGE ANALYTICS (60s)".to_string());
            lines.push("  Awaiting data stream...".to_string());
        }
    }

    lines.push(String::new());
    lines.push("RECENT ACTIVITY".to_string());
    if data.logs.is_empty() {
        lines.push("  No intercepted traffic".to_string());
    }
    for log in data.logs.iter().take(RECENT_ACTIVITY) {
        lines.push(format!("  {}", log_row(log)));
    }

    lines.join("\n")
}

pub fn render_stat_cards(data: &DashboardData) -> String {
    format!(
        "CPU {:.1}%  RAM {:.1}%  CONNECTIONS {}  DATA USAGE {}  UPTIME {}",
        data.sys.cpu, data.sys.ram, data.sys.connections, data.sys.total_traffic, data.sys.uptime
    )
}

/// One line per inbound with its connection link.
pub fn render_nodes(data: &DashboardData, links: &LinkPolicy) -> String {
    if data.inbounds.is_empty() {
        return "No active configurations".to_string();
    }

    data.inbounds
        .iter()
        .map(|ib| format!(":{:<5} {:<20} {}", ib.port, ib.path, build_connection_uri(ib, links)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The capture feed, newest first as sent by the backend.
pub fn render_logs(logs: &[LogEntry]) -> String {
    let mut lines = vec![format!("{:<10} {:<6} {:<40} {:>10}", "TIME", "METHOD", "TARGET DOMAIN", "PAYLOAD")];
    lines.extend(logs.iter().map(log_row));
    lines.join("\n")
}

fn log_row(log: &LogEntry) -> String {
    format!("{:<10} {:<6} {:<40} {:>10}", log.time, log.method, log.domain, log.size)
}

/// Download rate of each sample scaled to the window's peak.
pub fn sparkline(samples: &[SampleStat]) -> String {
    let peak = samples.iter().map(|s| s.down).fold(0.0_f64, f64::max);
    samples
        .iter()
        .map(|s| {
            if peak <= 0.0 || s.down <= 0.0 {
                return SPARK_LEVELS[0];
            }
            let level = ((s.down / peak) * (SPARK_LEVELS.len() - 1) as f64).round() as usize;
            SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
        })
        .collect()
}
