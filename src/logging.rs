use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Clone, Copy, Debug, PartialEq)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

/// File sink options parsed from `TRACING_LOG`, e.g.
/// `file=/var/log/xcore-panel.log,rotation=daily,format=json,level=debug`.
#[derive(Debug, Default, PartialEq)]
struct FileSink {
    level: Option<String>,
    file: String,
    append: bool,
    rotation: String,
    format: Option<LogFormat>,
}

/// Install the global subscriber. Console output goes to stderr so stdout stays
/// free for dashboards and links.
pub fn initialize_tracing(verbose: bool) {
    let filter = env_filter(verbose);
    let format = env_log_format();

    let sink = std::env::var("TRACING_LOG")
        .map(|config| parse_sink(&config))
        .unwrap_or_default();

    if !sink.file.is_empty() {
        let file_filter = sink
            .level
            .as_deref()
            .map(EnvFilter::new)
            .unwrap_or(filter);
        let format = sink.format.unwrap_or(format);

        let path = std::path::Path::new(&sink.file);
        let directory = path
            .parent()
            .and_then(|p| p.to_str())
            .filter(|p| !p.is_empty())
            .unwrap_or(".");
        let filename = path.file_name().and_then(|s| s.to_str()).unwrap_or("xcore-panel.log");

        if !sink.append && sink.rotation == "never" {
            let _ = std::fs::remove_file(path);
        }

        let file_appender = match sink.rotation.as_str() {
            "hourly" => tracing_appender::rolling::hourly(directory, filename),
            "daily" => tracing_appender::rolling::daily(directory, filename),
            "minutely" => tracing_appender::rolling::minutely(directory, filename),
            _ => tracing_appender::rolling::never(directory, filename),
        };

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(file_filter)
            .with(build_fmt_layer(format, non_blocking, false))
            .init();

        // The writer must outlive every log call; the process exit flushes it.
        std::mem::forget(guard);
        return;
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(build_fmt_layer(format, std::io::stderr, format != LogFormat::Json))
        .init();
}

fn parse_sink(config: &str) -> FileSink {
    let mut sink = FileSink {
        rotation: String::from("never"),
        ..FileSink::default()
    };

    for part in config.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "level" => sink.level = Some(value.to_string()),
            "file" => sink.file = value.to_string(),
            "append" => sink.append = parse_bool(value),
            "rotation" => sink.rotation = value.to_string(),
            "format" => sink.format = Some(parse_format(value)),
            _ => {}
        }
    }

    sink
}

fn env_filter(verbose: bool) -> EnvFilter {
    if let Ok(filter) = std::env::var("RUST_LOG") {
        EnvFilter::new(filter)
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    }
}

fn env_log_format() -> LogFormat {
    std::env::var("XCORE_LOG_FORMAT")
        .ok()
        .map(|v| parse_format(&v))
        .unwrap_or(LogFormat::Compact)
}

fn build_fmt_layer<S, W>(
    format: LogFormat,
    writer: W,
    ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let base = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_ansi(ansi);

    match format {
        LogFormat::Json => Box::new(base.json()),
        LogFormat::Compact => Box::new(base.compact()),
        LogFormat::Pretty => Box::new(base.pretty().with_file(true).with_line_number(true)),
    }
}

fn parse_format(value: &str) -> LogFormat {
    match value.trim().to_ascii_lowercase().as_str() {
        "json" => LogFormat::Json,
        "pretty" => LogFormat::Pretty,
        _ => LogFormat::Compact,
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
