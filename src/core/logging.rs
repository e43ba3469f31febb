//! Terminal Logging Module
//!
//! - `log` macros at call sites, `tracing-subscriber` as the backend
//! - Human-readable stdout layer plus a daily rolling JSON file under the data dir
//! - miette hook tuned to the detected terminal
//! - Small styled printers for CLI summaries (console)

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::OnceLock;

use console::style;
use supports_color::Stream;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE: &str = "voicerag.log";

static TERMINAL_CAPS: OnceLock<TerminalCapabilities> = OnceLock::new();

fn get_terminal_caps() -> &'static TerminalCapabilities {
    TERMINAL_CAPS.get_or_init(TerminalCapabilities::detect)
}

// ============================================================================
// Terminal Capability Detection
// ============================================================================

/// Terminal color support levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorLevel {
    TrueColor,
    Ansi256,
    Ansi16,
    NoColor,
}

/// Detected terminal capabilities
#[derive(Debug, Clone)]
pub struct TerminalCapabilities {
    pub color_level: ColorLevel,
    pub supports_unicode: bool,
    pub is_interactive: bool,
}

impl TerminalCapabilities {
    pub fn detect() -> Self {
        use is_terminal::IsTerminal;

        let color_level = match supports_color::on(Stream::Stdout) {
            Some(support) if support.has_16m => ColorLevel::TrueColor,
            Some(support) if support.has_256 => ColorLevel::Ansi256,
            Some(support) if support.has_basic => ColorLevel::Ansi16,
            _ => ColorLevel::NoColor,
        };

        let supports_unicode = std::env::var("TERM")
            .map(|t| !t.contains("dumb"))
            .unwrap_or(true)
            && std::env::var("LANG")
                .map(|l| l.contains("UTF-8") || l.contains("utf8"))
                .unwrap_or(true);

        Self {
            color_level,
            supports_unicode,
            is_interactive: io::stdout().is_terminal(),
        }
    }

    pub fn should_colorize(&self) -> bool {
        self.is_interactive && self.color_level != ColorLevel::NoColor
    }
}

// ============================================================================
// Logging Initialization
// ============================================================================

/// Directory holding the rolling log files.
pub fn log_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("voicerag").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Initialize logging.
///
/// `RUST_LOG` wins over `verbose`. The returned guard must stay alive until
/// shutdown so the file writer flushes. When the log directory cannot be
/// created only the stdout layer is installed and `None` is returned.
pub fn init(verbose: bool) -> Option<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_filter(env_filter());

    let log_dir = log_dir();
    let file_writer = match fs::create_dir_all(&log_dir) {
        Ok(()) => Some(tracing_appender::non_blocking(
            tracing_appender::rolling::daily(&log_dir, LOG_FILE),
        )),
        Err(e) => {
            eprintln!("Failed to create logs directory {}: {}", log_dir.display(), e);
            None
        }
    };

    let (file_layer, guard) = match file_writer {
        Some((writer, guard)) => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .json()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // Also bridges `log` records into tracing.
    if let Err(e) = tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
    {
        eprintln!("Failed to initialize logging: {}", e);
    }

    init_miette();

    log::debug!("Logging initialized, writing to {}", log_dir.join(LOG_FILE).display());
    guard
}

fn init_miette() {
    let caps = get_terminal_caps();

    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(caps.color_level == ColorLevel::TrueColor)
                .unicode(caps.supports_unicode)
                .context_lines(3)
                .break_words(true)
                .color(caps.should_colorize())
                .build(),
        )
    }))
    .ok(); // already set
}

// ============================================================================
// Console Output Utilities
// ============================================================================

/// Print a titled block of `key: value` lines.
pub fn print_panel(title: &str, rows: &[(&str, String)]) {
    let caps = get_terminal_caps();
    let rule = if caps.supports_unicode { "─" } else { "-" };
    let key_width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);

    println!(
        "{} {} {}",
        style(rule.repeat(2)).cyan(),
        style(title).bold(),
        style(rule.repeat(24)).cyan()
    );
    for (key, value) in rows {
        let key = format!("{:width$}", key, width = key_width);
        println!("  {}  {}", style(key).dim(), value);
    }
}

pub fn print_success(message: &str) {
    let prefix = if get_terminal_caps().supports_unicode { "✔" } else { "[ok]" };
    println!("{} {}", style(prefix).green(), style(message).green());
}

pub fn print_info(message: &str) {
    let prefix = if get_terminal_caps().supports_unicode { "ℹ" } else { "[info]" };
    println!("{} {}", style(prefix).blue(), style(message).blue());
}
