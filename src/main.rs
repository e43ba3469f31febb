use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use voicerag::config::{AppConfig, Mode};
use voicerag::core::build::BuildPipeline;
use voicerag::core::defines::Defines;
use voicerag::core::dev_server::DevServer;
use voicerag::core::logging::{self, print_info, print_panel, print_success};

#[derive(Parser, Debug)]
#[command(name = "voicerag")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "VoiceRAG front-end toolchain - build and realtime dev server")]
struct Args {
    /// Project directory holding voicerag.toml
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile the front-end into the backend's static folder
    Build {
        #[arg(long, default_value = "production")]
        mode: Mode,
    },
    /// Serve the built front-end and proxy realtime websockets
    Serve {
        #[arg(long, default_value = "development")]
        mode: Mode,

        /// Override server.port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the resolved configuration and compile-time defines
    Config {
        #[arg(long, default_value = "development")]
        mode: Mode,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init(args.verbose);
    log::info!("{} v{} starting", voicerag::NAME, voicerag::VERSION);

    match args.command {
        Command::Build { mode } => build(&args.project_dir, &mode).await,
        Command::Serve { mode, port } => serve(&args.project_dir, &mode, port).await,
        Command::Config { mode } => show_config(&args.project_dir, &mode),
    }
}

async fn build(project_dir: &Path, mode: &Mode) -> Result<()> {
    let config = AppConfig::load(mode, project_dir)?;
    let defines = Defines::from_config(&config, mode)?;

    let report = BuildPipeline::new(config.build, project_dir, defines)
        .run()
        .await?;

    print_success(&format!(
        "Built {} files into {} in {:.1?} ({})",
        report.files,
        report.out_dir.display(),
        report.elapsed,
        report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    Ok(())
}

async fn serve(project_dir: &Path, mode: &Mode, port: Option<u16>) -> Result<()> {
    let mut config = AppConfig::load(mode, project_dir)?;
    if let Some(port) = port {
        config.server.port = port;
    }

    let mut server = DevServer::from_config(&config);
    server.start().await?;

    print_info(&format!("Dev server running at {}", server.url()));
    for rule in &config.server.proxy {
        print_info(&format!("  {} -> {}", rule.prefix, rule.target));
    }

    tokio::signal::ctrl_c().await.into_diagnostic()?;
    server.stop().await;
    Ok(())
}

fn show_config(project_dir: &Path, mode: &Mode) -> Result<()> {
    let config = AppConfig::load(mode, project_dir)?;
    let defines = Defines::from_config(&config, mode)?;

    let mut rows = vec![
        ("mode", mode.to_string()),
        ("out_dir", config.build.out_dir.display().to_string()),
        ("empty_out_dir", config.build.empty_out_dir.to_string()),
        ("sourcemap", config.build.sourcemap.to_string()),
        ("command", config.build.command.join(" ")),
        ("server", format!("{}:{}", config.server.host, config.server.port)),
        ("serve_dir", config.serve_dir().display().to_string()),
    ];
    for rule in &config.server.proxy {
        rows.push(("proxy", format!("{} -> {}", rule.prefix, rule.target)));
    }
    print_panel("Configuration", &rows);

    let define_rows: Vec<_> = defines.iter().map(|(k, v)| (k, format!("{:?}", v))).collect();
    print_panel("Defines", &define_rows);
    Ok(())
}
