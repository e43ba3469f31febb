//! Build Pipeline
//!
//! Compiles the front-end into the backend's static asset folder:
//! 1. guard against output directories that would swallow the project
//! 2. empty the output directory (keeping `.git`)
//! 3. run the compile command with the mode's defines exported
//! 4. strip source maps unless they were requested

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use thiserror::Error;
use tokio::process::Command;
use walkdir::WalkDir;

use crate::config::{normalize, BuildConfig};
use crate::core::defines::Defines;

/// Placeholder substituted in command arguments.
pub const OUT_DIR_PLACEHOLDER: &str = "{out_dir}";

/// Entries in the output directory that survive emptying.
const PRESERVED_ENTRIES: &[&str] = &[".git"];

#[derive(Debug, Error, Diagnostic)]
pub enum BuildError {
    #[error("Refusing to empty {}: it is the project directory or one of its parents", out_dir.display())]
    #[diagnostic(
        code("VOICERAG::UNSAFE_OUT_DIR"),
        help("Point build.out_dir at a dedicated asset folder such as ../backend/static")
    )]
    UnsafeOutDir { out_dir: PathBuf },

    #[error("Build command is empty")]
    #[diagnostic(code("VOICERAG::BUILD_COMMAND"), help("Set build.command in voicerag.toml"))]
    EmptyCommand,

    #[error("Failed to launch build command '{program}': {source}")]
    #[diagnostic(
        code("VOICERAG::BUILD_SPAWN"),
        help("Is the compiler installed and on PATH? The default command needs `trunk`")
    )]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Build command exited with {status}")]
    #[diagnostic(code("VOICERAG::BUILD_FAILED"))]
    CommandFailed { status: ExitStatus },

    #[error("I/O error at {}: {source}", path.display())]
    #[diagnostic(code("VOICERAG::BUILD_IO"))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output scan task failed: {0}")]
    #[diagnostic(code("VOICERAG::BUILD_TASK"))]
    Task(#[from] tokio::task::JoinError),
}

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub out_dir: PathBuf,
    /// Files present in the output directory after the build.
    pub files: usize,
    pub removed_sourcemaps: usize,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
}

pub struct BuildPipeline {
    config: BuildConfig,
    project_dir: PathBuf,
    defines: Defines,
}

impl BuildPipeline {
    pub fn new(config: BuildConfig, project_dir: impl Into<PathBuf>, defines: Defines) -> Self {
        Self {
            config,
            project_dir: project_dir.into(),
            defines,
        }
    }

    pub async fn run(&self) -> Result<BuildReport, BuildError> {
        let started = Instant::now();
        let out_dir = absolute(&self.config.out_dir)?;
        let project_dir = absolute(&self.project_dir)?;

        if self.config.empty_out_dir {
            if swallows(&out_dir, &project_dir) {
                return Err(BuildError::UnsafeOutDir { out_dir });
            }
            empty_dir(&out_dir).await?;
        } else {
            create_dir(&out_dir).await?;
        }

        self.compile(&out_dir).await?;

        let strip = !self.config.sourcemap;
        let scan_dir = out_dir.clone();
        let (removed_sourcemaps, files) =
            tokio::task::spawn_blocking(move || finish_output(&scan_dir, strip)).await??;

        let report = BuildReport {
            files,
            out_dir,
            removed_sourcemaps,
            finished_at: Utc::now(),
            elapsed: started.elapsed(),
        };
        log::info!(
            "Build finished: {} files in {} ({} source maps removed, {:.1?})",
            report.files,
            report.out_dir.display(),
            report.removed_sourcemaps,
            report.elapsed
        );
        Ok(report)
    }

    async fn compile(&self, out_dir: &Path) -> Result<(), BuildError> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or(BuildError::EmptyCommand)?;

        let out = out_dir.to_string_lossy();
        let args: Vec<String> = args
            .iter()
            .map(|arg| arg.replace(OUT_DIR_PLACEHOLDER, &out))
            .collect();

        log::info!(
            "Running `{} {}` in {}",
            program,
            args.join(" "),
            self.config.frontend_dir.display()
        );
        for (name, value) in self.defines.iter() {
            log::debug!("define {}={:?}", name, value);
        }

        let status = Command::new(program)
            .args(&args)
            .current_dir(&self.config.frontend_dir)
            .envs(self.defines.iter())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| BuildError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(BuildError::CommandFailed { status });
        }
        Ok(())
    }
}

/// Remove every entry of `dir` except [`PRESERVED_ENTRIES`], creating it if missing.
async fn empty_dir(dir: &Path) -> Result<(), BuildError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| BuildError::Io { path, source }
    };

    if !dir.exists() {
        return create_dir(dir).await;
    }

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err(dir))?;
    let mut removed = 0usize;
    while let Some(entry) = entries.next_entry().await.map_err(io_err(dir))? {
        let name = entry.file_name();
        if PRESERVED_ENTRIES.iter().any(|keep| name == *keep) {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type().await.map_err(io_err(&path))?;
        if file_type.is_dir() {
            tokio::fs::remove_dir_all(&path).await.map_err(io_err(&path))?;
        } else {
            tokio::fs::remove_file(&path).await.map_err(io_err(&path))?;
        }
        removed += 1;
    }

    log::debug!("Emptied {} ({} entries removed)", dir.display(), removed);
    Ok(())
}

async fn create_dir(dir: &Path) -> Result<(), BuildError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| BuildError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

/// Strip source maps when asked, then count what is left. Walk errors fail
/// the build so nothing unseen ships.
fn finish_output(dir: &Path, strip_sourcemaps: bool) -> Result<(usize, usize), BuildError> {
    let mut removed = 0;
    let mut files = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| BuildError::Io {
            path: e.path().unwrap_or(dir).to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if strip_sourcemaps && path.extension().is_some_and(|ext| ext == "map") {
            std::fs::remove_file(path).map_err(|source| BuildError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            removed += 1;
        } else {
            files += 1;
        }
    }
    Ok((removed, files))
}

/// True when emptying `out_dir` would delete `project_dir`. Existing paths
/// are compared canonically so symlinks cannot hide an ancestor.
fn swallows(out_dir: &Path, project_dir: &Path) -> bool {
    if project_dir.starts_with(out_dir) {
        return true;
    }
    match (out_dir.canonicalize(), project_dir.canonicalize()) {
        (Ok(out), Ok(project)) => project.starts_with(out),
        _ => false,
    }
}

/// Absolute, lexically normalized path (`..` and `.` folded away).
fn absolute(path: &Path) -> Result<PathBuf, BuildError> {
    let path = std::path::absolute(path).map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(normalize(&path))
}
