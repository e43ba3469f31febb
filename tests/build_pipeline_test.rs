//! Build pipeline integration tests
//!
//! Drive `BuildPipeline` with small shell commands standing in for the
//! front-end compiler.

#![cfg(unix)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use voicerag::config::{AppConfig, ApiConfig, BuildConfig, Mode, API_ENDPOINT_VAR};
use voicerag::core::build::{BuildError, BuildPipeline};
use voicerag::core::defines::Defines;

struct Project {
    root: TempDir,
}

impl Project {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("app/frontend")).unwrap();
        Self { root }
    }

    fn project_dir(&self) -> std::path::PathBuf {
        self.root.path().join("app")
    }

    fn out_dir(&self) -> std::path::PathBuf {
        self.root.path().join("backend/static")
    }

    fn build_config(&self, script: &str) -> BuildConfig {
        BuildConfig {
            out_dir: self.project_dir().join("../backend/static"),
            frontend_dir: self.project_dir().join("frontend"),
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            ..BuildConfig::default()
        }
    }
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[tokio::test]
async fn test_out_dir_emptied_before_build() {
    let project = Project::new();
    write(&project.out_dir().join("stale.js"), "old");
    write(&project.out_dir().join("assets/old.css"), "old");
    write(&project.out_dir().join(".git/HEAD"), "ref: main");

    let config = project.build_config("echo '<html></html>' > {out_dir}/index.html");
    let report = BuildPipeline::new(config, project.project_dir(), Defines::default())
        .run()
        .await
        .unwrap();

    assert!(!project.out_dir().join("stale.js").exists());
    assert!(!project.out_dir().join("assets").exists());
    assert!(project.out_dir().join(".git/HEAD").exists());
    assert!(project.out_dir().join("index.html").exists());
    assert_eq!(report.out_dir, project.out_dir());
}

#[tokio::test]
async fn test_out_dir_kept_when_emptying_disabled() {
    let project = Project::new();
    write(&project.out_dir().join("keep.txt"), "keep");

    let config = BuildConfig {
        empty_out_dir: false,
        ..project.build_config("true")
    };
    BuildPipeline::new(config, project.project_dir(), Defines::default())
        .run()
        .await
        .unwrap();

    assert!(project.out_dir().join("keep.txt").exists());
}

#[tokio::test]
async fn test_missing_out_dir_created() {
    let project = Project::new();
    let config = project.build_config("true");

    BuildPipeline::new(config, project.project_dir(), Defines::default())
        .run()
        .await
        .unwrap();

    assert!(project.out_dir().is_dir());
}

#[tokio::test]
async fn test_defines_exported_to_compiler() {
    let project = Project::new();
    let app_config = AppConfig {
        api: ApiConfig {
            api_base_url: Some("https://voicerag.example.com".to_string()),
        },
        ..AppConfig::default()
    };
    let defines = Defines::from_config(&app_config, &Mode::production()).unwrap();

    let config = project.build_config(&format!(
        "printf '%s|%s' \"${}\" \"$VOICERAG_MODE\" > {{out_dir}}/defines.txt",
        API_ENDPOINT_VAR
    ));
    BuildPipeline::new(config, project.project_dir(), defines)
        .run()
        .await
        .unwrap();

    let written = fs::read_to_string(project.out_dir().join("defines.txt")).unwrap();
    assert_eq!(written, "https://voicerag.example.com|production");
}

#[tokio::test]
async fn test_command_runs_in_frontend_dir() {
    let project = Project::new();
    let config = project.build_config("pwd > {out_dir}/cwd.txt");

    BuildPipeline::new(config, project.project_dir(), Defines::default())
        .run()
        .await
        .unwrap();

    let cwd = fs::read_to_string(project.out_dir().join("cwd.txt")).unwrap();
    let expected = fs::canonicalize(project.project_dir().join("frontend")).unwrap();
    assert_eq!(fs::canonicalize(cwd.trim()).unwrap(), expected);
}

#[tokio::test]
async fn test_sourcemaps_stripped_by_default() {
    let project = Project::new();
    let config = project.build_config(
        "mkdir -p {out_dir}/assets && touch {out_dir}/app.js {out_dir}/app.js.map {out_dir}/assets/style.css.map",
    );

    let report = BuildPipeline::new(config, project.project_dir(), Defines::default())
        .run()
        .await
        .unwrap();

    assert_eq!(report.removed_sourcemaps, 2);
    assert_eq!(report.files, 1);
    assert!(project.out_dir().join("app.js").exists());
    assert!(!project.out_dir().join("app.js.map").exists());
}

#[tokio::test]
async fn test_sourcemaps_kept_when_requested() {
    let project = Project::new();
    let config = BuildConfig {
        sourcemap: true,
        ..project.build_config("touch {out_dir}/app.js {out_dir}/app.js.map")
    };

    let report = BuildPipeline::new(config, project.project_dir(), Defines::default())
        .run()
        .await
        .unwrap();

    assert_eq!(report.removed_sourcemaps, 0);
    assert!(project.out_dir().join("app.js.map").exists());
}

#[tokio::test]
async fn test_failing_command_reported() {
    let project = Project::new();
    let config = project.build_config("exit 3");

    let result = BuildPipeline::new(config, project.project_dir(), Defines::default())
        .run()
        .await;

    match result {
        Err(BuildError::CommandFailed { status }) => assert_eq!(status.code(), Some(3)),
        other => panic!("expected CommandFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_program_reported() {
    let project = Project::new();
    let config = BuildConfig {
        command: vec!["voicerag-no-such-compiler".to_string()],
        ..project.build_config("")
    };

    let result = BuildPipeline::new(config, project.project_dir(), Defines::default())
        .run()
        .await;
    assert!(matches!(result, Err(BuildError::Spawn { .. })));
}

#[tokio::test]
async fn test_empty_command_rejected() {
    let project = Project::new();
    let config = BuildConfig {
        command: Vec::new(),
        ..project.build_config("")
    };

    let result = BuildPipeline::new(config, project.project_dir(), Defines::default())
        .run()
        .await;
    assert!(matches!(result, Err(BuildError::EmptyCommand)));
}

#[tokio::test]
async fn test_project_dir_never_emptied() {
    let project = Project::new();
    write(&project.project_dir().join("voicerag.toml"), "");

    for out_dir in [project.project_dir(), project.project_dir().join("..")] {
        let config = BuildConfig {
            out_dir,
            ..project.build_config("true")
        };
        let result = BuildPipeline::new(config, project.project_dir(), Defines::default())
            .run()
            .await;
        assert!(matches!(result, Err(BuildError::UnsafeOutDir { .. })));
    }

    assert!(project.project_dir().join("voicerag.toml").exists());
}

#[tokio::test]
async fn test_symlinked_project_dir_never_emptied() {
    let project = Project::new();
    write(&project.project_dir().join("voicerag.toml"), "");
    let link = project.root.path().join("static-link");
    std::os::unix::fs::symlink(project.project_dir(), &link).unwrap();

    let config = BuildConfig {
        out_dir: link,
        ..project.build_config("true")
    };
    let result = BuildPipeline::new(config, project.project_dir(), Defines::default())
        .run()
        .await;

    assert!(matches!(result, Err(BuildError::UnsafeOutDir { .. })));
    assert!(project.project_dir().join("voicerag.toml").exists());
}

#[tokio::test]
async fn test_vanished_output_fails_build() {
    let project = Project::new();
    let config = project.build_config("rm -rf {out_dir}");

    let result = BuildPipeline::new(config, project.project_dir(), Defines::default())
        .run()
        .await;
    assert!(matches!(result, Err(BuildError::Io { .. })));
}
