use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Name of the per-project configuration file.
pub const CONFIG_FILE: &str = "voicerag.toml";

/// Prefix for structured environment overrides (`VOICERAG_SERVER__PORT`).
pub const ENV_PREFIX: &str = "VOICERAG_";

/// Environment variable carrying the backend API base URL.
pub const API_ENDPOINT_VAR: &str = "VOICERAG_API_ENDPOINT";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("Failed to load configuration for mode '{mode}': {source}")]
    #[diagnostic(
        code("VOICERAG::CONFIG_LOAD"),
        help("Check voicerag.toml and the VOICERAG_* environment variables")
    )]
    Load {
        mode: String,
        #[source]
        source: Box<figment::Error>,
    },

    #[error("Invalid API base URL '{url}': {source}")]
    #[diagnostic(
        code("VOICERAG::API_BASE_URL"),
        help("Use an absolute URL such as https://voicerag.example.com, or leave it empty for same-origin requests")
    )]
    InvalidApiBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid proxy rule for prefix '{prefix}': {reason}")]
    #[diagnostic(code("VOICERAG::PROXY_RULE"))]
    InvalidProxyRule { prefix: String, reason: String },

    #[error("Build mode name must not be empty")]
    #[diagnostic(code("VOICERAG::MODE"))]
    EmptyMode,
}

// ============================================================================
// Build Mode
// ============================================================================

/// Active build mode. Selects the matching profile in `voicerag.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mode(String);

impl Mode {
    pub const DEVELOPMENT: &'static str = "development";
    pub const PRODUCTION: &'static str = "production";

    pub fn development() -> Self {
        Self(Self::DEVELOPMENT.to_string())
    }

    pub fn production() -> Self {
        Self(Self::PRODUCTION.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_production(&self) -> bool {
        self.0 == Self::PRODUCTION
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(ConfigError::EmptyMode);
        }
        Ok(Self(name))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Configuration Sections
// ============================================================================

/// Top-level toolchain configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub build: BuildConfig,
    pub server: ServerConfig,
}

/// Backend API location handed to the front-end at compile time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the backend API. Empty or unset means same-origin.
    pub api_base_url: Option<String>,
}

/// Front-end compile and asset staging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Where compiled assets land, relative to `frontend_dir`. The backend
    /// serves this folder as static content.
    pub out_dir: PathBuf,
    /// Remove everything inside `out_dir` before compiling.
    pub empty_out_dir: bool,
    /// Keep `*.map` files in the output.
    pub sourcemap: bool,
    /// Compile command. `{out_dir}` is replaced with the resolved output directory.
    pub command: Vec<String>,
    /// Working directory of the compile command.
    pub frontend_dir: PathBuf,
}

/// Development server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Static directory served at `/`. Falls back to `build.out_dir`.
    pub serve_dir: Option<PathBuf>,
    pub proxy: Vec<ProxyRule>,
}

/// Forward websocket upgrades under `prefix` to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRule {
    pub prefix: String,
    pub target: String,
    /// Replace the client's `Origin` header with the target origin.
    #[serde(default = "default_true")]
    pub rewrite_ws_origin: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("../backend/static"),
            empty_out_dir: true,
            sourcemap: false,
            command: ["trunk", "build", "--release", "--dist", "{out_dir}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            frontend_dir: PathBuf::from("frontend"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5173,
            serve_dir: None,
            proxy: vec![ProxyRule::realtime()],
        }
    }
}

impl ProxyRule {
    /// The realtime voice backend on its default local port.
    pub fn realtime() -> Self {
        Self {
            prefix: "/realtime".to_string(),
            target: "ws://localhost:8765".to_string(),
            rewrite_ws_origin: true,
        }
    }

    /// Parsed target with `http(s)` normalized to `ws(s)`.
    pub fn target_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidProxyRule {
            prefix: self.prefix.clone(),
            reason,
        };

        let mut url = Url::parse(&self.target).map_err(|e| invalid(format!("target: {e}")))?;
        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => return Err(invalid(format!("unsupported target scheme '{other}'"))),
        };
        if url.scheme() != scheme {
            url.set_scheme(scheme)
                .map_err(|_| invalid("cannot convert target scheme".to_string()))?;
        }
        if url.host_str().is_none() {
            return Err(invalid("target has no host".to_string()));
        }
        Ok(url)
    }

    /// Prefix must name a sub-path; target must be a websocket-capable URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.prefix.starts_with('/') || self.prefix == "/" {
            return Err(ConfigError::InvalidProxyRule {
                prefix: self.prefix.clone(),
                reason: "prefix must start with '/' and name a sub-path".to_string(),
            });
        }
        self.target_url().map(|_| ())
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AppConfig {
    /// Layered configuration for `mode`: defaults, `voicerag.toml` profiles,
    /// then environment overrides. Relative paths resolve against `project_dir`.
    pub fn load(mode: &Mode, project_dir: &Path) -> Result<Self, ConfigError> {
        let mut config: AppConfig =
            Self::figment(mode, project_dir)
                .extract()
                .map_err(|e| ConfigError::Load {
                    mode: mode.to_string(),
                    source: Box::new(e),
                })?;

        config.resolve_paths(project_dir);
        config.validate()?;

        log::info!(
            "Loaded configuration for mode '{}' from {}",
            mode,
            project_dir.join(CONFIG_FILE).display()
        );
        Ok(config)
    }

    /// Provider stack used by [`AppConfig::load`].
    pub fn figment(mode: &Mode, project_dir: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(project_dir.join(CONFIG_FILE)).nested())
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["api_endpoint", "mode"])
                    .split("__")
                    .global(),
            )
            .merge(
                Env::raw()
                    .filter_map(|key| {
                        key.as_str()
                            .eq_ignore_ascii_case(API_ENDPOINT_VAR)
                            .then(|| "api.api_base_url".into())
                    })
                    .global(),
            )
            .select(mode.as_str())
    }

    /// Directory served by the development server.
    pub fn serve_dir(&self) -> &Path {
        self.server
            .serve_dir
            .as_deref()
            .unwrap_or(self.build.out_dir.as_path())
    }

    /// `frontend_dir` and `serve_dir` resolve against `project_dir`;
    /// `out_dir` resolves against the front-end root, so the default lands
    /// in the project's sibling `backend/static`.
    fn resolve_paths(&mut self, project_dir: &Path) {
        let resolve = |path: &mut PathBuf, base: &Path| {
            if path.is_relative() {
                *path = normalize(&base.join(&*path));
            }
        };
        resolve(&mut self.build.frontend_dir, project_dir);
        let frontend_dir = self.build.frontend_dir.clone();
        resolve(&mut self.build.out_dir, &frontend_dir);
        if let Some(dir) = self.server.serve_dir.as_mut() {
            resolve(dir, project_dir);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.api.resolved_base_url()?;
        for rule in &self.server.proxy {
            rule.validate()?;
        }
        Ok(())
    }
}

/// Fold `.` and `..` components without touching the filesystem.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

impl ApiConfig {
    /// Base URL without trailing slash; empty for same-origin.
    pub fn resolved_base_url(&self) -> Result<String, ConfigError> {
        let raw = self.api_base_url.as_deref().map(str::trim).unwrap_or("");
        if raw.is_empty() {
            return Ok(String::new());
        }
        Url::parse(raw).map_err(|source| ConfigError::InvalidApiBaseUrl {
            url: raw.to_string(),
            source,
        })?;
        Ok(raw.trim_end_matches('/').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.build.out_dir, PathBuf::from("../backend/static"));
        assert!(config.build.empty_out_dir);
        assert!(!config.build.sourcemap);
        assert_eq!(config.server.proxy, vec![ProxyRule::realtime()]);
        assert!(config.api.api_base_url.is_none());
    }

    #[test]
    fn test_realtime_rule() {
        let rule = ProxyRule::realtime();
        assert_eq!(rule.prefix, "/realtime");
        assert_eq!(rule.target_url().unwrap().as_str(), "ws://localhost:8765/");
        assert!(rule.rewrite_ws_origin);
    }

    #[test]
    fn test_root_prefix_rejected() {
        let rule = ProxyRule {
            prefix: "/".to_string(),
            ..ProxyRule::realtime()
        };
        assert!(rule.validate().is_err());
    }

    #[rstest]
    #[case("ws://localhost:8765", "ws")]
    #[case("http://localhost:8765", "ws")]
    #[case("wss://voice.example.com", "wss")]
    #[case("https://voice.example.com", "wss")]
    fn test_target_scheme_normalized(#[case] target: &str, #[case] scheme: &str) {
        let rule = ProxyRule {
            target: target.to_string(),
            ..ProxyRule::realtime()
        };
        assert_eq!(rule.target_url().unwrap().scheme(), scheme);
    }

    #[test]
    fn test_unsupported_target_scheme() {
        let rule = ProxyRule {
            target: "ftp://localhost:21".to_string(),
            ..ProxyRule::realtime()
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Production".parse::<Mode>().unwrap(), Mode::production());
        assert!(" ".parse::<Mode>().is_err());
        assert!(Mode::production().is_production());
        assert!(!Mode::development().is_production());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let api = ApiConfig {
            api_base_url: Some("https://voicerag.example.com/".to_string()),
        };
        assert_eq!(api.resolved_base_url().unwrap(), "https://voicerag.example.com");
    }

    #[test]
    fn test_base_url_empty_is_same_origin() {
        assert_eq!(ApiConfig::default().resolved_base_url().unwrap(), "");
    }

    #[test]
    fn test_base_url_rejects_relative() {
        let api = ApiConfig {
            api_base_url: Some("not a url".to_string()),
        };
        assert!(matches!(
            api.resolved_base_url(),
            Err(ConfigError::InvalidApiBaseUrl { .. })
        ));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        Jail::expect_with(|jail| {
            let config = AppConfig::load(&Mode::development(), jail.directory())
                .map_err(|e| e.to_string())?;
            assert_eq!(config.server.port, 5173);
            assert_eq!(config.build.frontend_dir, jail.directory().join("frontend"));
            Ok(())
        });
    }

    #[test]
    fn test_mode_profile_overrides_default() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                [default.api]
                api_base_url = "http://localhost:8765"

                [production.api]
                api_base_url = "https://voicerag.example.com"
                "#,
            )?;

            let dev = AppConfig::load(&Mode::development(), jail.directory())
                .map_err(|e| e.to_string())?;
            assert_eq!(dev.api.api_base_url.as_deref(), Some("http://localhost:8765"));

            let prod = AppConfig::load(&Mode::production(), jail.directory())
                .map_err(|e| e.to_string())?;
            assert_eq!(
                prod.api.api_base_url.as_deref(),
                Some("https://voicerag.example.com")
            );
            Ok(())
        });
    }

    #[test]
    fn test_endpoint_env_wins() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                [production.api]
                api_base_url = "https://voicerag.example.com"
                "#,
            )?;
            jail.set_env(API_ENDPOINT_VAR, "https://staging.example.com");

            let config = AppConfig::load(&Mode::production(), jail.directory())
                .map_err(|e| e.to_string())?;
            assert_eq!(
                config.api.api_base_url.as_deref(),
                Some("https://staging.example.com")
            );
            Ok(())
        });
    }

    #[test]
    fn test_structured_env_override() {
        Jail::expect_with(|jail| {
            jail.set_env("VOICERAG_SERVER__PORT", "4000");
            let config = AppConfig::load(&Mode::development(), jail.directory())
                .map_err(|e| e.to_string())?;
            assert_eq!(config.server.port, 4000);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_proxy_rule_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                [[default.server.proxy]]
                prefix = "realtime"
                target = "ws://localhost:8765"
                "#,
            )?;
            let result = AppConfig::load(&Mode::development(), jail.directory());
            assert!(matches!(result, Err(ConfigError::InvalidProxyRule { .. })));
            Ok(())
        });
    }

    #[test]
    fn test_default_out_dir_is_sibling_backend() {
        Jail::expect_with(|jail| {
            let config = AppConfig::load(&Mode::production(), jail.directory())
                .map_err(|e| e.to_string())?;
            assert_eq!(config.build.out_dir, jail.directory().join("backend/static"));
            assert_eq!(config.serve_dir(), jail.directory().join("backend/static"));
            Ok(())
        });
    }

    #[test]
    fn test_out_dir_follows_custom_frontend_dir() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                [default.build]
                frontend_dir = "web/ui"
                "#,
            )?;
            let config = AppConfig::load(&Mode::production(), jail.directory())
                .map_err(|e| e.to_string())?;
            assert_eq!(config.build.out_dir, jail.directory().join("web/backend/static"));
            Ok(())
        });
    }

    #[test]
    fn test_normalize_folds_components() {
        assert_eq!(
            normalize(Path::new("/srv/app/./frontend/../backend/static")),
            PathBuf::from("/srv/app/backend/static")
        );
    }

    #[test]
    fn test_serve_dir_falls_back_to_out_dir() {
        let config = AppConfig::default();
        assert_eq!(config.serve_dir(), Path::new("../backend/static"));
    }
}
