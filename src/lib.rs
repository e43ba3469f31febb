/// VoiceRAG front-end toolchain
///
/// Native side of the voice-selection front-end: per-mode configuration,
/// the build pipeline that stages compiled assets for the backend, and the
/// development server that forwards realtime websocket traffic.

pub mod config;
pub mod core;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
