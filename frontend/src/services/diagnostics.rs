use std::sync::Arc;

/// Error channel for failures that are logged but never surfaced.
#[derive(Clone)]
pub struct Diagnostics {
    sink: Arc<dyn Fn(&str) + Send + Sync>,
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics").finish_non_exhaustive()
    }
}

impl Diagnostics {
    pub fn new(sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Forwards to `log::error!` and the browser console.
    pub fn console() -> Self {
        Self::new(|message| {
            log::error!("{}", message);
            #[cfg(target_arch = "wasm32")]
            web_sys::console::error_1(&message.into());
        })
    }

    pub fn report(&self, message: &str) {
        (self.sink)(message);
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::console()
    }
}
