//! Voice Selection Service
//!
//! Behavior behind the voice selector: fetch the voice list once per mount,
//! report selections to the parent and persist them to the backend.
//!
//! Each mounted instance owns a [`Generation`]. Operations capture a
//! [`Ticket`] when they start; once the instance is disposed, results of
//! operations still in flight are dropped instead of reaching it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::bindings::VoiceClient;
use crate::services::diagnostics::Diagnostics;

pub type VoiceChangeHandler = Arc<dyn Fn(String) + Send + Sync>;
pub type VoicesHandler = Arc<dyn Fn(Vec<String>) + Send + Sync>;

/// Liveness of one mounted instance.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

/// Snapshot of a [`Generation`] taken when an operation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl Generation {
    pub fn ticket(&self) -> Ticket {
        Ticket(self.0.load(Ordering::Acquire))
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.0.load(Ordering::Acquire) == ticket.0
    }

    /// Invalidate every ticket issued so far.
    pub fn dispose(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Clone)]
pub struct VoiceSelection {
    client: VoiceClient,
    on_voice_change: VoiceChangeHandler,
    on_voices: VoicesHandler,
    diagnostics: Diagnostics,
    generation: Generation,
}

impl VoiceSelection {
    pub fn new(
        client: VoiceClient,
        on_voice_change: VoiceChangeHandler,
        on_voices: VoicesHandler,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            client,
            on_voice_change,
            on_voices,
            diagnostics,
            generation: Generation::default(),
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation.clone()
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.is_current(ticket)
    }

    pub fn dispose(&self) {
        self.generation.dispose();
    }

    /// Fetch the voice list. The ticket is taken now, not when the future
    /// is first polled.
    pub fn mount(&self) -> impl Future<Output = ()> + 'static {
        let ticket = self.generation.ticket();
        let this = self.clone();

        async move {
            let result = this.client.available_voices().await;
            if !this.is_current(ticket) {
                log::debug!("Voice list arrived after dispose, dropped");
                return;
            }
            match result {
                Ok(voices) => {
                    log::debug!("Loaded {} voices", voices.len());
                    (this.on_voices)(voices);
                }
                Err(e) => this
                    .diagnostics
                    .report(&format!("Failed to fetch available voices: {}", e)),
            }
        }
    }

    /// Hand `voice` to the parent callback immediately; the returned future
    /// persists it. Overlapping writes are not ordered.
    pub fn select(&self, voice: String) -> impl Future<Output = ()> + 'static {
        (self.on_voice_change)(voice.clone());

        let ticket = self.generation.ticket();
        let this = self.clone();

        async move {
            let result = this.client.update_voice(&voice).await;
            match result {
                Ok(()) => log::debug!("Voice choice '{}' saved", voice),
                Err(e) if this.is_current(ticket) => this
                    .diagnostics
                    .report(&format!("Failed to update voice choice: {}", e)),
                Err(e) => log::debug!("Voice update failed after dispose: {}", e),
            }
        }
    }
}
