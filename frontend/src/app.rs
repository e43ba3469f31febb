use leptos::prelude::*;

use crate::components::voice_selector::VoiceSelector;
use crate::config::VoiceSelectorConfig;

#[component]
pub fn App() -> impl IntoView {
    let selected_voice = RwSignal::new(String::new());
    let config = VoiceSelectorConfig::from_build_env();

    view! {
        <main class="app">
            <VoiceSelector
                config=config
                selected_voice=selected_voice
                on_voice_change=move |voice: String| selected_voice.set(voice)
            />
        </main>
    }
}
