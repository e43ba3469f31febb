use std::sync::Arc;

use leptos::ev;
use leptos::prelude::*;
use wasm_bindgen_futures::spawn_local;

use crate::bindings::VoiceClient;
use crate::config::VoiceSelectorConfig;
use crate::services::diagnostics::Diagnostics;
use crate::services::voice_selection::VoiceSelection;

/// One rendered `<option>`. Value and label are always the voice name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Options for the select control, in backend order.
pub fn voice_options(selected_voice: &str, voices: &[String]) -> Vec<VoiceOption> {
    voices
        .iter()
        .map(|voice| VoiceOption {
            value: voice.clone(),
            label: voice.clone(),
            selected: voice == selected_voice,
        })
        .collect()
}

#[component]
pub fn VoiceSelector(
    config: VoiceSelectorConfig,
    #[prop(into)] selected_voice: Signal<String>,
    #[prop(into)] on_voice_change: Callback<String>,
) -> impl IntoView {
    let available_voices = RwSignal::new(Vec::<String>::new());

    let selection = VoiceSelection::new(
        VoiceClient::new(&config),
        Arc::new(move |voice: String| on_voice_change.run(voice)),
        Arc::new(move |voices: Vec<String>| available_voices.set(voices)),
        Diagnostics::default(),
    );

    spawn_local(selection.mount());

    let generation = selection.generation();
    on_cleanup(move || generation.dispose());

    view! {
        <VoiceSelectorView
            selected_voice=selected_voice
            voices=available_voices
            on_change=move |voice: String| spawn_local(selection.select(voice))
        />
    }
}

/// Label and select control for a given voice list. Holds no state.
#[component]
pub fn VoiceSelectorView(
    #[prop(into)] selected_voice: Signal<String>,
    #[prop(into)] voices: Signal<Vec<String>>,
    #[prop(into)] on_change: Callback<String>,
) -> impl IntoView {
    let handle_change = move |ev: ev::Event| on_change.run(event_target_value(&ev));

    view! {
        <div class="voice-selector">
            <label for="voice-selector">"Select Voice:"</label>
            <select
                id="voice-selector"
                prop:value=move || selected_voice.get()
                on:change=handle_change
            >
                {move || {
                    voice_options(&selected_voice.get(), &voices.get())
                        .into_iter()
                        .map(|option| {
                            view! {
                                <option value=option.value selected=option.selected>
                                    {option.label}
                                </option>
                            }
                        })
                        .collect_view()
                }}
            </select>
        </div>
    }
}
