pub mod voice_selector;
