pub mod diagnostics;
pub mod voice_selection;
