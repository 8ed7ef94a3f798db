pub mod preferences;
pub mod terminal;
