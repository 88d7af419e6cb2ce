pub mod json;
pub mod text;

pub use json::{JsonConfig, JsonFormatter, records_to_json, to_json};
pub use text::{TextConfig, TextFormatter, to_text};
