//! JSON settings store

mod store;

pub use store::{from_jsonc_str, strip_json_comments, JsonStore, PROJECT_DIR};
