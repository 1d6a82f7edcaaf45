pub mod kv;
pub mod llm;
pub mod postprocess;
pub mod sanitize;
pub(crate) mod prompt_processing;

use serde_json::{Map, Value};

pub type JsonMap = Map<String, Value>;
