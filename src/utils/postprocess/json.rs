use serde_json::{from_str, Value};
use anyhow::Result;
use log::warn;
use std::error::Error;
use std::fmt;
use std::fmt::Formatter;
use crate::utils::JsonMap;


/// Filters invalid content around the outermost braces and tries to parse the rest as json.
///
/// Returns a [serde_json::Value] if the string is valid json else an error.
///
/// # Example
/// ```
/// use paramprompt::utils::postprocess::json::filter_to_json;
/// let valid_str = "partially valid: {\"a\":\"alice\"}";
/// let json_value = filter_to_json(valid_str).expect("Expect to be fine but failed");
/// assert_eq!(json_value["a"], "alice");
///
/// let invalid_str = "partially valid: \"a\":\"alice\"}";
/// assert_eq!(filter_to_json(invalid_str).is_err(), true)
/// ```
pub fn filter_to_json(string: impl Into<String>) -> Result<Value> {
    let string = string.into();
    let left_brace_idx = string.find('{');
    let right_brace_idx = string.rfind('}');
    match (left_brace_idx, right_brace_idx) {
        (Some(lbi), Some(rbi)) if lbi < rbi => {
            let valid_json = &string[lbi..rbi + 1];
            let value = from_str(valid_json)?;
            Ok(value)
        }
        _ => Err(InvalidJSON { invalid_string: string }.into())
    }
}

/// Parse the content of a structured (JSON mode) model reply into an object.
///
/// Missing content, content that is not JSON and JSON that is not an object all yield an empty object: a malformed
/// reply means "no outputs", never a failed request. JSON wrapped in prose or code fences counts as malformed.
///
/// ```
/// use paramprompt::utils::postprocess::json::parse_reply_object;
/// assert_eq!(parse_reply_object(Some(r#"{"title": "t"}"#))["title"], "t");
/// assert!(parse_reply_object(Some("sorry, I cannot")).is_empty());
/// assert!(parse_reply_object(Some(r#"Sure: {"title": "t"}"#)).is_empty());
/// assert!(parse_reply_object(None).is_empty());
/// ```
pub fn parse_reply_object(content: Option<&str>) -> JsonMap {
    let Some(content) = content else {
        warn!("Reply has no content, treating it as an empty object");
        return JsonMap::new();
    };
    match from_str::<Value>(content) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!("Reply content is JSON but not an object, treating it as an empty object: {}", other);
            JsonMap::new()
        }
        Err(e) => {
            warn!("Reply content is not valid JSON, treating it as an empty object: {}", e);
            JsonMap::new()
        }
    }
}

/// Extract the human readable message from a provider error payload such as
/// `429 {"error": {"message": "Rate limit reached", "type": "tokens"}}`.
///
/// Returns `None` when the payload carries no structured message.
pub fn extract_error_message(payload: &str) -> Option<String> {
    let value = filter_to_json(payload).ok()?;
    value.pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Error when the string is not a valid json.
#[derive(Debug, Clone)]
pub struct InvalidJSON {
    pub invalid_string: String,
}


impl fmt::Display for InvalidJSON {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid string to be parsed:\n{}", self.invalid_string)
    }
}

impl Error for InvalidJSON {}


#[cfg(test)]
mod test_json {
    use crate::utils::postprocess::json::{extract_error_message, filter_to_json, parse_reply_object};

    #[test]
    fn test_filter_to_json() {
        let valid_str = "{\"a\":\"alice\"}";
        let json_value = filter_to_json(valid_str).expect("Expect to be fine but failed");
        assert_eq!(json_value["a"], "alice");

        let valid_str = "Here is the result you ask for: {\"a\":\"alice\"}";
        let json_value = filter_to_json(valid_str).expect("Expect to be fine but failed");
        assert_eq!(json_value["a"], "alice");

        let invalid_str = "Here is the result you ask for: {\"a\":\"alice\"";
        filter_to_json(invalid_str).expect_err("This should give error but not");

        let invalid_str = "{{}}";
        filter_to_json(invalid_str).expect_err("This should give error but not");

        let invalid_str = "} backwards {";
        filter_to_json(invalid_str).expect_err("This should give error but not");
    }

    #[test]
    fn test_parse_reply_object() {
        let map = parse_reply_object(Some("{\"coverLetter\":\"Dear\\nHi\"}"));
        assert_eq!(map["coverLetter"], "Dear\nHi");
        let map = parse_reply_object(Some("  {\"a\": 1}\n"));
        assert_eq!(map["a"], 1);
        assert!(parse_reply_object(Some("```json\n{\"a\": 1}\n```")).is_empty());
        assert!(parse_reply_object(Some("Sure! Here it is: {\"a\": 1} hope that helps")).is_empty());
        assert!(parse_reply_object(Some("[1, 2]")).is_empty());
        assert!(parse_reply_object(Some("")).is_empty());
    }

    #[test]
    fn test_extract_error_message() {
        let payload = r#"429 {"error":{"message":"Rate limit reached for model llama","type":"tokens","code":"rate_limit_exceeded"}}"#;
        assert_eq!(extract_error_message(payload).as_deref(), Some("Rate limit reached for model llama"));
        assert_eq!(extract_error_message(r#"{"message": "slow down"}"#).as_deref(), Some("slow down"));
        assert_eq!(extract_error_message("plain text"), None);
        assert_eq!(extract_error_message(r#"{"error": {"code": 1}}"#), None);
    }
}
