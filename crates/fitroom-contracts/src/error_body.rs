use serde_json::Value;

/// Fallback for a non-success predictor response without a usable `detail`.
pub const REQUEST_FAILED_MESSAGE: &str = "Prediction failed.";
/// Fallback when no response arrived or the failure carried no text.
pub const SERVER_ERROR_MESSAGE: &str = "Server error. Please try again.";
/// Fallback for a failed try-on generation.
pub const TRYON_FAILED_MESSAGE: &str = "Virtual try-on failed.";

/// Extracts the human-readable message from a structured error body.
///
/// `detail` is either a string or, for request validation errors, a list of
/// items each carrying a `msg`. Anything else yields `None`.
pub fn detail_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    match parsed.get("detail")? {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .map(str::trim)
                .filter(|msg| !msg.is_empty())
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        _ => None,
    }
}

pub fn failure_message(body: &str, fallback: &str) -> String {
    detail_message(body).unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::{detail_message, failure_message, REQUEST_FAILED_MESSAGE};

    #[test]
    fn string_detail_is_used_verbatim() {
        assert_eq!(
            failure_message(r#"{"detail": "model unavailable"}"#, REQUEST_FAILED_MESSAGE),
            "model unavailable"
        );
    }

    #[test]
    fn validation_detail_list_is_joined() {
        let body = r#"{"detail": [
            {"loc": ["body", "age"], "msg": "Input should be greater than 0", "type": "greater_than"},
            {"loc": ["body", "height_cm"], "msg": "Field required", "type": "missing"}
        ]}"#;
        assert_eq!(
            detail_message(body).as_deref(),
            Some("Input should be greater than 0; Field required")
        );
    }

    #[test]
    fn unusable_bodies_fall_back() {
        for body in [
            "",
            "<html>502 Bad Gateway</html>",
            r#"{"error": "boom"}"#,
            r#"{"detail": ""}"#,
            r#"{"detail": 42}"#,
            r#"{"detail": [{"loc": ["body"]}]}"#,
        ] {
            assert_eq!(failure_message(body, REQUEST_FAILED_MESSAGE), "Prediction failed.");
        }
    }
}
