//! Remote-tool content extraction (§4.8): turns whatever wrapper shape a
//! remote server's `call_tool` response comes back in into a plain value
//! the executor can treat like any other tool's `data`.

use serde_json::Value;

/// Remote servers return responses shaped like
/// `{content: [{type, text | ...}, ...], is_error: bool}`. This:
/// - returns non-mappings as-is
/// - returns mappings with no `content` field as-is
/// - for a single text content item, trims it, locates the first `{`, and
///   attempts to JSON-parse the tail; a parse that yields an object with
///   both `columns`/`Columns` and `rows`/`Rows` is returned as that parsed
///   tabular structure (so the executor's result-offload step can route it
///   to the SQL result store); any other valid JSON is returned parsed;
///   otherwise the trimmed text is returned as a string
/// - multiple content items are returned as the original sequence
pub fn extract_remote_content(response: &Value) -> Value {
    let Some(obj) = response.as_object() else {
        return response.clone();
    };

    let Some(content) = obj.get("content").and_then(|c| c.as_array()) else {
        return response.clone();
    };

    if content.len() != 1 {
        return Value::Array(content.clone());
    }

    let item = &content[0];
    if item.get("type").and_then(|t| t.as_str()) != Some("text") {
        return Value::Array(content.clone());
    }

    let Some(text) = item.get("text").and_then(|t| t.as_str()) else {
        return Value::Array(content.clone());
    };

    let trimmed = text.trim();
    let Some(brace_idx) = trimmed.find('{') else {
        return Value::String(trimmed.to_string());
    };

    match serde_json::from_str::<Value>(&trimmed[brace_idx..]) {
        Ok(parsed) => parsed,
        Err(_) => Value::String(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_mapping_passes_through() {
        let v = json!("plain string");
        assert_eq!(extract_remote_content(&v), v);
    }

    #[test]
    fn mapping_without_content_passes_through() {
        let v = json!({"foo": "bar"});
        assert_eq!(extract_remote_content(&v), v);
    }

    #[test]
    fn single_text_item_with_plain_text_is_unwrapped() {
        let v = json!({"content": [{"type": "text", "text": "hello world"}], "is_error": false});
        assert_eq!(extract_remote_content(&v), json!("hello world"));
    }

    #[test]
    fn single_text_item_with_json_object_is_parsed() {
        let v = json!({"content": [{"type": "text", "text": "  {\"ok\": true}"}]});
        assert_eq!(extract_remote_content(&v), json!({"ok": true}));
    }

    #[test]
    fn single_text_item_with_tabular_json_is_parsed() {
        let v = json!({"content": [{"type": "text", "text": "{\"columns\":[\"a\"],\"rows\":[[1]]}"}]});
        let extracted = extract_remote_content(&v);
        assert!(extracted.get("columns").is_some());
        assert!(extracted.get("rows").is_some());
    }

    #[test]
    fn multiple_content_items_returned_as_sequence() {
        let v = json!({"content": [
            {"type": "text", "text": "first"},
            {"type": "text", "text": "second"}
        ]});
        let extracted = extract_remote_content(&v);
        assert!(extracted.is_array());
        assert_eq!(extracted.as_array().unwrap().len(), 2);
    }
}
