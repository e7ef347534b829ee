//! JSON output for API responses.

use serde::Serialize;

/// Serializes `value` as JSON, indented when `pretty` is set.
pub fn dump<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compact_and_pretty() {
        let value = json!({"id": 1});
        assert_eq!(dump(&value, false).unwrap(), r#"{"id":1}"#);
        assert_eq!(dump(&value, true).unwrap(), "{\n  \"id\": 1\n}");
    }
}
