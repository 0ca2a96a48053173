//! JSON response envelopes.

use serde_json::{Map, Value};

use crate::protocol::{APP_VERSION, DATA, ERROR, GW_UPTIME, LIB_VERSION, TIME, VERSION};
use crate::timefmt::{elapsed_to_str, now_str};

/// Turn any payload into an object; non-objects are wrapped under `data`.
pub fn into_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert(DATA.to_string(), other);
            map
        }
    }
}

/// `{"ERROR": message}` body.
pub fn error_body(message: impl Into<String>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(ERROR.to_string(), Value::String(message.into()));
    map
}

/// Stamp a gateway response with versions, local time and gateway uptime.
pub fn stamp_gateway(value: Value, app_version: &str, uptime_secs: u64) -> Value {
    let mut map = into_object(value);
    map.insert(APP_VERSION.to_string(), Value::String(app_version.to_string()));
    map.insert(VERSION.to_string(), Value::String(LIB_VERSION.to_string()));
    map.insert(TIME.to_string(), Value::String(now_str()));
    map.insert(
        GW_UPTIME.to_string(),
        Value::String(elapsed_to_str(uptime_secs)),
    );
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_object_wraps_scalars() {
        let map = into_object(json!([1, 2]));
        assert_eq!(map["data"], json!([1, 2]));

        let map = into_object(json!({"a": 1}));
        assert_eq!(map["a"], 1);
        assert!(!map.contains_key("data"));
    }

    #[test]
    fn test_stamp_gateway() {
        let stamped = stamp_gateway(json!({"result": 3}), "2.0.1", 3661);
        assert_eq!(stamped["result"], 3);
        assert_eq!(stamped["app_ver"], "2.0.1");
        assert_eq!(stamped["ver"], LIB_VERSION);
        assert_eq!(stamped["gw-uptime"], "1:01:01");
        assert!(stamped["time"].is_string());
    }

    #[test]
    fn test_error_body() {
        assert_eq!(Value::Object(error_body("nope")), json!({"ERROR": "nope"}));
    }
}
