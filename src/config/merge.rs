//! Layer merge
//!
//! - Objects: deep-merge by key
//! - Arrays: replace (last wins)
//! - Scalars: override (last wins)
//!
//! Keys keep the position they had in the lowest layer that defined them,
//! so `cachingStrategies` rules emit in a stable order.

use serde_json::Value;

/// Deep merge `overlay` into `base`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => {
                        let base_value = std::mem::take(slot);
                        *slot = deep_merge(base_value, overlay_value);
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            Value::Object(base_map)
        }

        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}
