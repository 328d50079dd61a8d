//! Recursive TOML table merge: `overlay` wins for scalars and arrays,
//! tables are merged key-by-key instead of replaced wholesale.

use toml::Value;

pub fn merge_toml_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Table(mut base_table), Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_value) => merge_toml_values(base_value, overlay_value),
                    None => overlay_value,
                };
                base_table.insert(key, merged);
            }
            Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}
