//! Deep-merges layered TOML documents, later layers winning.

use toml::Value;

/// Merges `overlay` into `base` in place: tables merge key-by-key
/// recursively, everything else (scalars, arrays) in `overlay` replaces
/// the corresponding value in `base`.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Table(base_table), Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                match base_table.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_table.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_nested_tables() {
        let mut base: Value = toml::from_str("[model]\nprovider = \"anthropic\"\nmax_tokens = 4096\n").unwrap();
        let overlay: Value = toml::from_str("[model]\nmax_tokens = 8192\n").unwrap();

        deep_merge(&mut base, &overlay);

        assert_eq!(base["model"]["provider"].as_str(), Some("anthropic"));
        assert_eq!(base["model"]["max_tokens"].as_integer(), Some(8192));
    }

    #[test]
    fn overlay_scalar_replaces_base_scalar() {
        let mut base: Value = Value::Integer(1);
        let overlay = Value::Integer(2);
        deep_merge(&mut base, &overlay);
        assert_eq!(base, Value::Integer(2));
    }

    #[test]
    fn overlay_introduces_new_keys() {
        let mut base: Value = toml::from_str("a = 1\n").unwrap();
        let overlay: Value = toml::from_str("b = 2\n").unwrap();
        deep_merge(&mut base, &overlay);
        assert_eq!(base["a"].as_integer(), Some(1));
        assert_eq!(base["b"].as_integer(), Some(2));
    }
}
