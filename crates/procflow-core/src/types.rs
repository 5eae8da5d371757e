use serde_json::Value;
use std::collections::HashMap;

/// Variable bindings of an instance or task
///
/// Keys are variable names, values are dynamically typed JSON values used
/// for decision conditions and context substitution.
pub type Variables = HashMap<String, Value>;

/// Render a variable value the way decision conditions compare it.
///
/// Strings render without quotes, everything else uses its JSON text
/// (`0`, `1.5`, `true`, `null`, `[1,2]`).
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Merge `updates` into `target`, later values overwriting earlier ones.
#[inline]
pub fn merge_variables(target: &mut Variables, updates: &Variables) {
    for (name, value) in updates {
        target.insert(name.clone(), value.clone());
    }
}

/// Build a variable map from `(name, value)` pairs
pub fn variables<I, K>(pairs: I) -> Variables
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("0")), "0");
        assert_eq!(display_value(&json!(0)), "0");
        assert_eq!(display_value(&json!(1)), "1");
        assert_eq!(display_value(&json!(true)), "true");
        assert_eq!(display_value(&Value::Null), "null");
    }

    #[test]
    fn test_merge_variables() {
        let mut target = variables([("a", json!(1)), ("b", json!("x"))]);
        let updates = variables([("b", json!("y")), ("c", json!(false))]);

        merge_variables(&mut target, &updates);

        assert_eq!(target.len(), 3);
        assert_eq!(target["a"], json!(1));
        assert_eq!(target["b"], json!("y"));
        assert_eq!(target["c"], json!(false));
    }
}
