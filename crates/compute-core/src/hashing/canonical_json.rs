//! Canonical JSON: claves ordenadas lexicográficamente en todos los niveles y
//! sin espacios. El orden de campos del objeto fuente no afecta al resultado.

use serde_json::Value;
use std::collections::BTreeMap;

/// Serializa un `Value` a su forma canónica.
pub fn to_canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(arr) => {
            out.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let tree: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (k, v)) in tree.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Display de Value produce JSON compacto (con escapes) y no falla.
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
