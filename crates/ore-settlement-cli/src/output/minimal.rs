use serde_json::Value;

/// Fields that answer each command, most specific first: a payment's
/// payable amount, a lot's net amount, then fee resolution and listings.
const PRIORITY_KEYS: [&str; 7] = [
    "payable_amount",
    "net_amount",
    "missing",
    "rra_rate",
    "lots",
    "total_amount",
    "id",
];

/// Print just the key answer value from the output.
///
/// Heuristic: look for well-known result fields in order of priority,
/// then fall back to the first field in the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Value::Array(rows) = result_obj {
        for row in rows {
            println!("{}", minimal_line(row));
        }
        return;
    }
    println!("{}", minimal_line(result_obj));
}

fn minimal_line(value: &Value) -> String {
    if let Value::Object(map) = value {
        for key in &PRIORITY_KEYS {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    return format_minimal(val);
                }
            }
        }
        if let Some((key, val)) = map.iter().next() {
            return format!("{}: {}", key, format_minimal(val));
        }
    }
    format_minimal(value)
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(items) => items.iter().map(format_minimal).collect::<Vec<_>>().join(","),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
