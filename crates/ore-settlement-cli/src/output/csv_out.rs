use serde_json::{Map, Value};
use std::io;

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout.
///
/// A payment or preview with per-lot lines is written as one row per lot;
/// other objects become two-column field/value records.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => {
            let body = match map.get("result") {
                Some(Value::Object(result)) => result,
                _ => map,
            };
            match body.get("lines") {
                Some(Value::Array(lines)) if !lines.is_empty() => write_lines_csv(&mut wtr, lines),
                _ => write_fields_csv(&mut wtr, body),
            }
        }
        Value::Array(arr) => {
            write_array_csv(&mut wtr, arr);
        }
        _ => {
            let _ = wtr.write_record([&format_csv_value(value)]);
        }
    }

    let _ = wtr.flush();
}

fn write_fields_csv(wtr: &mut StdoutWriter<'_>, map: &Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
    }
}

fn write_lines_csv(wtr: &mut StdoutWriter<'_>, lines: &[Value]) {
    let _ = wtr.write_record([
        "lot_id",
        "category",
        "net_weight",
        "assay_percentage",
        "total_amount",
        "total_charge",
        "net_amount",
    ]);
    for line in lines {
        let field = |key: &str| line.get(key).map(format_csv_value).unwrap_or_default();
        let settled = |key: &str| {
            line.get("settlement")
                .and_then(|s| s.get(key))
                .map(format_csv_value)
                .unwrap_or_default()
        };
        let _ = wtr.write_record([
            field("lot_id"),
            field("category"),
            field("net_weight"),
            field("assay_percentage"),
            settled("total_amount"),
            settled("total_charge"),
            settled("net_amount"),
        ]);
    }
}

fn write_array_csv(wtr: &mut StdoutWriter<'_>, arr: &[Value]) {
    if arr.is_empty() {
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        let _ = wtr.write_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                    .collect();
                let _ = wtr.write_record(&row);
            }
        }
    } else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
