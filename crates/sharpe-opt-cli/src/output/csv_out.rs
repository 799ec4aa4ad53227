use serde_json::Value;
use std::io;

use super::{flatten_fields, format_scalar};

/// Write the result as two-column `field,value` CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let fields = match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Object(result)) => flatten_fields(result),
            _ => flatten_fields(map),
        },
        _ => vec![("value".to_string(), value.clone())],
    };

    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in fields {
        let _ = wtr.write_record([key, format_scalar(&val)]);
    }
    let _ = wtr.flush();
}
