use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{flatten_fields, format_scalar};

/// Format output as a table using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Object(result)) => print_result_table(result, map),
            _ => print_fields(map),
        },
        _ => println!("{}", value),
    }
}

fn print_result_table(result: &Map<String, Value>, envelope: &Map<String, Value>) {
    // Weights first, one row per asset
    if let Some(Value::Object(allocations)) = result.get("allocations") {
        let mut builder = Builder::default();
        builder.push_record(["Asset", "Weight"]);
        for (asset, weight) in allocations {
            builder.push_record([asset.as_str(), &format_scalar(weight)]);
        }
        println!("{}", Table::from(builder));
        println!();
    }

    let rest: Map<String, Value> = result
        .iter()
        .filter(|(k, _)| k.as_str() != "allocations")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    print_fields(&rest);

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_fields(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in flatten_fields(map) {
        builder.push_record([key, format_scalar(&val)]);
    }
    println!("{}", Table::from(builder));
}
