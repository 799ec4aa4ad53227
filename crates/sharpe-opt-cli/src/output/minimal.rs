use serde_json::Value;

use super::format_scalar;

/// Print the allocation as `ASSET weight` lines followed by the Sharpe ratio.
///
/// Falls back to the first result field when there is no allocation.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let Value::Object(map) = result else {
        println!("{}", format_scalar(result));
        return;
    };

    if let Some(Value::Object(allocations)) = map.get("allocations") {
        for (asset, weight) in allocations {
            println!("{} {}", asset, format_scalar(weight));
        }
        if let Some(sharpe) = map.get("sharpe_ratio").filter(|v| !v.is_null()) {
            println!("sharpe_ratio {}", format_scalar(sharpe));
        }
        return;
    }

    if let Some((key, val)) = map.iter().next() {
        println!("{}: {}", key, format_scalar(val));
    }
}
