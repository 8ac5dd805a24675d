use serde_json::Value;

use crate::dsl::Operator;

/// Evaluate `source <operator> target`.
///
/// String operators coerce both sides to string; numeric operators require
/// both sides to parse as numbers. A list target is the logical OR over its
/// elements. Errors carry a bare reason; callers attach node context.
pub fn evaluate(source: &str, target: &Value, op: Operator) -> Result<bool, String> {
    if let Value::Array(items) = target {
        for item in items {
            if evaluate(source, item, op)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    match op {
        Operator::Eq => Ok(source == target_string(target)),
        Operator::Ne => Ok(source != target_string(target)),
        // The source is contained in the target.
        Operator::Like => Ok(target_string(target).contains(source)),
        Operator::IsNull => Ok(source.is_empty()),
        Operator::NotNull => Ok(!source.is_empty()),
        Operator::Gt => numeric(source, target, |a, b| a > b),
        Operator::Lt => numeric(source, target, |a, b| a < b),
        Operator::Ge => numeric(source, target, |a, b| a >= b),
        Operator::Le => numeric(source, target, |a, b| a <= b),
        Operator::LenGt => length(source, target, |a, b| a > b),
        Operator::LenLt => length(source, target, |a, b| a < b),
        Operator::LenEq => length(source, target, |a, b| a == b),
    }
}

fn target_string(target: &Value) -> String {
    match target {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn target_f64(target: &Value) -> Option<f64> {
    match target {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn numeric(source: &str, target: &Value, cmp: impl Fn(f64, f64) -> bool) -> Result<bool, String> {
    let lhs = source
        .parse::<f64>()
        .map_err(|_| format!("numeric operator applied to non-numeric value `{source}`"))?;
    let rhs = target_f64(target)
        .ok_or_else(|| format!("numeric operator applied to non-numeric target {target}"))?;
    Ok(cmp(lhs, rhs))
}

fn length(
    source: &str,
    target: &Value,
    cmp: impl Fn(usize, usize) -> bool,
) -> Result<bool, String> {
    let rhs = target_f64(target)
        .map(|f| f as usize)
        .ok_or_else(|| format!("length operator applied to non-numeric target {target}"))?;
    Ok(cmp(source.chars().count(), rhs))
}
