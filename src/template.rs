//! Reply-text substitution.
//!
//! Configured reply strings may reference session state with `${slot.name}`
//! and `${params.name}`, plus the reserved `${_user_says}` and
//! `${_robot_code}` placeholders.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

use crate::nlu::UNK;

/// The state a reply template may reference.
pub struct RenderScope<'a> {
    pub slots: &'a HashMap<String, String>,
    pub params: &'a HashMap<String, Value>,
    pub user_says: &'a str,
    pub robot_code: &'a str,
}

fn param_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitute every placeholder in `content`; unknown references render as
/// the `unknown` marker, never as an error.
pub fn render(content: &str, scope: &RenderScope<'_>) -> String {
    let slot_re = Regex::new(r"\$\{slot\.(.*?)\}").unwrap();
    let params_re = Regex::new(r"\$\{params\.(.*?)\}").unwrap();

    let content = slot_re.replace_all(content, |caps: &regex::Captures<'_>| {
        scope
            .slots
            .get(&caps[1])
            .cloned()
            .unwrap_or_else(|| UNK.to_string())
    });
    let content = params_re.replace_all(&content, |caps: &regex::Captures<'_>| {
        scope
            .params
            .get(&caps[1])
            .map(param_string)
            .unwrap_or_else(|| UNK.to_string())
    });
    content
        .replace("${_user_says}", scope.user_says)
        .replace("${_robot_code}", scope.robot_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_slots_and_params() {
        let slots = HashMap::from([("plate_number".to_string(), "粤A23456".to_string())]);
        let params = HashMap::from([("city".to_string(), json!("广州"))]);
        let scope = RenderScope {
            slots: &slots,
            params: &params,
            user_says: "帮我挪车",
            robot_code: "bot-1",
        };
        let out = render(
            "车牌${slot.plate_number}已在${params.city}登记，您说：${_user_says}",
            &scope,
        );
        assert_eq!(out, "车牌粤A23456已在广州登记，您说：帮我挪车");
    }

    #[test]
    fn unknown_reference_renders_marker() {
        let (slots, params) = Default::default();
        let scope = RenderScope {
            slots: &slots,
            params: &params,
            user_says: "",
            robot_code: "bot-1",
        };
        assert_eq!(render("${slot.missing}", &scope), "unknown");
    }

    #[test]
    fn numeric_param_is_stringified() {
        let slots = HashMap::new();
        let params = HashMap::from([("vip_level".to_string(), json!(3))]);
        let scope = RenderScope {
            slots: &slots,
            params: &params,
            user_says: "",
            robot_code: "bot-1",
        };
        assert_eq!(render("等级${params.vip_level}", &scope), "等级3");
    }
}
