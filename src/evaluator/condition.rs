use serde_json::Value;
use std::collections::HashMap;

use crate::dsl::{ConditionClause, ConditionGroups, ConditionKind};
use crate::evaluator::operators::evaluate;

/// A read-only view of the session state a condition can reference.
///
/// Keeping this decoupled from the session types lets the evaluator be
/// exercised without a running session.
pub struct EvalScope<'a> {
    /// The latest message's resolved intent, if any.
    pub intent: Option<&'a str>,
    /// Ability name → values extracted from the latest message.
    pub abilities: &'a HashMap<String, Vec<String>>,
    pub slots: &'a HashMap<String, String>,
    pub params: &'a HashMap<String, Value>,
}

/// Evaluate a single clause against the scope.
pub fn judge_condition(scope: &EvalScope<'_>, clause: &ConditionClause) -> Result<bool, String> {
    match clause.kind {
        ConditionKind::Intent => evaluate(scope.intent.unwrap_or(""), &clause.value, clause.operator),
        ConditionKind::Entity => {
            let values = scope
                .abilities
                .get(&clause.name)
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            if values.is_empty() {
                return evaluate("", &clause.value, clause.operator);
            }
            // OR over everything the ability extracted.
            for value in values {
                if evaluate(value, &clause.value, clause.operator)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        ConditionKind::Global => {
            let source = scope.slots.get(&clause.name).map(|s| s.as_str()).unwrap_or("");
            evaluate(source, &clause.value, clause.operator)
        }
        ConditionKind::Params => {
            let source = match scope.params.get(&clause.name) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            evaluate(&source, &clause.value, clause.operator)
        }
    }
}

/// Branch-selection semantics shared by start triggers, judge nodes and
/// robot-say conditional content: true iff any group is fully true. An
/// empty group is vacuously true, so `[[]]` means "always".
pub fn judge_branch(scope: &EvalScope<'_>, groups: &ConditionGroups) -> Result<bool, String> {
    for group in groups {
        let mut all = true;
        for clause in group {
            if !judge_condition(scope, clause)? {
                all = false;
                break;
            }
        }
        if all {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::Operator;
    use serde_json::json;

    fn clause(kind: ConditionKind, name: &str, op: Operator, value: Value) -> ConditionClause {
        ConditionClause {
            kind,
            name: name.to_string(),
            operator: op,
            value,
        }
    }

    fn scope<'a>(
        intent: Option<&'a str>,
        abilities: &'a HashMap<String, Vec<String>>,
        slots: &'a HashMap<String, String>,
        params: &'a HashMap<String, Value>,
    ) -> EvalScope<'a> {
        EvalScope {
            intent,
            abilities,
            slots,
            params,
        }
    }

    #[test]
    fn intent_clause() {
        let (abilities, slots, params) = Default::default();
        let s = scope(Some("move_car"), &abilities, &slots, &params);
        let c = clause(ConditionKind::Intent, "", Operator::Eq, json!("move_car"));
        assert!(judge_condition(&s, &c).unwrap());
    }

    #[test]
    fn missing_intent_is_empty() {
        let (abilities, slots, params) = Default::default();
        let s = scope(None, &abilities, &slots, &params);
        let c = clause(ConditionKind::Intent, "", Operator::IsNull, Value::Null);
        assert!(judge_condition(&s, &c).unwrap());
    }

    #[test]
    fn entity_clause_ors_over_values() {
        let mut abilities = HashMap::new();
        abilities.insert(
            "city".to_string(),
            vec!["北京".to_string(), "广州".to_string()],
        );
        let (slots, params) = Default::default();
        let s = scope(None, &abilities, &slots, &params);
        let c = clause(ConditionKind::Entity, "city", Operator::Eq, json!("广州"));
        assert!(judge_condition(&s, &c).unwrap());
    }

    #[test]
    fn absent_ability_satisfies_is_null_only() {
        let (abilities, slots, params) = Default::default();
        let s = scope(None, &abilities, &slots, &params);
        assert!(judge_condition(
            &s,
            &clause(ConditionKind::Entity, "city", Operator::IsNull, Value::Null)
        )
        .unwrap());
        assert!(!judge_condition(
            &s,
            &clause(ConditionKind::Entity, "city", Operator::NotNull, Value::Null)
        )
        .unwrap());
    }

    #[test]
    fn global_slot_clause() {
        let mut slots = HashMap::new();
        slots.insert("plate_number".to_string(), "粤A23456".to_string());
        let (abilities, params) = Default::default();
        let s = scope(None, &abilities, &slots, &params);
        let c = clause(
            ConditionKind::Global,
            "plate_number",
            Operator::NotNull,
            Value::Null,
        );
        assert!(judge_condition(&s, &c).unwrap());
    }

    #[test]
    fn params_clause_numeric() {
        let mut params = HashMap::new();
        params.insert("vip_level".to_string(), json!(3));
        let (abilities, slots) = Default::default();
        let s = scope(None, &abilities, &slots, &params);
        let c = clause(ConditionKind::Params, "vip_level", Operator::Ge, json!(2));
        assert!(judge_condition(&s, &c).unwrap());
    }

    #[test]
    fn branch_is_or_of_ands() {
        let (abilities, slots, params) = Default::default();
        let s = scope(Some("move_car"), &abilities, &slots, &params);
        let groups = vec![
            // first group fails on the second clause
            vec![
                clause(ConditionKind::Intent, "", Operator::Eq, json!("move_car")),
                clause(ConditionKind::Intent, "", Operator::Eq, json!("repair")),
            ],
            // second group holds
            vec![clause(ConditionKind::Intent, "", Operator::Eq, json!("move_car"))],
        ];
        assert!(judge_branch(&s, &groups).unwrap());
    }

    #[test]
    fn no_groups_never_match_but_empty_group_is_vacuous() {
        let (abilities, slots, params) = Default::default();
        let s = scope(Some("x"), &abilities, &slots, &params);
        assert!(!judge_branch(&s, &vec![]).unwrap());
        assert!(judge_branch(&s, &vec![vec![]]).unwrap());
    }
}
