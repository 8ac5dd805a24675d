//! External function call: substitute session state into the request, map
//! response fields back into slots.

use serde_json::{json, Value};
use std::collections::HashMap;

use crate::dsl::HttpMethod;
use crate::error::{FlowError, FlowResult};
use crate::graph::{NodeKind, NodeRef};
use crate::nlu::Understanding;
use crate::nodes::iterator::Step;
use crate::nodes::{conn_trace, resolve};
use crate::session::state_tracker::DialogStatus;
use crate::session::FlowCtx;

/// Reserved response field: the endpoint asks the node to emit an
/// intermediate message and call again.
const REPEAT_FIELD: &str = "__repeat";
/// Reserved response field: the endpoint reports whether it understood.
const UNDERSTANDING_FIELD: &str = "understanding";

#[derive(Debug)]
pub struct RpcIter {
    node: NodeRef,
    repeats_left: u32,
}

impl RpcIter {
    pub(crate) fn new(node: NodeRef) -> Self {
        // The repeat protocol is bounded: at most one extra round trip.
        RpcIter {
            node,
            repeats_left: 1,
        }
    }

    pub(crate) async fn advance(&mut self, ctx: &mut FlowCtx<'_>) -> FlowResult<Step> {
        let env = ctx.env;
        let node = resolve(env, &self.node)?;
        let NodeKind::Rpc(config) = &node.kind else {
            return Err(FlowError::runtime(&node.name, "not an rpc node"));
        };

        let params: HashMap<String, String> = config
            .params
            .iter()
            .map(|(key, value)| (key.clone(), ctx.session.render(value)))
            .collect();
        let data = match config.method {
            HttpMethod::Get => {
                env.collab
                    .rpc
                    .get(&config.url, &params, &config.headers)
                    .await?
            }
            HttpMethod::Post => {
                env.collab
                    .rpc
                    .post(&config.url, &params, &config.headers)
                    .await?
            }
        };

        if let Some(understood) = data.get(UNDERSTANDING_FIELD).and_then(Value::as_bool) {
            if let Some(msg) = ctx.session.latest_msg_mut() {
                msg.intent_confidence = if understood { 1.0 } else { 0.0 };
                if !understood {
                    msg.understanding = Understanding::FaqMiss;
                }
            }
            if !understood {
                ctx.session.is_end = true;
                ctx.session.dialog_status = DialogStatus::SystemTransfer;
            }
        }

        if data.get(REPEAT_FIELD).and_then(Value::as_bool).unwrap_or(false)
            && self.repeats_left > 0
        {
            self.repeats_left -= 1;
            let answer = data
                .get("answer")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Ok(Step::Reply(answer));
        }

        let mut filled = serde_json::Map::new();
        for spec in &config.slots {
            let value = data
                .get(&spec.response_field)
                .or_else(|| data.get("data").and_then(|d| d.get(&spec.response_field)))
                .cloned()
                .unwrap_or(Value::String(String::new()));
            let value_str = match &value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            let alias = spec.slot_alias.as_deref().unwrap_or(&spec.slot_name);
            ctx.session.fill_slot(&spec.slot_name, &value_str, alias, false);
            filled.insert(spec.slot_name.clone(), value);
        }

        ctx.session.update_trace("method", json!(format!("{:?}", config.method).to_uppercase()));
        ctx.session.update_trace("url", json!(config.url));
        ctx.session.update_trace("params", json!(params));
        ctx.session.update_trace("response", data);
        ctx.session.update_trace("slots", Value::Object(filled));

        match node.default_child {
            Some(child) => {
                ctx.session
                    .push_trace(conn_trace(env, &self.node.graph_id, node, child, "default"));
                Ok(Step::Goto(NodeRef::new(self.node.graph_id.clone(), child)))
            }
            None => Ok(Step::End),
        }
    }
}
