//! Sequential required-slot collection.
//!
//! The cursor walks the configured slot list and never moves backwards. Each
//! turn runs builtin extraction, then a forced-intent probe (the user can
//! jump out of slot filling into another branch), then the extraction
//! attempt itself.

use serde_json::json;

use crate::error::{FlowError, FlowResult};
use crate::graph::{NodeKind, NodeRef};
use crate::nlu::{Understanding, UNK};
use crate::nodes::iterator::{ForwardIter, Step};
use crate::nodes::utils::choose;
use crate::nodes::{conn_trace, resolve};
use crate::session::FlowCtx;

#[derive(Debug)]
pub struct FillSlotsIter {
    node: NodeRef,
    cursor: usize,
    retries: u32,
    state: u8,
    probe: Option<ForwardIter>,
}

impl FillSlotsIter {
    pub(crate) fn new(node: NodeRef) -> Self {
        FillSlotsIter {
            node,
            cursor: 0,
            retries: 0,
            state: 0,
            probe: None,
        }
    }

    pub(crate) async fn advance(&mut self, ctx: &mut FlowCtx<'_>) -> FlowResult<Step> {
        let env = ctx.env;
        let node = resolve(env, &self.node)?;
        let NodeKind::FillSlots(config) = &node.kind else {
            return Err(FlowError::runtime(&node.name, "not a fill-slots node"));
        };

        match self.state {
            // Probe: builtin extraction for the pending slot, then let a
            // forced intent check run before committing to it.
            0 => {
                if self.cursor >= config.slots.len() {
                    if let Some(child) = node.default_child {
                        ctx.session.push_trace(conn_trace(
                            env,
                            &self.node.graph_id,
                            node,
                            child,
                            "default",
                        ));
                        return Ok(Step::Goto(NodeRef::new(
                            self.node.graph_id.clone(),
                            child,
                        )));
                    }
                    return Ok(Step::End);
                }
                let slot = &config.slots[self.cursor];
                let ability = ctx.session.ability_for_slot(&slot.slot_name);
                if let Some(msg) = ctx.session.latest_msg_mut() {
                    env.collab
                        .interpreter
                        .extract_ability(msg, &ability)
                        .await?;
                }
                self.probe = Some(ForwardIter::new(self.node.clone(), 0, false));
                self.state = 1;
                Ok(Step::Continue)
            }
            _ => {
                if let Some(probe) = self.probe.as_mut() {
                    match probe.advance(ctx).await? {
                        Step::End => {
                            self.probe = None;
                        }
                        // The user jumped out mid-fill.
                        other => {
                            self.probe = None;
                            return Ok(other);
                        }
                    }
                }

                let slot = &config.slots[self.cursor];
                let ability = ctx.session.ability_for_slot(&slot.slot_name);
                let extracted = ctx
                    .session
                    .latest_msg()
                    .abilities
                    .get(&ability)
                    .and_then(|values| values.first())
                    .cloned();

                if let Some(value) = extracted {
                    ctx.session
                        .fill_slot(&slot.slot_name, &value, slot.alias(), slot.warning);
                    ctx.session.update_trace(
                        "info",
                        json!({"name": slot.slot_name, "value": value, "ability": ability}),
                    );
                    self.cursor += 1;
                    self.retries = 0;
                    self.state = 0;
                    Ok(Step::Continue)
                } else if self.retries >= slot.rounds && !slot.is_necessary {
                    // Optional slot ran out of re-asks: fill the marker and
                    // keep going.
                    ctx.session
                        .fill_slot(&slot.slot_name, UNK, slot.alias(), slot.warning);
                    ctx.session.update_trace(
                        "info",
                        json!({"name": slot.slot_name, "value": UNK, "ability": "auto-filled after exhausting re-asks"}),
                    );
                    self.cursor += 1;
                    self.retries = 0;
                    self.state = 0;
                    Ok(Step::Continue)
                } else {
                    let reask = choose(&slot.reask_words).unwrap_or_default().to_string();
                    if let Some(msg) = ctx.session.latest_msg_mut() {
                        msg.understanding = Understanding::SlotMiss;
                    }
                    self.retries += 1;
                    self.state = 0;
                    Ok(Step::Reply(reask))
                }
            }
        }
    }

    /// Where the cursor currently sits; exposed for observability.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
