//! Deterministic decision steps for the demo agents.
//!
//! Each agent plays a fixed script of plans and finishes with a closing
//! line. The decision trait is the boundary where a model-backed step
//! would plug in instead.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use cottage_core::context::Action;
use cottage_core::error::Result;
use cottage_core::runtime::{Decision, DecisionStep, DecisionView};
use parking_lot::Mutex;
use serde_json::json;

pub struct ScriptedDecision {
    plans: Mutex<VecDeque<Vec<Action>>>,
    closing_line: String,
}

impl ScriptedDecision {
    pub fn new(plans: Vec<Vec<Action>>, closing_line: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            plans: Mutex::new(plans.into()),
            closing_line: closing_line.into(),
        })
    }
}

#[async_trait]
impl DecisionStep for ScriptedDecision {
    async fn decide(&self, view: DecisionView<'_>) -> Result<Decision> {
        match self.plans.lock().pop_front() {
            Some(plan) => {
                tracing::debug!(agent_id = view.agent_id, cycle = view.cycle, "next scripted plan");
                Ok(Decision::Plan(plan))
            }
            None => Ok(Decision::Respond(self.closing_line.clone())),
        }
    }
}

fn action(operation: &str, parameters: serde_json::Value) -> Action {
    Action::new(operation, parameters)
}

/// The chef finds breakfast in the kitchen and tells everyone about it.
pub fn chef() -> Arc<ScriptedDecision> {
    ScriptedDecision::new(
        vec![
            vec![
                action("world:move_to", json!({"location": "kitchen"})),
                action("world:explore", json!({"type": "food"})),
            ],
            vec![
                action("world:claim", json!({"entity_id": "apple_1"})),
                action("world:consume", json!({"entity_id": "apple_1"})),
            ],
            vec![
                action("world:broadcast", json!({"content": "Breakfast is handled, the green apple is up for grabs."})),
                action("world:check_quota", json!({})),
            ],
        ],
        "Kitchen is in order.",
    )
}

/// The gardener tends the garden and plants something new.
pub fn gardener() -> Arc<ScriptedDecision> {
    ScriptedDecision::new(
        vec![
            vec![
                action("world:move_to", json!({"location": "garden"})),
                action("world:claim", json!({"entity_id": "plant_1"})),
                action("world:claim", json!({"entity_id": "watering_can_1"})),
            ],
            vec![
                action(
                    "world:create_entity",
                    json!({"type": "plant", "name": "tomato seedling", "data": {"growth": 0}}),
                ),
                action("add_permanent_memory", json!({"content": "Planted a tomato seedling in the garden."})),
            ],
            vec![action(
                "world:send_message",
                json!({"to": "chef", "content": "Tomatoes are coming, give it a few days."}),
            )],
        ],
        "The garden will take care of the rest.",
    )
}

/// The keeper sets up the bedroom and shares the house tools.
pub fn keeper() -> Arc<ScriptedDecision> {
    ScriptedDecision::new(
        vec![
            vec![
                action("world:move_to", json!({"location": "bedroom"})),
                action("world:claim", json!({"entity_id": "bed_1"})),
            ],
            vec![
                action(
                    "world:create_entity",
                    json!({"type": "furniture", "name": "reading chair"}),
                ),
                action("world:explore", json!({"location": "kitchen", "type": "tool"})),
            ],
            vec![action("world:check_quota", json!({"category": "furniture"}))],
        ],
        "The house is tidy.",
    )
}
