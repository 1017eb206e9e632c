//! Initial cottage state: a few household entities and per-agent quotas.

use std::sync::Arc;

use cottage_core::id::AgentId;
use cottage_core::policy::QuotaTracker;
use cottage_core::world::{EntityDraft, SharedWorld};
use serde_json::json;

pub const LOCATIONS: [&str; 3] = ["kitchen", "garden", "bedroom"];

pub fn seed_entities(world: &Arc<SharedWorld>) {
    let drafts = [
        EntityDraft::new("food")
            .with_id("apple_1")
            .with_data(json!({"type": "food", "name": "red apple", "hungerValue": 20}))
            .at("kitchen"),
        EntityDraft::new("food")
            .with_id("apple_2")
            .with_data(json!({"type": "food", "name": "green apple", "hungerValue": 15}))
            .at("kitchen"),
        EntityDraft::new("tool")
            .with_id("knife_1")
            .with_data(json!({"type": "tool", "name": "kitchen knife"}))
            .at("kitchen"),
        EntityDraft::new("tool")
            .with_id("watering_can_1")
            .with_data(json!({"type": "tool", "name": "watering can"}))
            .at("garden"),
        EntityDraft::new("plant")
            .with_id("plant_1")
            .with_data(json!({"type": "plant", "name": "potted basil", "growth": 40}))
            .at("garden"),
        EntityDraft::new("furniture")
            .with_id("bed_1")
            .with_data(json!({"type": "furniture", "name": "wooden bed"}))
            .at("bedroom"),
    ];
    for draft in drafts {
        world.register_entity(draft, None);
    }
}

pub fn seed_quotas(quotas: &QuotaTracker) {
    let table: [(&str, &[(&str, u32)]); 3] = [
        ("chef", &[("food", 3), ("tool", 2)]),
        ("gardener", &[("plant", 3), ("tool", 2)]),
        ("keeper", &[("furniture", 2), ("other", 2)]),
    ];
    for (agent, limits) in table {
        quotas.set_limits(
            &AgentId::new(agent),
            limits.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        );
    }
}
