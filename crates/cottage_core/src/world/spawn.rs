//! Random entity spawner, usable as a maintenance tick trigger.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::world::{EntityDraft, SharedWorld, TickTrigger};

const FOODS: &[(&str, u32)] = &[("apple", 20), ("bread", 35), ("carrot", 15), ("cheese", 30)];
const TOOLS: &[&str] = &["hammer", "rope", "basket", "lantern"];
const PLANTS: &[&str] = &["fern", "tomato seedling", "rosemary", "sunflower"];

/// Produce one random unowned entity draft placed in one of `locations`.
pub fn random_entity(locations: &[String]) -> Option<EntityDraft> {
    if locations.is_empty() {
        return None;
    }
    let mut rng = rand::thread_rng();
    let location = locations.choose(&mut rng)?.clone();

    let draft = match rng.gen_range(0..3) {
        0 => {
            let (name, hunger) = *FOODS.choose(&mut rng)?;
            EntityDraft::new("food").with_data(serde_json::json!({
                "type": "food",
                "name": name,
                "hungerValue": hunger,
            }))
        }
        1 => {
            let name = *TOOLS.choose(&mut rng)?;
            EntityDraft::new("tool").with_data(serde_json::json!({
                "type": "tool",
                "name": name,
            }))
        }
        _ => {
            let name = *PLANTS.choose(&mut rng)?;
            EntityDraft::new("plant").with_data(serde_json::json!({
                "type": "plant",
                "name": name,
                "growth": 0,
            }))
        }
    };
    Some(draft.at(location))
}

/// Tick trigger that registers one random entity every `every_ticks` ticks.
pub fn spawn_trigger(locations: Vec<String>, every_ticks: u64) -> TickTrigger {
    let every = every_ticks.max(1);
    Box::new(move |world: &SharedWorld, tick: u64| {
        if tick % every != 0 {
            return;
        }
        if let Some(draft) = random_entity(&locations) {
            let entity = world.register_entity(draft, None);
            tracing::debug!(
                entity_id = %entity.id,
                kind = %entity.kind,
                location = ?entity.location,
                "spawned a new entity"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_entity_lands_in_a_known_location() {
        let locations = vec!["kitchen".to_string(), "garden".to_string()];
        for _ in 0..20 {
            let draft = random_entity(&locations).unwrap();
            assert!(locations.contains(draft.location.as_ref().unwrap()));
            assert!(draft.owned_by.is_none());
            assert!(matches!(draft.kind.as_str(), "food" | "tool" | "plant"));
        }
    }

    #[test]
    fn no_locations_means_no_spawn() {
        assert!(random_entity(&[]).is_none());
    }

    #[test]
    fn trigger_respects_its_interval() {
        let world = SharedWorld::new();
        let trigger = spawn_trigger(vec!["garden".to_string()], 3);
        for tick in 1..=6 {
            trigger(&world, tick);
        }
        assert_eq!(world.entity_count(), 2);
    }
}
