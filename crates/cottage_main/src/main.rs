//! Demo cottage: three scripted agents sharing a small world.

mod scripted;
mod seed;

use std::sync::Arc;
use std::time::Duration;

use cottage_core::config::CottageConfig;
use cottage_core::policy::{BorrowLedger, QuotaTracker};
use cottage_core::resource::ResourceManager;
use cottage_core::runtime::{AgentRuntime, DecisionStep, ExecutorRegistry, MetaToolExecutor};
use cottage_core::tool::ToolCatalog;
use cottage_core::toolkit::WorldToolkit;
use cottage_core::world::{self, SharedWorld};
use futures::future::join_all;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> miette::Result<()> {
    miette::set_panic_hook();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = CottageConfig::default();
    config.world.locations = seed::LOCATIONS.iter().map(|s| s.to_string()).collect();
    config.world.spawn_interval_ticks = 50;
    config.validate()?;

    let world = SharedWorld::new();
    let resources = Arc::new(ResourceManager::new());
    let quotas = Arc::new(QuotaTracker::new());
    let borrows = Arc::new(BorrowLedger::new());

    seed::seed_entities(&world);
    seed::seed_quotas(&quotas);

    let toolkit = Arc::new(WorldToolkit::new(
        world.clone(),
        quotas,
        borrows.clone(),
        config.world.locations.clone(),
    ));
    let mut registry = ExecutorRegistry::new();
    registry.register_default(Arc::new(MetaToolExecutor));
    registry.register("world", toolkit);

    let mut catalog = ToolCatalog::new();
    catalog.extend(WorldToolkit::catalog());
    catalog.extend(MetaToolExecutor::catalog());
    let catalog = Arc::new(catalog);

    // Background maintenance: sweep expired leases, occasionally spawn a
    // new entity somewhere in the house.
    let sweep_borrows = borrows.clone();
    world::tick::start_maintenance(
        &world,
        Duration::from_millis(config.world.tick_interval_ms),
        vec![
            Box::new(move |_, _| {
                let swept = sweep_borrows.sweep_expired(chrono_now());
                if swept > 0 {
                    tracing::debug!(swept, "expired borrow leases cleaned up");
                }
            }),
            world::spawn::spawn_trigger(
                config.world.locations.clone(),
                config.world.spawn_interval_ticks,
            ),
        ],
    );

    let agents: Vec<(&str, Arc<dyn DecisionStep>)> = vec![
        ("chef", scripted::chef()),
        ("gardener", scripted::gardener()),
        ("keeper", scripted::keeper()),
    ];
    let mut tasks = Vec::new();
    for (name, decision) in agents {
        let mut runtime = AgentRuntime::builder()
            .agent_id(name)
            .world(world.clone())
            .decision(decision)
            .registry(registry.clone())
            .catalog(catalog.clone())
            .resources(resources.clone())
            .config(config.runtime.clone())
            .build()
            .into_diagnostic()?;
        tasks.push(tokio::spawn(async move {
            match runtime.start().await {
                Ok(outcome) => {
                    tracing::info!(
                        agent_id = %runtime.context().agent_id(),
                        status = ?outcome.status,
                        cycles = outcome.cycles,
                        response = outcome.response.as_deref().unwrap_or(""),
                        "agent finished"
                    );
                }
                Err(err) => {
                    tracing::error!(error = %err, "agent run failed");
                }
            }
        }));
    }

    // Periodic world snapshot while the agents live their day.
    let snapshot_world = world.clone();
    let monitor = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(2));
        loop {
            ticker.tick().await;
            if !snapshot_world.is_running() {
                break;
            }
            let snapshot = snapshot_world.snapshot();
            tracing::info!(
                agents = snapshot.agent_count,
                entities = snapshot.entity_count,
                owned = snapshot.owned_entities,
                by_location = ?snapshot.entities_by_location,
                "world snapshot"
            );
        }
    });

    tokio::select! {
        _ = join_all(tasks) => {
            tracing::info!("all agents finished their day");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting the cottage down");
        }
    }

    world.shutdown();
    resources.shutdown();
    monitor.abort();
    Ok(())
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
