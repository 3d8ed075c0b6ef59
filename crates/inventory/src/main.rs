//! Runs the inventory core against in-memory collaborators and prints the
//! resulting metrics.

use std::sync::Arc;

use equipment::{EquipmentPatch, InMemoryEquipmentRepository, InMemorySequenceGenerator, NewEquipment};
use inventory::handlers::{InMemoryAuditSink, InMemoryNotifier, InMemoryQueryCache};
use inventory::{Collaborators, Config, Inventory, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Configuration and telemetry
    let config = Config::from_env();
    telemetry::init(&config)?;
    let metrics_handle = telemetry::install_metrics_recorder()?;

    // 2. In-memory collaborators
    let repository = InMemoryEquipmentRepository::new();
    let audit = InMemoryAuditSink::new();
    let notifier = InMemoryNotifier::new();
    let collaborators = Collaborators {
        cache: Arc::new(InMemoryQueryCache::new()),
        audit: Arc::new(audit.clone()),
        notifier: Arc::new(notifier.clone()),
    };

    // 3. Assemble
    let inventory = Inventory::assemble(
        &config,
        Arc::new(repository.clone()),
        Arc::new(InMemorySequenceGenerator::starting_at(1000)),
        collaborators,
    );
    let actor = inventory.system_actor().clone();
    let commands = inventory.commands();

    // 4. Exercise each command
    let id = commands
        .add(&actor, NewEquipment::new("Forklift", "FL-001").with_location("Dock 1"))
        .await?;
    commands
        .update(&actor, id, EquipmentPatch::new().location(Some("Dock 4".to_string())))
        .await?;
    let (deployed, sequence_number) = commands
        .deploy(&actor, NewEquipment::new("Generator", "GEN-7"))
        .await?;
    tracing::info!(equipment_id = %deployed, sequence_number, "deployed");

    let batch = vec![
        NewEquipment::new("Drill", "DR-1"),
        NewEquipment::new("Drill", "DR-2"),
    ];
    commands.bulk_add(&actor, batch).await?;

    // Duplicate serial: the saga rolls back the first insert.
    let rejected = vec![
        NewEquipment::new("Saw", "SW-1"),
        NewEquipment::new("Saw", "DR-1"),
    ];
    if let Err(error) = commands.bulk_add(&actor, rejected).await {
        tracing::warn!(%error, "bulk add rolled back");
    }
    if let Err(error) = commands.add(&actor, NewEquipment::new("", "X-1")).await {
        tracing::warn!(%error, "add rejected");
    }
    commands.delete(&actor, id).await?;

    tracing::info!(
        records = repository.record_count(),
        audit_entries = audit.len(),
        notifications = notifier.sent().len(),
        breaker = %inventory.repository_breaker_state().as_str(),
        "demo finished"
    );

    println!("{}", metrics_handle.render());
    Ok(())
}
