//! Equipment inventory: commands, event subscribers and their wiring.
//!
//! [`Inventory::assemble`] builds the whole graph explicitly. The repository
//! is wrapped in a circuit breaker and retry policy, the four subscribers are
//! registered once on a fresh dispatcher, and the resulting
//! [`EquipmentCommands`] is ready to use.

pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod telemetry;

use std::sync::Arc;

use common::ActorId;
use equipment::{EquipmentRepository, ResilientRepository, SequenceGenerator};
use events::{EventDispatcher, EventKind};
use resilience::{BreakerState, CircuitBreaker};

pub use commands::EquipmentCommands;
pub use config::{Config, LogFormat};
pub use error::CommandError;

use handlers::{
    AuditLogHandler, AuditSink, CacheInvalidationHandler, MetricsHandler, NotificationHandler,
    Notifier, QueryCache,
};

/// External services the subscribers write to.
#[derive(Clone)]
pub struct Collaborators {
    pub cache: Arc<dyn QueryCache>,
    pub audit: Arc<dyn AuditSink>,
    pub notifier: Arc<dyn Notifier>,
}

/// The assembled inventory.
#[derive(Clone)]
pub struct Inventory {
    commands: EquipmentCommands,
    dispatcher: EventDispatcher,
    breaker: CircuitBreaker,
    system_actor: ActorId,
}

impl Inventory {
    /// Wires commands, dispatcher and subscribers from `config`.
    pub fn assemble(
        config: &Config,
        repository: Arc<dyn EquipmentRepository>,
        sequence: Arc<dyn SequenceGenerator>,
        collaborators: Collaborators,
    ) -> Self {
        let breaker = CircuitBreaker::new("equipment_repository", config.breaker);
        let repository: Arc<dyn EquipmentRepository> = Arc::new(ResilientRepository::new(
            repository,
            breaker.clone(),
            config.retry,
        ));

        let dispatcher = EventDispatcher::new();
        dispatcher.register_all(
            &CacheInvalidationHandler::KINDS,
            Arc::new(CacheInvalidationHandler::new(collaborators.cache)),
        );
        dispatcher.register_all(
            &EventKind::ALL,
            Arc::new(AuditLogHandler::new(collaborators.audit)),
        );
        dispatcher.register_all(&EventKind::ALL, Arc::new(MetricsHandler::new()));
        dispatcher.register_all(
            &NotificationHandler::KINDS,
            Arc::new(NotificationHandler::new(collaborators.notifier)),
        );
        tracing::info!(
            handlers = EventKind::ALL
                .iter()
                .map(|kind| dispatcher.handler_count(*kind))
                .sum::<usize>(),
            "event subscribers registered"
        );

        let commands = EquipmentCommands::new(repository, sequence, dispatcher.clone());
        Self {
            commands,
            dispatcher,
            breaker,
            system_actor: ActorId::new(config.system_actor.clone()),
        }
    }

    pub fn commands(&self) -> &EquipmentCommands {
        &self.commands
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Actor recorded on changes the system makes on its own behalf.
    pub fn system_actor(&self) -> &ActorId {
        &self.system_actor
    }

    /// State of the breaker guarding the repository.
    pub fn repository_breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }
}
