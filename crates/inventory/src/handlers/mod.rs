//! Event subscribers registered at assembly.

pub mod audit;
pub mod cache_invalidation;
pub mod metrics;
pub mod notification;

pub use audit::{AuditEntry, AuditLogHandler, AuditSink, InMemoryAuditSink};
pub use cache_invalidation::{CacheInvalidationHandler, InMemoryQueryCache, QueryCache};
pub use self::metrics::MetricsHandler;
pub use notification::{InMemoryNotifier, Notification, NotificationHandler, Notifier};
