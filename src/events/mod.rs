//! Domain events written through a transactional outbox.

pub mod outbox;
pub mod publisher;
pub mod types;

pub use outbox::OutboxService;
pub use publisher::{create_redis_pool, EventPublisher, EventPublisherBuilder, PublisherHandle};
pub use types::*;
