pub mod memory;
pub mod pool;
pub mod postgres;
pub mod store;

pub use memory::{InMemoryAttemptStore, InMemoryTestStore};
pub use postgres::PgStore;
pub use store::{AttemptSessionStore, TestDefinitionStore};
