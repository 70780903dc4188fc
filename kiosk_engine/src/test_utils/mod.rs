//! In-memory doubles for the storage and gateway seams, used by unit and integration tests.
mod memory;
mod mock_gateway;

pub use memory::{MemoryDatabase, MemoryUnitOfWork};
pub use mock_gateway::MockGateway;
