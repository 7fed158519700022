//! In-memory store clients
//!
//! Stand-ins for the remote services that evaluate the expressions and SQL
//! the adapters send. They record every request and can inject failures
//! and latency, which makes them the backbone of the test suites.

mod eval;

pub mod cosmos;
pub mod dynamodb;

pub use cosmos::{CosmosRequest, MemoryCosmosClient};
pub use dynamodb::{DynamoRequest, MemoryDynamoClient};
