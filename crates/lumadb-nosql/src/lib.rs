//! # LumaDB NoSQL Query Bridge
//!
//! Typed data access over two NoSQL document store families:
//! - **DynamoDB-style** key-value tables (expression attributes, Scan/Query)
//! - **Cosmos-style** document containers (parameterized SQL over `c`)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Entity Repository                         │
//! │   findMany │ findOne │ create │ update │ delete              │
//! ├─────────────────────────────────────────────────────────────┤
//! │        Filter Model  →  Query Compiler  →  Cursor Codec      │
//! │   WhereClause │ SelectSpec │ OrderSpec │ Dialect             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Store Adapters                            │
//! │        DynamoAdapter          │        CosmosAdapter         │
//! ├─────────────────────────────────────────────────────────────┤
//! │        Store Clients (application supplied or in-memory)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod compiler;
pub mod core;
pub mod cosmos;
pub mod cursor;
pub mod dynamodb;
pub mod entity;
pub mod filter;
pub mod memory;

// Re-export core types
pub use core::{Backend, Document, ErrorKind, FieldType, NoSqlError, Result, StoreError, Value};

// Re-export the filter model
pub use filter::{
    Condition, FieldFilter, Operator, OrderSpec, QueryMode, SelectSpec, SortOrder, WhereClause,
};

// Re-export adapters and the facade
pub use adapter::{FindManyRequest, RawPage, StoreAdapter, StoreClients};
pub use cosmos::{ContainerRef, CosmosAdapter, CosmosClient};
pub use dynamodb::{DynamoAdapter, DynamoClient, TableRef};
pub use entity::{
    Clock, EntityConfig, EntityRepository, FindManyArgs, IdGenerator, OperationOptions, Page,
    SystemClock, UuidGenerator,
};

// Re-export in-memory clients
pub use memory::{MemoryCosmosClient, MemoryDynamoClient};
