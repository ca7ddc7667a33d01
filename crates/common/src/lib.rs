//! Common utilities and shared types for emotes-rs.
//!
//! This crate provides foundational components used across all emotes-rs crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Coded error taxonomy via [`AppError`] and [`AppResult`]
//! - **Identifiers**: Object ids and the zero sentinel via [`id`]
//! - **Primitives**: Bitfield algebra, color codec, random/base64 helpers
//! - **Collections**: Ordered set, index-tracking heap, priority queue
//! - **Data-loader**: Batched, coalescing loads via [`DataLoader`]
//! - **Caching**: Namespaced Redis cache and in-process TTL cache
//! - **Locks**: Local per-name mutexes and a Redis distributed mutex
//! - **Tokens**: HMAC-SHA256 user and CSRF tokens
//!
//! # Example
//!
//! ```no_run
//! use emotes_common::{AppResult, Config, IdGenerator};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     emotes_common::telemetry::init(&config.logging)?;
//!     let id = IdGenerator::new().generate();
//!     println!("Generated ID: {id}");
//!     Ok(())
//! }
//! ```

pub mod bitfield;
pub mod cache;
pub mod collections;
pub mod config;
pub mod dataloader;
pub mod error;
pub mod id;
pub mod jwt;
pub mod mutex;
pub mod telemetry;
pub mod utils;

pub use bitfield::BitField;
pub use cache::{Cache, KeyScheme, KeyValueCache, LocalCache, MemoryKeyValueCache, RedisCache};
pub use collections::{Heap, HeapItem, OrderedSet, PriorityQueue};
pub use config::Config;
pub use dataloader::{DataLoader, FetchResult, LoaderConfig, Thunk};
pub use error::{AppError, AppResult};
pub use id::{IdGenerator, ZERO_ID};
pub use jwt::{CsrfClaims, TokenSigner, UserClaims};
pub use mutex::{DistributedMutex, LocalMutexMap, LockGuard};

pub use bson;
