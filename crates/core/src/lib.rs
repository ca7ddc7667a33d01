//! Access layer for emotes-rs.
//!
//! - [`mutations`]: authorization-checked writes driven by builders
//! - [`queries`]: read pipelines, the binder that reassembles object graphs,
//!   ban post-processing and caching
//! - [`loaders`]: batched by-id loaders over the query engine
//! - [`auth`]: session token verification against the stored token version

pub mod auth;
pub mod loaders;
pub mod mutations;
pub mod queries;

pub use auth::Authenticator;
pub use loaders::Loaders;
pub use mutations::Mutator;
pub use queries::{ActiveBans, Binder, Query};
