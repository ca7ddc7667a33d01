//! Data layer for emotes-rs.
//!
//! - [`structures`]: stored entities, their validators and flag types
//! - [`builders`]: single-use builders pairing a snapshot with its update map
//! - [`aggregations`]: the stage DSL and named relation fragments
//! - [`store`]: the document store and object storage contracts

pub mod aggregations;
pub mod builders;
pub mod store;
pub mod structures;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use aggregations::{Fragment, Stage};
pub use builders::{Buildable, Builder, Checkpoint, UpdateMap, UpdateOp};
pub use store::{
    BulkWriteResult, Collection, DocumentStore, FindOptions, NoOpObjectStorage, ObjectAcl,
    ObjectStorage, ReturnDocument, UpdateResult, WriteModel,
};
