//! Component registry.
//!
//! Keeps the group → component → version hierarchy and derives each
//! component's latest released `version` as versions are published.

pub mod error;
pub mod merge;
pub mod models;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use merge::{merge_version, new_component};
pub use models::{
    ComponentQuery, ComponentRecord, GroupRecord, PublishRequest, Published, TagOptions,
    VersionRecord,
};
pub use registry::ComponentRegistry;
