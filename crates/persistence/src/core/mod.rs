//! Core storage traits and abstractions.
//!
//! This module provides the store contracts the orchestration layer is
//! written against:
//!
//! - [`InstanceStore`] - Listing instance versions under a UID prefix
//! - [`QueryStore`] - Executing parsed queries
//! - [`IndexStore`] - Maintaining the queryable index
//! - [`ExtendedQueryTagStore`] - Registry of user-registered query tags
//! - [`MetadataStore`] - Instance attribute sets
//! - [`FileStore`] - Original DICOM files
//! - [`SecretStore`] - Export destination credentials
//!
//! # Backends
//!
//! ```text
//!                      SqliteIndexStore   DocumentStore   ObjectFileStore
//! InstanceStore              x                 x
//! QueryStore                 x                 x
//! IndexStore                 x                 x
//! ExtendedQueryTagStore      x
//! MetadataStore                                x          ObjectMetadataStore
//! FileStore                                                     x
//! ```

mod instance;
mod metadata;
mod secret;
mod tags;

pub use instance::{
    IndexStore, InstanceStore, QueryStore, ResolutionScope, resolve_instance_identifiers,
};
pub use metadata::{FileStore, MetadataStore};
pub use secret::{InMemorySecretStore, SecretHandle, SecretStore};
pub use tags::ExtendedQueryTagStore;
