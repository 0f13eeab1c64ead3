//! Typed request/response layer over the host's query protocol

mod host_client;
mod types;

pub use host_client::{HostClient, HostError};
pub use types::{
    Entity, EntityFile, EntityIdentifier, EntityUpdate, FindEntitiesResult, HostDuplicateGroup,
    MergeOverrides, NamedRef,
};
