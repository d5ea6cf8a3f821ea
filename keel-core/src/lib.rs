//! Keel core library — manifest types, manifest loading, errors.
//!
//! Public API surface:
//! - [`types`] — template values and the component manifests the pipeline consumes
//! - [`error`] — [`ManifestError`]
//! - [`manifest`] — load render requests, templates and input files from YAML/JSON

pub mod error;
pub mod manifest;
pub mod types;

pub use error::ManifestError;
pub use types::{
    Addon, AddonInstance, Component, ComponentDeployment, ComponentType, Container,
    DataPlaneRef, Endpoint, EnvVar, FileMount, Inputs, MetadataContext, Release, RemoteRef,
    ReleaseResource, RenderRequest, ResourceTemplate, TemplateValue, Workload,
};
