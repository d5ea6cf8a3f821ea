//! # keel-pipeline
//!
//! Component rendering pipeline and release writer.
//!
//! Call [`Pipeline::render`] to turn a [`keel_core::RenderRequest`] into a
//! sorted resource list, [`build_release`] to tag the resources with IDs, and
//! [`write_release`] to persist the release with a hash-gated atomic write.

pub mod configurations;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod release;

pub use error::PipelineError;
pub use pipeline::{Pipeline, RenderMetadata, RenderOptions, RenderOutput};
pub use release::{build_release, resource_id, write_release, WriteResult};
