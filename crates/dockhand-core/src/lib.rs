//! Core types for dockhand
//!
//! Job descriptors are the unit of work handed from the HTTP layer to the job
//! queue. This crate defines them, the outcome a job ends with, and the
//! validation that turns a raw build request into a descriptor.

pub mod assembler;
pub mod error;
pub mod model;
pub mod names;

pub use assembler::{BuildRequest, Upload, assemble};
pub use error::{Result, ValidationError};
pub use model::{Blob, ExecutionOutcome, FailedStep, JobDescriptor, RegistryCredential};
pub use names::{DEFAULT_REGISTRY_URL_TEMPLATE, DEFAULT_TAG, DOCKERFILE_NAME};
