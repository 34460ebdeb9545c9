//! Image build and publish for dockhand
//!
//! Each job gets a private build context directory, is built through the
//! Docker Engine API, and is pushed to its registry. [`BuildExecutor`] runs
//! those phases for the job queue's workers and turns their result into an
//! [`ExecutionOutcome`](dockhand_core::ExecutionOutcome).

pub mod auth;
pub mod context;
pub mod docker;
pub mod engine;
pub mod error;
pub mod executor;
pub mod registry;

pub use auth::RegistryAuth;
pub use context::BuildContext;
pub use docker::{DockerEngine, split_image_tag};
pub use engine::{BuiltImage, ContainerEngine, PushProgress, RegistryLogin};
pub use error::{BuildError, BuildResult, EngineError, EngineResult};
pub use executor::{BuildExecutor, ExecutorOptions};
pub use registry::{DEFAULT_REGISTRY_URL_TEMPLATE, MissingPlaceholder, RegistryUrlFormat};
