//! Deploy pipeline
//!
//! Chains clone, patch, install, build and deploy stages over one
//! workspace with fail-fast semantics. Provider-specific hosting APIs
//! stay behind the narrow [`DeployAdapter`] interface.

mod adapter;
mod error;
mod event;
mod runner;

pub use adapter::{DeployAdapter, DeployMarker, DeployStatus, HttpDeployAdapter};
pub use error::{PipelineError, Result};
pub use event::{PipelineEvent, Stage};
pub use runner::{PipelineConfig, PipelineRequest, PipelineResult, PipelineRunner, SourceLocator};
