//! Provisioning engine contract
//!
//! The narrow interface the lifecycle drives. Everything about how
//! resources are actually created lives behind it.

use crate::descriptor::{DeploymentDescriptor, Plugin};
use crate::outputs::EngineOutputs;
use crate::program::DesiredState;

/// A deployment registered with (or selected in) the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackHandle {
    /// `organization/project/stack`
    pub name: String,
    /// Project the stack belongs to
    pub project: String,
}

impl StackHandle {
    pub fn for_descriptor(descriptor: &DeploymentDescriptor) -> Self {
        Self {
            name: descriptor.fully_qualified(),
            project: descriptor.project.clone(),
        }
    }
}

/// Infrastructure provisioning engine.
///
/// Every call blocks the caller until the engine reports completion.
#[allow(async_fn_in_trait)]
pub trait ProvisioningEngine {
    /// Register the deployment, or select it if it already exists
    async fn register(&mut self, descriptor: &DeploymentDescriptor)
    -> Result<StackHandle, EngineError>;

    /// Ensure an engine extension is installed at a pinned version
    async fn install_plugin(&mut self, handle: &StackHandle, plugin: &Plugin)
    -> Result<(), EngineError>;

    /// Set one stack configuration value
    async fn set_config(&mut self, handle: &StackHandle, key: &str, value: &str)
    -> Result<(), EngineError>;

    /// Reconcile recorded state with live infrastructure
    async fn refresh(&mut self, handle: &StackHandle) -> Result<(), EngineError>;

    /// Converge live infrastructure to the desired state and return the
    /// stack outputs
    async fn apply(&mut self, handle: &StackHandle, desired: &DesiredState)
    -> Result<EngineOutputs, EngineError>;

    /// Remove every resource owned by the deployment
    async fn destroy(&mut self, handle: &StackHandle) -> Result<(), EngineError>;
}

/// Errors reported by an engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to launch `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Unreadable engine output: {0}")]
    InvalidOutput(String),

    #[error("Project directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Rejected(String),
}
