//! Deployment lifecycle for an on-demand WireGuard host
//!
//! Wraps an infrastructure provisioning engine behind a small state
//! machine that brings a single tunnel host up, or tears it down, and
//! hands back the typed outputs needed to build the client config.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   DesiredState    ┌─────────────────────┐
//! │  Lifecycle   │──────────────────▶│ ProvisioningEngine  │
//! │ (state mach.)│◀──────────────────│  (PulumiCli, ...)   │
//! └──────────────┘  DeploymentOutputs└─────────────────────┘
//! ```

mod bootstrap;
mod descriptor;
mod engine;
mod lifecycle;
mod outputs;
mod program;
mod pulumi;

pub use bootstrap::{BootstrapTemplate, TemplateError};
pub use descriptor::{DeploymentDescriptor, Plugin};
pub use engine::{EngineError, ProvisioningEngine, StackHandle};
pub use lifecycle::{Lifecycle, LifecycleState, Stage, StackError};
pub use outputs::{DeploymentOutputs, EngineOutputs, OutputError, keys as output_keys};
pub use program::{
    AccessControl, AccessRule, DesiredState, Exports, ImageLookup, InstanceSpec, Protocol,
    RuleSource,
};
pub use pulumi::PulumiCli;
