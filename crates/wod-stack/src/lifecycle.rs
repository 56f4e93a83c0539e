//! Provisioning Lifecycle
//!
//! Drives one named deployment through the engine:
//!
//! ```text
//!   Absent ──register──▶ Registered ──refresh──▶ Synced ──update──▶ Active
//!     ▲                                            │
//!     └──────────────────destroy───────────────────┘
//! ```
//!
//! Each invocation of the tool walks this machine once. Persistent state
//! lives in the engine's backend, so a new `Lifecycle` always starts in
//! `Absent` regardless of what exists remotely.
//!
//! Any engine failure is fatal for the run and is returned with the stage
//! that failed. Nothing is retried or rolled back here.

use crate::descriptor::{DeploymentDescriptor, Plugin};
use crate::engine::{EngineError, ProvisioningEngine, StackHandle};
use crate::outputs::{DeploymentOutputs, OutputError};
use crate::program::DesiredState;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{Instrument, Span, error, info};

/// Lifecycle state as seen by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing resolved yet in this run
    Absent,
    /// Deployment selected, plugins installed, config set
    Registered,
    /// Engine state reconciled with live infrastructure
    Synced,
    /// Desired state applied, outputs available
    Active,
}

/// Engine interaction that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Register,
    InstallPlugin,
    SetConfig,
    Refresh,
    Apply,
    Destroy,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Register => "register",
            Stage::InstallPlugin => "install-plugin",
            Stage::SetConfig => "set-config",
            Stage::Refresh => "refresh",
            Stage::Apply => "apply",
            Stage::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("Engine {stage} failed for stack {stack}: {source}")]
    Engine {
        stage: Stage,
        stack: String,
        #[source]
        source: EngineError,
    },

    #[error("Output contract violated: {0}")]
    Outputs(#[from] OutputError),

    #[error("Cannot {action} a deployment in state {from:?}")]
    InvalidTransition {
        from: LifecycleState,
        action: &'static str,
    },
}

impl StackError {
    /// The engine stage that failed, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            StackError::Engine { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// State machine around a single deployment
pub struct Lifecycle<E> {
    engine: E,
    descriptor: DeploymentDescriptor,
    handle: Option<StackHandle>,
    state: LifecycleState,
    /// Every event and engine call of this run is parented here
    span: Span,
}

impl<E: ProvisioningEngine> Lifecycle<E> {
    /// Create a lifecycle for a deployment, logging under `span`
    pub fn new(engine: E, descriptor: DeploymentDescriptor, span: Span) -> Self {
        Self {
            engine,
            descriptor,
            handle: None,
            state: LifecycleState::Absent,
            span,
        }
    }

    /// Current state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Underlying engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Absent → Registered: select or create the deployment, install
    /// pinned plugins, and set stack configuration.
    pub async fn register(
        &mut self,
        plugins: &[Plugin],
        config: &BTreeMap<String, String>,
    ) -> Result<(), StackError> {
        self.expect(LifecycleState::Absent, "register")?;
        let stack = self.descriptor.fully_qualified();

        let handle = self
            .engine
            .register(&self.descriptor)
            .instrument(self.span.clone())
            .await
            .map_err(|e| self.fail(Stage::Register, e))?;
        info!(parent: &self.span, %stack, "Created stack");

        for plugin in plugins {
            self.engine
                .install_plugin(&handle, plugin)
                .instrument(self.span.clone())
                .await
                .map_err(|e| {
                    error!(parent: &self.span, %plugin, "Failed to install plugin");
                    self.fail(Stage::InstallPlugin, e)
                })?;
        }
        info!(parent: &self.span, %stack, count = plugins.len(), "Installed plugins");

        for (key, value) in config {
            self.engine
                .set_config(&handle, key, value)
                .instrument(self.span.clone())
                .await
                .map_err(|e| self.fail(Stage::SetConfig, e))?;
        }
        info!(parent: &self.span, %stack, "Set config");

        self.handle = Some(handle);
        self.state = LifecycleState::Registered;
        Ok(())
    }

    /// Registered → Synced: reconcile recorded state before mutating
    pub async fn refresh(&mut self) -> Result<(), StackError> {
        let handle = self.expect_handle(LifecycleState::Registered, "refresh")?;

        self.engine
            .refresh(&handle)
            .instrument(self.span.clone())
            .await
            .map_err(|e| self.fail(Stage::Refresh, e))?;
        info!(parent: &self.span, stack = %handle.name, "Refreshed stack");

        self.state = LifecycleState::Synced;
        Ok(())
    }

    /// Absent → Synced in one step
    pub async fn prepare(
        &mut self,
        plugins: &[Plugin],
        config: &BTreeMap<String, String>,
    ) -> Result<(), StackError> {
        self.register(plugins, config).await?;
        self.refresh().await
    }

    /// Synced → Active: converge to `desired` and decode the outputs
    pub async fn update(&mut self, desired: &DesiredState) -> Result<DeploymentOutputs, StackError> {
        let handle = self.expect_handle(LifecycleState::Synced, "update")?;

        let raw = self
            .engine
            .apply(&handle, desired)
            .instrument(self.span.clone())
            .await
            .map_err(|e| self.fail(Stage::Apply, e))?;
        self.state = LifecycleState::Active;
        info!(parent: &self.span, stack = %handle.name, outputs = raw.len(), "Updated stack");

        DeploymentOutputs::decode(&raw).map_err(|e| {
            error!(parent: &self.span, error = %e, "Stack outputs incomplete");
            StackError::Outputs(e)
        })
    }

    /// Synced → Absent: remove everything the deployment owns
    pub async fn destroy(&mut self) -> Result<(), StackError> {
        let handle = self.expect_handle(LifecycleState::Synced, "destroy")?;

        self.engine
            .destroy(&handle)
            .instrument(self.span.clone())
            .await
            .map_err(|e| self.fail(Stage::Destroy, e))?;
        info!(parent: &self.span, stack = %handle.name, "Destroyed stack");

        self.handle = None;
        self.state = LifecycleState::Absent;
        Ok(())
    }

    fn expect(&self, state: LifecycleState, action: &'static str) -> Result<(), StackError> {
        if self.state == state {
            Ok(())
        } else {
            Err(StackError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }

    fn expect_handle(
        &self,
        state: LifecycleState,
        action: &'static str,
    ) -> Result<StackHandle, StackError> {
        self.expect(state, action)?;
        self.handle.clone().ok_or(StackError::InvalidTransition {
            from: self.state,
            action,
        })
    }

    fn fail(&self, stage: Stage, source: EngineError) -> StackError {
        let stack = self.descriptor.fully_qualified();
        error!(parent: &self.span, %stack, %stage, error = %source, "Engine call failed");
        StackError::Engine {
            stage,
            stack,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::EngineOutputs;
    use crate::program::{Exports, ImageLookup, InstanceSpec};
    use serde_json::json;

    #[derive(Default)]
    struct StubEngine {
        calls: Vec<String>,
        fail_at: Option<Stage>,
        outputs: EngineOutputs,
    }

    impl StubEngine {
        fn failing_at(stage: Stage) -> Self {
            Self {
                fail_at: Some(stage),
                ..Self::default()
            }
        }

        fn step(&mut self, stage: Stage, call: String) -> Result<(), EngineError> {
            self.calls.push(call);
            if self.fail_at == Some(stage) {
                return Err(EngineError::Rejected(format!("{} rejected", stage)));
            }
            Ok(())
        }
    }

    impl ProvisioningEngine for StubEngine {
        async fn register(
            &mut self,
            descriptor: &DeploymentDescriptor,
        ) -> Result<StackHandle, EngineError> {
            self.step(Stage::Register, format!("register {}", descriptor))?;
            Ok(StackHandle::for_descriptor(descriptor))
        }

        async fn install_plugin(
            &mut self,
            _handle: &StackHandle,
            plugin: &Plugin,
        ) -> Result<(), EngineError> {
            self.step(Stage::InstallPlugin, format!("plugin {}", plugin))
        }

        async fn set_config(
            &mut self,
            _handle: &StackHandle,
            key: &str,
            value: &str,
        ) -> Result<(), EngineError> {
            self.step(Stage::SetConfig, format!("config {}={}", key, value))
        }

        async fn refresh(&mut self, _handle: &StackHandle) -> Result<(), EngineError> {
            self.step(Stage::Refresh, "refresh".into())
        }

        async fn apply(
            &mut self,
            _handle: &StackHandle,
            _desired: &DesiredState,
        ) -> Result<EngineOutputs, EngineError> {
            self.step(Stage::Apply, "apply".into())?;
            Ok(self.outputs.clone())
        }

        async fn destroy(&mut self, _handle: &StackHandle) -> Result<(), EngineError> {
            self.step(Stage::Destroy, "destroy".into())
        }
    }

    fn lifecycle(engine: StubEngine) -> Lifecycle<StubEngine> {
        Lifecycle::new(
            engine,
            DeploymentDescriptor::new("wireguard_on_demand", "dev", "organization"),
            Span::none(),
        )
    }

    fn plugins() -> Vec<Plugin> {
        vec![Plugin::new("aws", "v4.0.0")]
    }

    fn config() -> BTreeMap<String, String> {
        BTreeMap::from([("aws:region".to_string(), "ap-northeast-1".to_string())])
    }

    fn desired() -> DesiredState {
        DesiredState {
            access: DesiredState::tunnel_host_access(51820, vec![]),
            instance: InstanceSpec {
                instance_type: "t2.micro".into(),
                image: ImageLookup {
                    name_filter: "ubuntu/*".into(),
                    owners: vec![],
                },
                user_data: String::new(),
                tags: BTreeMap::new(),
            },
            exports: Exports {
                server_listen_port: 51820,
                server_public_key: "SPUB".into(),
                client_private_key: "CPRIV".into(),
                client_public_key: "CPUB".into(),
                client_address: "10.0.0.2/24".into(),
            },
        }
    }

    fn full_outputs() -> EngineOutputs {
        match json!({
            "server-endpoint": "1.2.3.4",
            "server-listen-port": 51820.0,
            "server-public-key": "SPUB",
            "client-private-key": "CPRIV",
            "client-public-key": "CPUB",
            "client-address": "10.0.0.2/24",
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_update_walks_states() {
        let engine = StubEngine {
            outputs: full_outputs(),
            ..StubEngine::default()
        };
        let mut lc = lifecycle(engine);
        assert_eq!(lc.state(), LifecycleState::Absent);

        lc.register(&plugins(), &config()).await.unwrap();
        assert_eq!(lc.state(), LifecycleState::Registered);

        lc.refresh().await.unwrap();
        assert_eq!(lc.state(), LifecycleState::Synced);

        let outputs = lc.update(&desired()).await.unwrap();
        assert_eq!(lc.state(), LifecycleState::Active);
        assert_eq!(outputs.server_endpoint, "1.2.3.4");
        assert_eq!(outputs.client_public_key.as_deref(), Some("CPUB"));

        assert_eq!(
            lc.engine().calls,
            vec![
                "register organization/wireguard_on_demand/dev",
                "plugin aws@v4.0.0",
                "config aws:region=ap-northeast-1",
                "refresh",
                "apply",
            ]
        );
    }

    #[tokio::test]
    async fn test_destroy_returns_to_absent() {
        let mut lc = lifecycle(StubEngine::default());

        lc.prepare(&plugins(), &config()).await.unwrap();
        lc.destroy().await.unwrap();

        assert_eq!(lc.state(), LifecycleState::Absent);
        assert_eq!(lc.engine().calls.last().map(String::as_str), Some("destroy"));
        assert!(!lc.engine().calls.contains(&"apply".to_string()));
    }

    #[tokio::test]
    async fn test_failures_carry_stage() {
        for stage in [
            Stage::Register,
            Stage::InstallPlugin,
            Stage::SetConfig,
            Stage::Refresh,
        ] {
            let mut lc = lifecycle(StubEngine::failing_at(stage));
            let err = lc.prepare(&plugins(), &config()).await.unwrap_err();

            assert_eq!(err.stage(), Some(stage));
            assert!(err.to_string().contains(&format!("{} rejected", stage)));
            assert_ne!(lc.state(), LifecycleState::Synced);
        }
    }

    #[tokio::test]
    async fn test_register_failure_stops_early() {
        let mut lc = lifecycle(StubEngine::failing_at(Stage::InstallPlugin));
        let _ = lc.prepare(&plugins(), &config()).await;

        assert_eq!(lc.state(), LifecycleState::Absent);
        assert_eq!(lc.engine().calls.len(), 2);
    }

    #[tokio::test]
    async fn test_apply_failure() {
        let mut lc = lifecycle(StubEngine::failing_at(Stage::Apply));
        lc.prepare(&plugins(), &config()).await.unwrap();

        let err = lc.update(&desired()).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Apply));
        assert_eq!(lc.state(), LifecycleState::Synced);
    }

    #[tokio::test]
    async fn test_destroy_failure() {
        let mut lc = lifecycle(StubEngine::failing_at(Stage::Destroy));
        lc.prepare(&plugins(), &config()).await.unwrap();

        let err = lc.destroy().await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Destroy));
    }

    #[tokio::test]
    async fn test_missing_outputs() {
        let mut outputs = full_outputs();
        outputs.remove("client-address");
        let engine = StubEngine {
            outputs,
            ..StubEngine::default()
        };

        let mut lc = lifecycle(engine);
        lc.prepare(&plugins(), &config()).await.unwrap();

        let err = lc.update(&desired()).await.unwrap_err();
        assert!(matches!(
            err,
            StackError::Outputs(OutputError::Missing("client-address"))
        ));
    }

    #[tokio::test]
    async fn test_update_requires_refresh() {
        let mut lc = lifecycle(StubEngine::default());
        lc.register(&plugins(), &config()).await.unwrap();

        let err = lc.update(&desired()).await.unwrap_err();
        assert!(matches!(
            err,
            StackError::InvalidTransition {
                from: LifecycleState::Registered,
                action: "update"
            }
        ));
        assert!(!lc.engine().calls.contains(&"apply".to_string()));
    }

    #[tokio::test]
    async fn test_destroy_before_register() {
        let mut lc = lifecycle(StubEngine::default());

        let err = lc.destroy().await.unwrap_err();
        assert!(matches!(err, StackError::InvalidTransition { .. }));
        assert!(lc.engine().calls.is_empty());
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::InstallPlugin.to_string(), "install-plugin");
        assert_eq!(Stage::SetConfig.to_string(), "set-config");
    }
}
