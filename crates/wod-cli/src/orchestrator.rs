//! Orchestrator
//!
//! Glues key generation, config rendering and the deployment lifecycle
//! into the two operator commands.
//!
//! # Update
//!
//! 1. Generate server and client key pairs
//! 2. Render the server config and embed it in the bootstrap payload
//! 3. Register, refresh and apply the deployment
//! 4. Render the client config from the deployment outputs and write it
//!
//! Nothing is written unless every step succeeded.

use crate::cli::Intent;
use crate::settings::{Settings, SettingsError};
use std::io::Write;
use tracing::{Span, info, info_span};
use wod_stack::{
    BootstrapTemplate, DeploymentOutputs, DesiredState, Exports, ImageLookup, InstanceSpec,
    Lifecycle, ProvisioningEngine, StackError, TemplateError,
};
use wod_wireguard::{Endpoint, Interface, KeyError, KeyPair, KeySource, Peer, TunnelConfig};

/// Run errors
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Key generation failed: {0}")]
    Keys(#[from] KeyError),

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error("Bootstrap template: {0}")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("Failed to write client config: {0}")]
    Output(#[from] std::io::Error),
}

/// Drives one invocation of the tool
pub struct Orchestrator<E, K> {
    lifecycle: Lifecycle<E>,
    keys: K,
    settings: Settings,
    template: Option<BootstrapTemplate>,
    span: Span,
}

impl<E: ProvisioningEngine, K: KeySource> Orchestrator<E, K> {
    pub fn new(engine: E, keys: K, settings: Settings) -> Self {
        let descriptor = settings.descriptor();
        let span = info_span!("deployment", stack = %descriptor);
        Self {
            lifecycle: Lifecycle::new(engine, descriptor, span.clone()),
            keys,
            settings,
            template: None,
            span,
        }
    }

    /// Use this template instead of reading `server.user_data_template`
    #[cfg(test)]
    pub fn with_template(mut self, template: BootstrapTemplate) -> Self {
        self.template = Some(template);
        self
    }

    #[cfg(test)]
    pub fn lifecycle(&self) -> &Lifecycle<E> {
        &self.lifecycle
    }

    #[cfg(test)]
    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Carry out `intent`, writing the client config to `out` on update
    pub async fn run<W: Write>(&mut self, intent: Intent, out: &mut W) -> Result<(), RunError> {
        info!(parent: &self.span, ?intent, "Starting");
        match intent {
            Intent::Update => self.update(out).await,
            Intent::Destroy => self.destroy().await,
        }
    }

    async fn update<W: Write>(&mut self, out: &mut W) -> Result<(), RunError> {
        let server = self.keys.generate()?;
        let client = self.keys.generate()?;
        info!(
            parent: &self.span,
            server = %server.public,
            client = %client.public,
            "Generated key pairs"
        );

        let server_config = server_config(&server, &client, &self.settings).render();
        let template = match self.template.take() {
            Some(template) => template,
            None => BootstrapTemplate::from_file(&self.settings.server.user_data_template)?,
        };
        let user_data = template.render(&server_config);
        let desired = desired_state(&server, &client, user_data, &self.settings);

        self.lifecycle
            .prepare(&self.settings.plugins, &self.settings.stack_config)
            .await?;
        let outputs = self.lifecycle.update(&desired).await?;

        let rendered = client_config(&outputs, &self.settings).render();
        out.write_all(rendered.as_bytes())?;
        out.flush()?;

        info!(parent: &self.span, endpoint = %outputs.server_endpoint, "Client config written");
        Ok(())
    }

    async fn destroy(&mut self) -> Result<(), RunError> {
        self.lifecycle
            .prepare(&self.settings.plugins, &self.settings.stack_config)
            .await?;
        self.lifecycle.destroy().await?;
        Ok(())
    }
}

/// Server side: listens on the fixed port, trusts only the client
pub fn server_config(server: &KeyPair, client: &KeyPair, settings: &Settings) -> TunnelConfig {
    TunnelConfig::new(
        Interface::from_key(&server.private).with_listen_port(settings.server.listen_port),
    )
    .with_peer(Peer::from_key(&client.public).allow(&settings.client.address))
}

/// Client side: built purely from what the deployment reported
pub fn client_config(outputs: &DeploymentOutputs, settings: &Settings) -> TunnelConfig {
    let endpoint = Endpoint::new(&outputs.server_endpoint, outputs.server_listen_port);
    let peer = settings
        .client
        .allowed_ips
        .iter()
        .fold(Peer::new(&outputs.server_public_key).with_endpoint(&endpoint), |peer, cidr| {
            peer.allow(cidr)
        });

    TunnelConfig::new(
        Interface::new(&outputs.client_private_key)
            .with_address(&outputs.client_address)
            .with_dns(&settings.client.dns),
    )
    .with_peer(peer)
}

/// Resource graph for the tunnel host
pub fn desired_state(
    server: &KeyPair,
    client: &KeyPair,
    user_data: String,
    settings: &Settings,
) -> DesiredState {
    let host = &settings.server;
    DesiredState {
        access: DesiredState::tunnel_host_access(host.listen_port, host.ssh_prefix_lists.clone()),
        instance: InstanceSpec {
            instance_type: host.instance_type.clone(),
            image: ImageLookup {
                name_filter: host.image_name_filter.clone(),
                owners: host.image_owners.clone(),
            },
            user_data,
            tags: host.tags.clone(),
        },
        exports: Exports {
            server_listen_port: host.listen_port,
            server_public_key: server.public.to_base64(),
            client_private_key: client.private.to_base64(),
            client_public_key: client.public.to_base64(),
            client_address: settings.client.address.clone(),
        },
    }
}
