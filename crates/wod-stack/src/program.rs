//! Desired resource graph
//!
//! Typed description of the infrastructure behind one tunnel endpoint,
//! rendered into a Pulumi YAML program for the engine to converge.
//!
//! # Resources
//!
//! | Name | Type | Purpose |
//! |------|------|---------|
//! | `wg-host-sg` | `aws:ec2:SecurityGroup` | UDP tunnel port open, SSH from the provider allow-list |
//! | `wg-host` | `aws:ec2:Instance` | Tunnel server, configured by the bootstrap payload |

use crate::outputs::keys;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

const SECURITY_GROUP: &str = "wg-host-sg";
const INSTANCE: &str = "wg-host";
const IMAGE_VARIABLE: &str = "baseImage";
const ANYWHERE: &str = "0.0.0.0/0";

/// Firewall rule protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Udp,
    Tcp,
    All,
}

impl Protocol {
    fn as_str(&self) -> &'static str {
        match self {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
            Protocol::All => "-1",
        }
    }
}

/// Where rule traffic may come from / go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSource {
    /// CIDR blocks
    Cidrs(Vec<String>),
    /// Provider-managed prefix lists
    PrefixLists(Vec<String>),
}

/// One access-control rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    pub protocol: Protocol,
    pub from_port: u16,
    pub to_port: u16,
    pub source: RuleSource,
}

impl AccessRule {
    /// Single port from anywhere
    pub fn port_from_anywhere(protocol: Protocol, port: u16) -> Self {
        Self {
            protocol,
            from_port: port,
            to_port: port,
            source: RuleSource::Cidrs(vec![ANYWHERE.to_string()]),
        }
    }

    /// Single port from provider prefix lists
    pub fn port_from_prefix_lists(protocol: Protocol, port: u16, lists: Vec<String>) -> Self {
        Self {
            protocol,
            from_port: port,
            to_port: port,
            source: RuleSource::PrefixLists(lists),
        }
    }

    /// Everything, everywhere
    pub fn allow_all() -> Self {
        Self {
            protocol: Protocol::All,
            from_port: 0,
            to_port: 0,
            source: RuleSource::Cidrs(vec![ANYWHERE.to_string()]),
        }
    }

    fn to_value(&self) -> Value {
        let mut rule = json!({
            "protocol": self.protocol.as_str(),
            "fromPort": self.from_port,
            "toPort": self.to_port,
        });
        let (field, list) = match &self.source {
            RuleSource::Cidrs(cidrs) => ("cidrBlocks", cidrs),
            RuleSource::PrefixLists(lists) => ("prefixListIds", lists),
        };
        rule[field] = json!(list);
        rule
    }
}

/// Network access-control object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControl {
    pub description: String,
    pub ingress: Vec<AccessRule>,
    pub egress: Vec<AccessRule>,
}

/// Base image selection: newest image matching a name pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLookup {
    pub name_filter: String,
    pub owners: Vec<String>,
}

/// Compute instance running the tunnel server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub instance_type: String,
    pub image: ImageLookup,
    /// Rendered bootstrap payload
    pub user_data: String,
    pub tags: BTreeMap<String, String>,
}

/// Values exported after apply, alongside the instance's public address
#[derive(Clone, PartialEq, Eq)]
pub struct Exports {
    pub server_listen_port: u16,
    pub server_public_key: String,
    pub client_private_key: String,
    pub client_public_key: String,
    pub client_address: String,
}

impl std::fmt::Debug for Exports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exports")
            .field("server_listen_port", &self.server_listen_port)
            .field("server_public_key", &self.server_public_key)
            .field("client_private_key", &"[redacted]")
            .field("client_public_key", &self.client_public_key)
            .field("client_address", &self.client_address)
            .finish()
    }
}

/// The whole desired state of one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub access: AccessControl,
    pub instance: InstanceSpec,
    pub exports: Exports,
}

impl DesiredState {
    /// Standard access rules for a tunnel host: tunnel port open to the
    /// world, SSH only from the given prefix lists, all egress.
    pub fn tunnel_host_access(listen_port: u16, ssh_prefix_lists: Vec<String>) -> AccessControl {
        AccessControl {
            description: "Allow UDP traffic for WireGuard".to_string(),
            ingress: vec![
                AccessRule::port_from_anywhere(Protocol::Udp, listen_port),
                AccessRule::port_from_prefix_lists(Protocol::Tcp, 22, ssh_prefix_lists),
            ],
            egress: vec![AccessRule::allow_all()],
        }
    }

    /// Render as a Pulumi YAML program.
    ///
    /// The program is emitted as JSON, which the YAML runtime accepts.
    pub fn to_program(&self, project: &str) -> Value {
        let access = &self.access;
        let instance = &self.instance;
        let exports = &self.exports;

        let security_group = json!({
            "type": "aws:ec2:SecurityGroup",
            "properties": {
                "description": escape(&access.description),
                "ingress": access.ingress.iter().map(AccessRule::to_value).collect::<Vec<_>>(),
                "egress": access.egress.iter().map(AccessRule::to_value).collect::<Vec<_>>(),
            },
        });

        let tags: Map<String, Value> = instance
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(escape(v))))
            .collect();

        let host = json!({
            "type": "aws:ec2:Instance",
            "properties": {
                "ami": format!("${{{IMAGE_VARIABLE}}}"),
                "instanceType": escape(&instance.instance_type),
                "vpcSecurityGroupIds": [format!("${{{SECURITY_GROUP}.id}}")],
                "userData": escape(&instance.user_data),
                "tags": tags,
            },
        });

        let image = json!({
            "fn::invoke": {
                "function": "aws:ec2:getAmi",
                "arguments": {
                    "mostRecent": true,
                    "owners": instance.image.owners,
                    "filters": [
                        { "name": "name", "values": [escape(&instance.image.name_filter)] },
                    ],
                },
                "return": "id",
            },
        });

        let mut outputs = Map::new();
        outputs.insert(
            keys::SERVER_ENDPOINT.into(),
            json!(format!("${{{INSTANCE}.publicIp}}")),
        );
        outputs.insert(keys::SERVER_LISTEN_PORT.into(), json!(exports.server_listen_port));
        outputs.insert(keys::SERVER_PUBLIC_KEY.into(), json!(escape(&exports.server_public_key)));
        outputs.insert(
            keys::CLIENT_PRIVATE_KEY.into(),
            json!({ "fn::secret": escape(&exports.client_private_key) }),
        );
        outputs.insert(keys::CLIENT_PUBLIC_KEY.into(), json!(escape(&exports.client_public_key)));
        outputs.insert(keys::CLIENT_ADDRESS.into(), json!(escape(&exports.client_address)));

        let mut resources = Map::new();
        resources.insert(SECURITY_GROUP.into(), security_group);
        resources.insert(INSTANCE.into(), host);

        let mut variables = Map::new();
        variables.insert(IMAGE_VARIABLE.into(), image);

        json!({
            "name": project,
            "runtime": "yaml",
            "variables": variables,
            "resources": resources,
            "outputs": outputs,
        })
    }
}

/// Project file with no resources, used before the desired state is known
pub fn bare_program(project: &str) -> Value {
    json!({
        "name": project,
        "runtime": "yaml",
    })
}

/// Keep the engine from interpolating literal `${...}` sequences
fn escape(value: &str) -> String {
    value.replace("${", "$${")
}
