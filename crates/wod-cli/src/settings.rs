//! Settings file
//!
//! Optional `wireguard-on-demand.toml` in the working directory. Every
//! field has a default, so an absent file (or an absent section) means
//! the stock Tokyo deployment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use wod_stack::{DeploymentDescriptor, Plugin};

/// Default settings file name
pub const SETTINGS_FILE: &str = "wireguard-on-demand.toml";

/// Which deployment to drive and where the engine keeps its project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentSettings {
    pub project: String,
    pub stack: String,
    pub organization: String,
    /// Engine project directory
    pub work_dir: PathBuf,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            project: "wireguard_on_demand".to_string(),
            stack: "dev".to_string(),
            organization: "organization".to_string(),
            work_dir: PathBuf::from(".wireguard-on-demand"),
        }
    }
}

/// Tunnel host settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// WireGuard UDP port
    pub listen_port: u16,
    pub instance_type: String,
    /// Base image name pattern; the newest match wins
    pub image_name_filter: String,
    pub image_owners: Vec<String>,
    /// Provider prefix lists allowed to reach SSH
    pub ssh_prefix_lists: Vec<String>,
    /// Startup script template with one `%s`
    pub user_data_template: PathBuf,
    pub tags: BTreeMap<String, String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_port: 51820,
            instance_type: "t2.micro".to_string(),
            image_name_filter: "ubuntu/images/hvm-ssd/ubuntu-jammy-22.04-amd64-server-*"
                .to_string(),
            image_owners: vec!["099720109477".to_string()],
            // ec2-instance-connect, ap-northeast-1 (IPv4 and IPv6)
            ssh_prefix_lists: vec![
                "pl-012493c5f82b88e8e".to_string(),
                "pl-08d491d20eebc3b95".to_string(),
            ],
            user_data_template: PathBuf::from("user_data.sh"),
            tags: BTreeMap::from([("Project".to_string(), "wireguard-on-demand".to_string())]),
        }
    }
}

/// Client side of the tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Client tunnel address (CIDR)
    pub address: String,
    pub dns: String,
    /// Routes sent through the tunnel
    pub allowed_ips: Vec<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            address: "10.0.0.2/24".to_string(),
            dns: "1.1.1.1".to_string(),
            allowed_ips: vec!["0.0.0.0/0".to_string()],
        }
    }
}

/// Complete settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub deployment: DeploymentSettings,
    pub plugins: Vec<Plugin>,
    /// Stack configuration values
    pub stack_config: BTreeMap<String, String>,
    pub server: ServerSettings,
    pub client: ClientSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            deployment: DeploymentSettings::default(),
            plugins: vec![Plugin::new("aws", "v4.0.0")],
            stack_config: BTreeMap::from([(
                "aws:region".to_string(),
                "ap-northeast-1".to_string(), // Tokyo
            )]),
            server: ServerSettings::default(),
            client: ClientSettings::default(),
        }
    }
}

impl Settings {
    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    /// Load from TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Load from a file if it exists, otherwise use defaults
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::from_toml_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Deployment this run targets
    pub fn descriptor(&self) -> DeploymentDescriptor {
        DeploymentDescriptor::new(
            &self.deployment.project,
            &self.deployment.stack,
            &self.deployment.organization,
        )
    }
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings {path}: {message}")]
    Io { path: String, message: String },

    #[error("Invalid settings: {0}")]
    Parse(String),
}
