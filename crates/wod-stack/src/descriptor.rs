//! Deployment identity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies exactly one deployment inside the provisioning engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
    /// Project name
    pub project: String,
    /// Stack name within the project
    pub stack: String,
    /// Organization owning the project
    pub organization: String,
}

impl DeploymentDescriptor {
    pub fn new(
        project: impl Into<String>,
        stack: impl Into<String>,
        organization: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
            organization: organization.into(),
        }
    }

    /// `organization/project/stack`
    pub fn fully_qualified(&self) -> String {
        format!("{}/{}/{}", self.organization, self.project, self.stack)
    }
}

impl fmt::Display for DeploymentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fully_qualified())
    }
}

/// Engine extension pinned to a version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plugin {
    pub name: String,
    pub version: String,
}

impl Plugin {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}
