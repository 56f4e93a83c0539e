//! Pulumi CLI engine
//!
//! Drives the `pulumi` executable with a YAML program written into a
//! private project directory. Credentials and the backend login come from
//! the environment the tool runs in.

use crate::descriptor::{DeploymentDescriptor, Plugin};
use crate::engine::{EngineError, ProvisioningEngine, StackHandle};
use crate::outputs::EngineOutputs;
use crate::program::{DesiredState, bare_program};
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

const PROJECT_FILE: &str = "Pulumi.yaml";

/// How to treat a command's stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Forward progress lines to the log
    Stream,
    /// Keep stdout out of the log (may carry secrets)
    Capture,
}

/// Engine backed by the Pulumi CLI
#[derive(Debug, Clone)]
pub struct PulumiCli {
    /// Executable to run
    binary: PathBuf,
    /// Project directory holding `Pulumi.yaml`
    work_dir: PathBuf,
}

impl PulumiCli {
    /// Create an engine using `pulumi` from `PATH`
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: PathBuf::from("pulumi"),
            work_dir: work_dir.into(),
        }
    }

    /// Use a specific executable
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Write the project file, readable by the owner only
    async fn write_program(&self, program: &Value) -> Result<(), EngineError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let text = serde_json::to_string_pretty(program)
            .map_err(|e| EngineError::InvalidOutput(e.to_string()))?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(self.work_dir.join(PROJECT_FILE)).await?;

        // `mode` only applies when the file is created
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await?;
        }

        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn up_and_read_outputs(
        &self,
        handle: &StackHandle,
    ) -> Result<EngineOutputs, EngineError> {
        self.run(
            &["up", "--yes", "--skip-preview", "--stack", &handle.name],
            Mode::Stream,
        )
        .await?;
        info!(stack = %handle.name, "Update complete, reading outputs");

        let raw = self
            .run(
                &["stack", "output", "--json", "--show-secrets", "--stack", &handle.name],
                Mode::Capture,
            )
            .await?;

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(outputs)) => Ok(outputs),
            Ok(other) => Err(EngineError::InvalidOutput(format!(
                "expected a JSON object, got {}",
                other
            ))),
            Err(e) => Err(EngineError::InvalidOutput(e.to_string())),
        }
    }

    async fn run(&self, args: &[&str], mode: Mode) -> Result<String, EngineError> {
        let command = format!("{} {}", self.binary.display(), args.join(" "));
        debug!(%command, "Running engine command");

        let mut child = Command::new(&self.binary)
            .args(args)
            .arg("--non-interactive")
            .arg("--cwd")
            .arg(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::InvalidOutput("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::InvalidOutput("stderr not captured".into()))?;

        let read_stdout = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut captured = String::new();
            while let Some(line) = lines.next_line().await? {
                if mode == Mode::Stream {
                    debug!("{}", line);
                }
                captured.push_str(&line);
                captured.push('\n');
            }
            Ok::<_, std::io::Error>(captured)
        };
        let read_stderr = async {
            let mut buf = String::new();
            BufReader::new(stderr).read_to_string(&mut buf).await?;
            Ok::<_, std::io::Error>(buf)
        };

        let (captured, errors) = tokio::join!(read_stdout, read_stderr);
        let status = child.wait().await?;
        let (captured, errors) = (captured?, errors?);

        if !status.success() {
            return Err(EngineError::CommandFailed {
                command,
                status: status.to_string(),
                stderr: errors.trim().to_string(),
            });
        }

        Ok(captured)
    }
}

impl ProvisioningEngine for PulumiCli {
    async fn register(
        &mut self,
        descriptor: &DeploymentDescriptor,
    ) -> Result<StackHandle, EngineError> {
        let handle = StackHandle::for_descriptor(descriptor);
        self.write_program(&bare_program(&handle.project)).await?;
        self.run(&["stack", "select", "--create", &handle.name], Mode::Stream)
            .await?;
        Ok(handle)
    }

    async fn install_plugin(
        &mut self,
        _handle: &StackHandle,
        plugin: &Plugin,
    ) -> Result<(), EngineError> {
        self.run(
            &["plugin", "install", "resource", &plugin.name, &plugin.version],
            Mode::Stream,
        )
        .await?;
        Ok(())
    }

    async fn set_config(
        &mut self,
        handle: &StackHandle,
        key: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        self.run(
            &["config", "set", key, value, "--stack", &handle.name],
            Mode::Stream,
        )
        .await?;
        Ok(())
    }

    async fn refresh(&mut self, handle: &StackHandle) -> Result<(), EngineError> {
        self.run(
            &["refresh", "--yes", "--skip-preview", "--stack", &handle.name],
            Mode::Stream,
        )
        .await?;
        Ok(())
    }

    async fn apply(
        &mut self,
        handle: &StackHandle,
        desired: &DesiredState,
    ) -> Result<EngineOutputs, EngineError> {
        self.write_program(&desired.to_program(&handle.project))
            .await?;
        let result = self.up_and_read_outputs(handle).await;

        // The full program embeds both private keys; put the key-free one back
        if let Err(e) = self.write_program(&bare_program(&handle.project)).await {
            warn!(error = %e, "Failed to clear key material from the project file");
        }
        result
    }

    async fn destroy(&mut self, handle: &StackHandle) -> Result<(), EngineError> {
        self.run(
            &["destroy", "--yes", "--skip-preview", "--stack", &handle.name],
            Mode::Stream,
        )
        .await?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::program::{Exports, ImageLookup, InstanceSpec};
    use std::collections::BTreeMap;
    use std::os::unix::fs::PermissionsExt;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("wod-pulumi-{}-{}", std::process::id(), name))
    }

    fn descriptor() -> DeploymentDescriptor {
        DeploymentDescriptor::new("wireguard_on_demand", "dev", "organization")
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let mut engine = PulumiCli::new(scratch_dir("missing"))
            .with_binary("/nonexistent/pulumi");

        let result = engine.register(&descriptor()).await;
        assert!(matches!(result, Err(EngineError::Spawn { .. })));
    }

    fn desired(server_private: &str, client_private: &str) -> DesiredState {
        DesiredState {
            access: DesiredState::tunnel_host_access(51820, vec![]),
            instance: InstanceSpec {
                instance_type: "t2.micro".into(),
                image: ImageLookup {
                    name_filter: "ubuntu/*".into(),
                    owners: vec![],
                },
                user_data: format!("[Interface]\nPrivateKey = {}\n", server_private),
                tags: BTreeMap::new(),
            },
            exports: Exports {
                server_listen_port: 51820,
                server_public_key: "server-pub".into(),
                client_private_key: client_private.into(),
                client_public_key: "client-pub".into(),
                client_address: "10.0.0.2/24".into(),
            },
        }
    }

    fn file_mode(path: &std::path::Path) -> u32 {
        std::fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[tokio::test]
    async fn test_register_writes_project_file() {
        let dir = scratch_dir("register");
        let mut engine = PulumiCli::new(&dir).with_binary("true");

        let handle = engine.register(&descriptor()).await.unwrap();
        assert_eq!(handle.name, "organization/wireguard_on_demand/dev");

        let text = std::fs::read_to_string(dir.join(PROJECT_FILE)).unwrap();
        let program: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(program["name"], "wireguard_on_demand");
        assert_eq!(program["runtime"], "yaml");
        assert_eq!(file_mode(&dir.join(PROJECT_FILE)), 0o600);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_existing_project_file_is_restricted() {
        let dir = scratch_dir("existing");
        let path = dir.join(PROJECT_FILE);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let mut engine = PulumiCli::new(&dir).with_binary("true");
        engine.register(&descriptor()).await.unwrap();
        assert_eq!(file_mode(&path), 0o600);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_apply_leaves_no_keys_on_disk() {
        let dir = scratch_dir("apply");
        let path = dir.join(PROJECT_FILE);
        let mut engine = PulumiCli::new(&dir).with_binary("true");
        let handle = engine.register(&descriptor()).await.unwrap();

        // `true` prints no outputs, so apply fails after `up`
        let result = engine
            .apply(&handle, &desired("SERVERPRIV", "CLIENTPRIV"))
            .await;
        assert!(matches!(result, Err(EngineError::InvalidOutput(_))));

        assert_eq!(file_mode(&path), 0o600);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("SERVERPRIV"));
        assert!(!text.contains("CLIENTPRIV"));
        let program: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(program, bare_program("wireguard_on_demand"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_failed_up_leaves_no_keys_on_disk() {
        let dir = scratch_dir("apply-failed");
        let path = dir.join(PROJECT_FILE);
        let mut engine = PulumiCli::new(&dir).with_binary("false");
        let handle = StackHandle::for_descriptor(&descriptor());

        let result = engine
            .apply(&handle, &desired("SERVERPRIV", "CLIENTPRIV"))
            .await;
        assert!(matches!(result, Err(EngineError::CommandFailed { .. })));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("SERVERPRIV"));
        assert!(!text.contains("CLIENTPRIV"));
        assert_eq!(file_mode(&path), 0o600);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_failed_command() {
        let mut engine = PulumiCli::new(scratch_dir("failed")).with_binary("false");
        let handle = StackHandle::for_descriptor(&descriptor());

        let result = engine.refresh(&handle).await;
        assert!(matches!(result, Err(EngineError::CommandFailed { .. })));
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let engine = PulumiCli::new(scratch_dir("echo")).with_binary("echo");

        let out = engine.run(&["hello"], Mode::Capture).await.unwrap();
        assert!(out.starts_with("hello --non-interactive --cwd"));
    }
}
