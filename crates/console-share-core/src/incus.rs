//! Incus instance lookup via the `incus` client.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Kind of Incus instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceType {
    Container,
    VirtualMachine,
}

impl InstanceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::VirtualMachine => "virtual-machine",
        }
    }
}

impl std::fmt::Display for InstanceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fields of `incus list --format json` we care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub status: String,
    #[serde(rename = "type")]
    pub kind: InstanceType,
    #[serde(default)]
    pub project: String,
}

impl Instance {
    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case("running")
    }

    pub const fn is_vm(&self) -> bool {
        matches!(self.kind, InstanceType::VirtualMachine)
    }

    /// Preferred way to share this instance: VGA for VMs, a shell otherwise.
    pub const fn preferred_mode(&self) -> &'static str {
        if self.is_vm() { "vga" } else { "shell" }
    }
}

/// Parse the JSON array printed by `incus list --format json`.
pub fn parse_instance_list(json: &str) -> Result<Vec<Instance>> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(json)?)
}

/// Thin async wrapper around the `incus` binary.
#[derive(Debug, Clone)]
pub struct IncusClient {
    bin: PathBuf,
}

impl Default for IncusClient {
    fn default() -> Self {
        Self::new("incus")
    }
}

impl IncusClient {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    /// List all instances of the current project.
    pub async fn list_instances(&self) -> Result<Vec<Instance>> {
        let output = self.run(&["list", "--format", "json"]).await?;
        parse_instance_list(&output)
    }

    /// Look up one instance by exact name.
    pub async fn get_instance(&self, name: &str) -> Result<Option<Instance>> {
        // `incus list <filter>` matches by prefix, so re-check the name.
        let output = self.run(&["list", "--format", "json", name]).await?;
        Ok(parse_instance_list(&output)?
            .into_iter()
            .find(|instance| instance.name == name))
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let cmd_line = format!("{} {}", self.bin.display(), args.join(" "));
        debug!("exec (capture): {cmd_line}");

        let output = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Incus(format!("failed to execute {cmd_line}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Incus(format!(
                "{cmd_line} failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
