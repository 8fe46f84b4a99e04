//! Provider plugin process
//!
//! Launches a provider binary the way go-plugin expects, reads the
//! handshake line it prints on stdout and keeps its output drained for
//! the life of the process.

use super::ProviderError;
use std::path::Path;
use std::process::Stdio;
use std::str::FromStr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";
pub const CORE_PROTOCOL_VERSION: u32 = 1;
pub const SUPPORTED_PROTOCOL_VERSIONS: &[u32] = &[5];
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// `CORE|PROTO|NETWORK|ADDRESS|PROTOCOL[|SERVER_CERT]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub core_version: u32,
    pub protocol_version: u32,
    /// `unix` or `tcp`
    pub network: String,
    /// Socket path or `host:port` the plugin serves gRPC on
    pub address: String,
    pub protocol: String,
    pub server_cert: Option<String>,
}

impl FromStr for Handshake {
    type Err = ProviderError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.trim().split('|').collect();
        let (core, proto, network, address, protocol, cert) = match parts.as_slice() {
            [core, proto, network, address, protocol] => {
                (core, proto, network, address, protocol, None)
            }
            [core, proto, network, address, protocol, cert] => {
                (core, proto, network, address, protocol, Some(cert))
            }
            _ => {
                return Err(ProviderError::Handshake(format!(
                    "unrecognized handshake line {:?}",
                    line.trim()
                )))
            }
        };

        let number = |field: &str, raw: &str| {
            raw.parse::<u32>().map_err(|_| {
                ProviderError::Handshake(format!("invalid {} version {:?}", field, raw))
            })
        };

        Ok(Self {
            core_version: number("core", *core)?,
            protocol_version: number("protocol", *proto)?,
            network: network.to_string(),
            address: address.to_string(),
            protocol: protocol.to_string(),
            server_cert: cert.filter(|c| !c.is_empty()).map(|c| c.to_string()),
        })
    }
}

impl Handshake {
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.core_version != CORE_PROTOCOL_VERSION {
            return Err(ProviderError::Handshake(format!(
                "incompatible core protocol version {}, expected {}",
                self.core_version, CORE_PROTOCOL_VERSION
            )));
        }
        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&self.protocol_version) {
            return Err(ProviderError::Handshake(format!(
                "unsupported plugin protocol version {}",
                self.protocol_version
            )));
        }
        if self.network != "unix" && self.network != "tcp" {
            return Err(ProviderError::Handshake(format!(
                "unsupported network {:?}",
                self.network
            )));
        }
        if self.protocol != "grpc" {
            return Err(ProviderError::Handshake(format!(
                "unsupported protocol {:?}",
                self.protocol
            )));
        }
        if self.server_cert.is_some() {
            return Err(ProviderError::Handshake(
                "plugin requires TLS, which is not supported".to_string(),
            ));
        }
        Ok(())
    }
}

/// A running plugin process
pub struct PluginProcess {
    child: Mutex<Child>,
    pub handshake: Handshake,
}

impl PluginProcess {
    pub async fn launch(path: &Path, timeout: Duration) -> Result<Self, ProviderError> {
        tracing::info!("Launching provider plugin {}", path.display());

        let versions = SUPPORTED_PROTOCOL_VERSIONS
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let mut child = Command::new(path)
            .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
            .env("PLUGIN_PROTOCOL_VERSIONS", versions)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ProviderError::Launch(format!("failed to start {}: {}", path.display(), e))
            })?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ProviderError::Launch("plugin output is not piped".to_string()));
        };
        drain("stderr", stderr);
        let mut stdout = BufReader::new(stdout);

        let mut line = String::new();
        let read = tokio::time::timeout(timeout, stdout.read_line(&mut line))
            .await
            .map_err(|_| ProviderError::Handshake("timed out waiting for handshake".to_string()))?
            .map_err(|e| ProviderError::Handshake(format!("failed to read handshake: {}", e)))?;
        if read == 0 {
            return Err(ProviderError::Handshake(
                "plugin exited before handshake".to_string(),
            ));
        }

        let handshake: Handshake = line.parse()?;
        handshake.validate()?;
        tracing::debug!("Plugin handshake ok: {:?}", handshake);
        drain("stdout", stdout);

        Ok(Self {
            child: Mutex::new(child),
            handshake,
        })
    }

    /// Wait for the plugin to exit, killing it after `grace`
    pub async fn wait_or_kill(&self, grace: Duration) {
        let mut child = self.child.lock().await;
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("Plugin exited with {}", status),
            Ok(Err(e)) => tracing::warn!("Failed to wait for plugin: {}", e),
            Err(_) => {
                tracing::warn!("Plugin did not exit, killing it");
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill plugin: {}", e);
                }
            }
        }
    }
}

/// Forward plugin output to the debug log until the pipe closes
fn drain<R>(stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!("plugin {}: {}", stream, line);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_handshake() {
        let handshake: Handshake = "1|5|unix|/tmp/plugin123|grpc|\n".parse().unwrap();

        assert_eq!(handshake.core_version, 1);
        assert_eq!(handshake.protocol_version, 5);
        assert_eq!(handshake.network, "unix");
        assert_eq!(handshake.address, "/tmp/plugin123");
        assert_eq!(handshake.server_cert, None);
        assert!(handshake.validate().is_ok());

        let tcp: Handshake = "1|5|tcp|127.0.0.1:1234|grpc".parse().unwrap();
        assert_eq!(tcp.address, "127.0.0.1:1234");
        assert!(tcp.validate().is_ok());
    }

    #[test]
    fn test_rejects_incompatible_handshakes() {
        assert!("garbage".parse::<Handshake>().is_err());
        assert!("x|5|unix|a|grpc".parse::<Handshake>().is_err());
        assert!("1|5|unix|a|grpc|cert|extra".parse::<Handshake>().is_err());

        for line in [
            "2|5|unix|/tmp/sock|grpc",
            "1|4|unix|/tmp/sock|grpc",
            "1|5|stdio|plugin|json",
            "1|5|unix|/tmp/sock|netrpc",
            "1|5|tcp|127.0.0.1:1234|grpc|MIIBcert",
        ] {
            let handshake: Handshake = line.parse().unwrap();
            assert!(
                matches!(handshake.validate(), Err(ProviderError::Handshake(_))),
                "{}",
                line
            );
        }
    }
}
