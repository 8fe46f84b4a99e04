//! Plugin connections
//!
//! [`PluginLauncher`] turns an installed provider binary into a
//! [`PluginConnection`]. The default launcher runs the binary as a
//! go-plugin server and talks tfplugin5 gRPC to it over the socket named
//! in its handshake.

use super::plugin::{Handshake, PluginProcess, DEFAULT_HANDSHAKE_TIMEOUT};
use super::tfplugin5::{
    ConfigureRequest, ConfigureResponse, GetProviderSchemaResponse, ImportResourceStateRequest,
    ImportResourceStateResponse, ProviderGrpcClient, ReadResourceRequest, ReadResourceResponse,
};
use super::ProviderError;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One tfplugin5 session with a running provider
#[async_trait]
pub trait PluginConnection: Send + Sync {
    async fn get_schema(&self) -> Result<GetProviderSchemaResponse, ProviderError>;

    async fn configure(&self, request: ConfigureRequest)
        -> Result<ConfigureResponse, ProviderError>;

    async fn read_resource(
        &self,
        request: ReadResourceRequest,
    ) -> Result<ReadResourceResponse, ProviderError>;

    async fn import_resource_state(
        &self,
        request: ImportResourceStateRequest,
    ) -> Result<ImportResourceStateResponse, ProviderError>;

    /// Stop the plugin and wait for its process to exit
    async fn shutdown(&self) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait PluginLauncher: Send + Sync {
    async fn launch(&self, path: &Path) -> Result<Arc<dyn PluginConnection>, ProviderError>;
}

/// Launches provider binaries as go-plugin gRPC servers
pub struct GoPluginLauncher {
    handshake_timeout: Duration,
}

impl GoPluginLauncher {
    pub fn new(handshake_timeout: Duration) -> Self {
        Self { handshake_timeout }
    }
}

impl Default for GoPluginLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_TIMEOUT)
    }
}

#[async_trait]
impl PluginLauncher for GoPluginLauncher {
    async fn launch(&self, path: &Path) -> Result<Arc<dyn PluginConnection>, ProviderError> {
        let process = PluginProcess::launch(path, self.handshake_timeout).await?;
        let channel = connect(&process.handshake, self.handshake_timeout).await?;
        tracing::debug!(
            "Connected to plugin over {} at {}",
            process.handshake.network,
            process.handshake.address
        );
        Ok(Arc::new(GrpcConnection {
            process,
            client: tokio::sync::Mutex::new(ProviderGrpcClient::new(channel)),
        }))
    }
}

async fn connect(handshake: &Handshake, timeout: Duration) -> Result<Channel, ProviderError> {
    let failed = |e: tonic::transport::Error| {
        ProviderError::Launch(format!(
            "failed to connect to plugin at {}: {}",
            handshake.address, e
        ))
    };

    if handshake.network == "unix" {
        return connect_unix(&handshake.address, timeout).await;
    }
    Endpoint::from_shared(format!("http://{}", handshake.address))
        .map_err(failed)?
        .connect_timeout(timeout)
        .connect()
        .await
        .map_err(failed)
}

#[cfg(unix)]
async fn connect_unix(path: &str, timeout: Duration) -> Result<Channel, ProviderError> {
    use hyper_util::rt::TokioIo;
    use tokio::net::UnixStream;
    use tonic::transport::Uri;
    use tower::service_fn;

    let socket = path.to_string();
    // The URI is required by the builder but unused by the connector
    Endpoint::from_static("http://[::]:50051")
        .connect_timeout(timeout)
        .connect_with_connector(service_fn(move |_: Uri| {
            let socket = socket.clone();
            async move { Ok::<_, std::io::Error>(TokioIo::new(UnixStream::connect(socket).await?)) }
        }))
        .await
        .map_err(|e| {
            ProviderError::Launch(format!("failed to connect to plugin at {}: {}", path, e))
        })
}

#[cfg(not(unix))]
async fn connect_unix(path: &str, _: Duration) -> Result<Channel, ProviderError> {
    Err(ProviderError::Launch(format!(
        "unix socket {} is not supported on this platform",
        path
    )))
}

fn status_error(method: &'static str, status: Status) -> ProviderError {
    match status.code() {
        Code::Unavailable => ProviderError::Unavailable(format!(
            "{} failed: {}",
            method,
            status.message()
        )),
        code => ProviderError::Rpc {
            method,
            code,
            message: status.message().to_string(),
        },
    }
}

/// gRPC session with a plugin process; one call in flight at a time
struct GrpcConnection {
    process: PluginProcess,
    client: tokio::sync::Mutex<ProviderGrpcClient>,
}

#[async_trait]
impl PluginConnection for GrpcConnection {
    async fn get_schema(&self) -> Result<GetProviderSchemaResponse, ProviderError> {
        let mut client = self.client.lock().await;
        client
            .get_schema()
            .await
            .map_err(|s| status_error("GetSchema", s))
    }

    async fn configure(
        &self,
        request: ConfigureRequest,
    ) -> Result<ConfigureResponse, ProviderError> {
        let mut client = self.client.lock().await;
        client
            .configure(request)
            .await
            .map_err(|s| status_error("Configure", s))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequest,
    ) -> Result<ReadResourceResponse, ProviderError> {
        let mut client = self.client.lock().await;
        client
            .read_resource(request)
            .await
            .map_err(|s| status_error("ReadResource", s))
    }

    async fn import_resource_state(
        &self,
        request: ImportResourceStateRequest,
    ) -> Result<ImportResourceStateResponse, ProviderError> {
        let mut client = self.client.lock().await;
        client
            .import_resource_state(request)
            .await
            .map_err(|s| status_error("ImportResourceState", s))
    }

    async fn shutdown(&self) -> Result<(), ProviderError> {
        let mut client = self.client.lock().await;
        let stopped = client.stop().await;
        if let Err(e) = client.shutdown_plugin().await {
            tracing::debug!("Plugin controller shutdown failed: {}", e);
        }
        drop(client);
        self.process.wait_or_kill(SHUTDOWN_GRACE).await;

        let response = stopped.map_err(|s| status_error("Stop", s))?;
        if !response.error.is_empty() {
            return Err(ProviderError::Rpc {
                method: "Stop",
                code: Code::Unknown,
                message: response.error,
            });
        }
        Ok(())
    }
}
