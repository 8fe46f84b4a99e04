//! Terraform provider client
//!
//! Owns the lifecycle of one provider plugin:
//! Uninstalled -> Installed -> Running -> Terminated.
//! The plugin is installed, launched and configured lazily on first use.
//! Every plugin call is bounded by a timeout; a call that overruns it
//! terminates the provider.

use super::connection::{GoPluginLauncher, PluginConnection, PluginLauncher};
use super::installer::ProviderInstaller;
use super::tfplugin5::{
    diagnostic::Severity, ConfigureRequest, Diagnostic, DynamicValue, ImportResourceStateRequest,
    ReadResourceRequest,
};
use super::value::ResourceSchema;
use super::{ProviderClient, ProviderError};
use crate::resource::Attributes;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Version reported to providers in `Configure`
pub const TERRAFORM_VERSION: &str = "0.15.5";

#[derive(Clone)]
struct Running {
    connection: Arc<dyn PluginConnection>,
    schemas: Arc<HashMap<String, Arc<ResourceSchema>>>,
}

impl Running {
    fn schema(&self, resource_type: &str) -> Result<Arc<ResourceSchema>, ProviderError> {
        self.schemas
            .get(resource_type)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownResourceType(resource_type.to_string()))
    }
}

enum State {
    Uninstalled,
    Installed(PathBuf),
    Running(Running),
    Terminated(String),
}

pub struct TerraformProvider {
    name: String,
    installer: ProviderInstaller,
    requested_version: Option<String>,
    /// Provider configuration block sent with `Configure`
    provider_config: Value,
    launcher: Arc<dyn PluginLauncher>,
    call_timeout: Duration,
    state: tokio::sync::Mutex<State>,
}

impl TerraformProvider {
    pub fn new(
        name: &str,
        installer: ProviderInstaller,
        requested_version: Option<String>,
        provider_config: Value,
    ) -> Self {
        Self {
            name: name.to_string(),
            installer,
            requested_version,
            provider_config,
            launcher: Arc::new(GoPluginLauncher::default()),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            state: tokio::sync::Mutex::new(State::Uninstalled),
        }
    }

    /// Provider for Google Cloud scoped to a project and region
    pub fn google(
        installer: ProviderInstaller,
        requested_version: Option<String>,
        project: &str,
        region: &str,
    ) -> Self {
        Self::new(
            "google",
            installer,
            requested_version,
            json!({ "project": project, "region": region }),
        )
    }

    pub fn with_handshake_timeout(self, timeout: Duration) -> Self {
        self.with_launcher(Arc::new(GoPluginLauncher::new(timeout)))
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn PluginLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Running plugin, starting it on first use
    async fn running(&self) -> Result<Running, ProviderError> {
        let mut state = self.state.lock().await;
        loop {
            match &*state {
                State::Running(running) => return Ok(running.clone()),
                State::Terminated(reason) => {
                    return Err(ProviderError::Unavailable(reason.clone()))
                }
                State::Uninstalled => {
                    match self
                        .installer
                        .install(self.requested_version.as_deref())
                        .await
                    {
                        Ok(path) => *state = State::Installed(path),
                        Err(e) => {
                            *state = State::Terminated(format!(
                                "{} provider install failed: {}",
                                self.name, e
                            ));
                            return Err(ProviderError::Install(e));
                        }
                    }
                }
                State::Installed(path) => match self.start(path.clone()).await {
                    Ok(running) => *state = State::Running(running),
                    Err(e) => {
                        *state = State::Terminated(format!(
                            "{} provider failed to start: {}",
                            self.name, e
                        ));
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Launch the plugin, load its schemas and configure it
    async fn start(&self, path: PathBuf) -> Result<Running, ProviderError> {
        let connection = self.launcher.launch(&path).await?;

        let response = timed("GetSchema", self.call_timeout, connection.get_schema()).await?;
        check_diagnostics("GetSchema", &response.diagnostics)?;
        let provider_schema = response
            .provider
            .map(ResourceSchema::try_from)
            .transpose()?
            .unwrap_or_default();
        let mut schemas = HashMap::new();
        for (resource_type, schema) in response.resource_schemas {
            schemas.insert(resource_type, Arc::new(ResourceSchema::try_from(schema)?));
        }
        tracing::debug!(
            "Provider {} serves {} resource types",
            self.name,
            schemas.len()
        );

        let request = ConfigureRequest {
            terraform_version: TERRAFORM_VERSION.to_string(),
            config: Some(provider_schema.encode(&self.provider_config)?),
        };
        let configured = timed("Configure", self.call_timeout, connection.configure(request)).await?;
        check_diagnostics("Configure", &configured.diagnostics)?;
        tracing::info!("Provider {} configured", self.name);

        Ok(Running {
            connection,
            schemas: Arc::new(schemas),
        })
    }

    /// Run one plugin call, terminating the provider if it overruns
    async fn call<T, F>(&self, method: &'static str, call: F) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let result = timed(method, self.call_timeout, call).await;
        if let Err(err @ ProviderError::Timeout { .. }) = &result {
            tracing::error!("Provider {} abandoned: {}", self.name, err);
            let mut state = self.state.lock().await;
            if let State::Running(_) = &*state {
                *state = State::Terminated(format!("{} provider abandoned: {}", self.name, err));
            }
        }
        result
    }

    /// State of an existing resource identified only by its id
    async fn import(
        &self,
        running: &Running,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<(DynamicValue, Vec<u8>)>, ProviderError> {
        let request = ImportResourceStateRequest {
            type_name: resource_type.to_string(),
            id: id.to_string(),
        };
        let response = self
            .call(
                "ImportResourceState",
                running.connection.import_resource_state(request),
            )
            .await?;
        check_diagnostics("ImportResourceState", &response.diagnostics)?;

        Ok(response
            .imported_resources
            .into_iter()
            .find(|imported| imported.type_name == resource_type)
            .and_then(|imported| imported.state.map(|state| (state, imported.private))))
    }
}

async fn timed<T, F>(method: &'static str, timeout: Duration, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(ProviderError::Timeout { method, timeout }))
}

/// Fail on the first error diagnostic, logging warnings
fn check_diagnostics(method: &str, diagnostics: &[Diagnostic]) -> Result<(), ProviderError> {
    let mut error = None;
    for diagnostic in diagnostics {
        match diagnostic.severity() {
            Severity::Error => {
                error.get_or_insert(diagnostic);
            }
            _ => tracing::warn!(
                "{} warning: {}: {}",
                method,
                diagnostic.summary,
                diagnostic.detail
            ),
        }
    }
    match error {
        Some(diagnostic) => Err(ProviderError::Diagnostic {
            summary: diagnostic.summary.clone(),
            detail: diagnostic.detail.clone(),
        }),
        None => Ok(()),
    }
}

#[async_trait]
impl ProviderClient for TerraformProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resource_schema(&self, resource_type: &str) -> Result<Arc<ResourceSchema>, ProviderError> {
        self.running().await?.schema(resource_type)
    }

    async fn read_resource(
        &self,
        resource_type: &str,
        id: &str,
        attributes: &Attributes,
    ) -> Result<Option<Attributes>, ProviderError> {
        let running = self.running().await?;
        let schema = running.schema(resource_type)?;

        let (current_state, private) = if attributes.is_empty() {
            match self.import(&running, resource_type, id).await? {
                Some(imported) => imported,
                None => return Ok(None),
            }
        } else {
            let mut state = attributes.clone().into_value();
            if let Value::Object(fields) = &mut state {
                fields.insert("id".to_string(), Value::from(id));
            }
            (schema.encode(&state)?, Vec::new())
        };

        let request = ReadResourceRequest {
            type_name: resource_type.to_string(),
            current_state: Some(current_state),
            private,
        };
        let response = self
            .call("ReadResource", running.connection.read_resource(request))
            .await?;
        check_diagnostics("ReadResource", &response.diagnostics)?;

        match response.new_state {
            Some(state) => Ok(schema.decode_dynamic(&state)?),
            None => Ok(None),
        }
    }

    async fn shutdown(&self) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(
            &mut *state,
            State::Terminated(format!("{} provider was shut down", self.name)),
        );

        if let State::Running(running) = previous {
            tracing::info!("Stopping provider {}", self.name);
            timed("Stop", self.call_timeout, running.connection.shutdown()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terraform::downloader::{DownloadError, ProviderDownloader};
    use crate::terraform::installer::{release_arch, release_os, ProviderConfig};
    use crate::terraform::tfplugin5::{
        schema, ConfigureResponse, GetProviderSchemaResponse, ImportResourceStateResponse,
        ImportedResource, ReadResourceResponse, Schema,
    };
    use crate::terraform::value::dynamic_to_json;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct UnpublishedDownloader;

    #[async_trait]
    impl ProviderDownloader for UnpublishedDownloader {
        async fn download(&self, url: &str, _: &Path, _: &[String]) -> Result<(), DownloadError> {
            Err(DownloadError::NotFound(url.to_string()))
        }
    }

    fn attribute(name: &str, ty: &str) -> schema::Attribute {
        schema::Attribute {
            name: name.to_string(),
            r#type: ty.as_bytes().to_vec(),
            optional: true,
            ..Default::default()
        }
    }

    fn wire_schema(attributes: Vec<schema::Attribute>) -> Schema {
        Schema {
            version: 0,
            block: Some(schema::Block {
                attributes,
                ..Default::default()
            }),
        }
    }

    fn msgpack(value: Value) -> DynamicValue {
        DynamicValue {
            msgpack: rmp_serde::to_vec(&value).unwrap(),
            json: Vec::new(),
        }
    }

    fn error_diagnostic(summary: &str, detail: &str) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error as i32,
            summary: summary.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Plugin answering reads by the `id` of the requested state
    #[derive(Default)]
    struct FakeConnection {
        configured: Mutex<Option<Value>>,
        read_states: Mutex<Vec<Value>>,
        imports: AtomicUsize,
        stops: AtomicUsize,
    }

    #[async_trait]
    impl PluginConnection for FakeConnection {
        async fn get_schema(&self) -> Result<GetProviderSchemaResponse, ProviderError> {
            let mut resource_schemas = HashMap::new();
            resource_schemas.insert(
                "google_storage_bucket".to_string(),
                wire_schema(vec![
                    attribute("id", r#""string""#),
                    attribute("name", r#""string""#),
                    attribute("force_destroy", r#""bool""#),
                    attribute("labels", r#"["map","string"]"#),
                ]),
            );
            Ok(GetProviderSchemaResponse {
                provider: Some(wire_schema(vec![
                    attribute("project", r#""string""#),
                    attribute("region", r#""string""#),
                    attribute("credentials", r#""string""#),
                ])),
                resource_schemas,
                ..Default::default()
            })
        }

        async fn configure(
            &self,
            request: ConfigureRequest,
        ) -> Result<ConfigureResponse, ProviderError> {
            let config = dynamic_to_json(&request.config.unwrap_or_default())?;
            *self.configured.lock().unwrap() = Some(config);
            Ok(ConfigureResponse::default())
        }

        async fn read_resource(
            &self,
            request: ReadResourceRequest,
        ) -> Result<ReadResourceResponse, ProviderError> {
            let state = dynamic_to_json(&request.current_state.unwrap_or_default())?;
            self.read_states.lock().unwrap().push(state.clone());

            let mut response = ReadResourceResponse::default();
            match state["id"].as_str() {
                Some("hang") => return std::future::pending().await,
                Some("gone") => response.new_state = Some(msgpack(Value::Null)),
                Some("denied") => response.diagnostics.push(error_diagnostic(
                    "Error when reading or editing Storage Bucket \"denied\"",
                    "googleapi: Error 403: forbidden",
                )),
                Some(id) => {
                    response.new_state = Some(msgpack(json!({
                        "id": id,
                        "name": id,
                        "force_destroy": "false",
                        "labels": {"env": "prod"},
                        "self_link": "dropped",
                    })))
                }
                None => {}
            }
            Ok(response)
        }

        async fn import_resource_state(
            &self,
            request: ImportResourceStateRequest,
        ) -> Result<ImportResourceStateResponse, ProviderError> {
            self.imports.fetch_add(1, Ordering::SeqCst);
            Ok(ImportResourceStateResponse {
                imported_resources: vec![ImportedResource {
                    type_name: request.type_name,
                    state: Some(msgpack(json!({"id": request.id}))),
                    private: Vec::new(),
                }],
                diagnostics: Vec::new(),
            })
        }

        async fn shutdown(&self) -> Result<(), ProviderError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeLauncher {
        connection: Arc<FakeConnection>,
        launches: AtomicUsize,
    }

    #[async_trait]
    impl PluginLauncher for FakeLauncher {
        async fn launch(&self, _: &Path) -> Result<Arc<dyn PluginConnection>, ProviderError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            Ok(self.connection.clone())
        }
    }

    /// Google provider with an installed binary under a temp home
    fn installed_provider(home: &Path) -> (TerraformProvider, Arc<FakeLauncher>) {
        let dir = home
            .join(".driftctl")
            .join("plugins")
            .join(format!("{}_{}", release_os(), release_arch()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("terraform-provider-google_v3.78.0"), b"").unwrap();

        let mut config = ProviderConfig::new("google", "3.78.0");
        config.config_dir = Some(home.to_path_buf());
        let launcher = Arc::new(FakeLauncher {
            connection: Arc::new(FakeConnection::default()),
            launches: AtomicUsize::new(0),
        });
        let provider = TerraformProvider::google(
            ProviderInstaller::new(config, Arc::new(UnpublishedDownloader)),
            None,
            "proj",
            "europe-west1",
        )
        .with_launcher(launcher.clone());
        (provider, launcher)
    }

    fn stub(name: &str) -> Attributes {
        Attributes::from_value(json!({ "name": name })).unwrap()
    }

    #[tokio::test]
    async fn test_provider_lifecycle() {
        let home = tempfile::tempdir().unwrap();
        let (provider, launcher) = installed_provider(home.path());

        let state = provider
            .read_resource("google_storage_bucket", "b1", &stub("b1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            state.into_value(),
            json!({"id": "b1", "name": "b1", "force_destroy": false, "labels": {"env": "prod"}})
        );

        let connection = &launcher.connection;
        assert_eq!(
            *connection.configured.lock().unwrap(),
            Some(json!({"project": "proj", "region": "europe-west1"}))
        );
        assert_eq!(
            connection.read_states.lock().unwrap()[0],
            json!({"id": "b1", "name": "b1"})
        );

        let schema = provider.resource_schema("google_storage_bucket").await.unwrap();
        assert!(schema.block.attributes.contains_key("labels"));
        assert!(matches!(
            provider.resource_schema("google_compute_network").await,
            Err(ProviderError::UnknownResourceType(_))
        ));
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);

        provider.shutdown().await.unwrap();
        assert_eq!(connection.stops.load(Ordering::SeqCst), 1);
        assert!(matches!(
            provider
                .read_resource("google_storage_bucket", "b1", &stub("b1"))
                .await,
            Err(ProviderError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_resource_reads_as_none() {
        let home = tempfile::tempdir().unwrap();
        let (provider, _) = installed_provider(home.path());

        let state = provider
            .read_resource("google_storage_bucket", "gone", &stub("gone"))
            .await
            .unwrap();
        assert!(state.is_none());
    }

    #[tokio::test]
    async fn test_bare_stub_is_imported_first() {
        let home = tempfile::tempdir().unwrap();
        let (provider, launcher) = installed_provider(home.path());

        let state = provider
            .read_resource("google_storage_bucket", "b2", &Attributes::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(state.get_str("name"), Some("b2"));
        assert_eq!(launcher.connection.imports.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_diagnostic_fails_the_read() {
        let home = tempfile::tempdir().unwrap();
        let (provider, _) = installed_provider(home.path());

        let err = provider
            .read_resource("google_storage_bucket", "denied", &stub("denied"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Diagnostic { .. }));
        assert!(err.is_access_denied());
        assert!(!err.is_provider_failure());

        // The provider stays usable
        assert!(provider
            .read_resource("google_storage_bucket", "b1", &stub("b1"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_stuck_call_times_out_and_terminates() {
        let home = tempfile::tempdir().unwrap();
        let (provider, launcher) = installed_provider(home.path());
        let provider = provider.with_call_timeout(Duration::from_millis(50));

        let err = provider
            .read_resource("google_storage_bucket", "hang", &stub("hang"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Timeout {
                method: "ReadResource",
                ..
            }
        ));
        assert!(err.is_provider_failure());

        let next = provider
            .read_resource("google_storage_bucket", "b1", &stub("b1"))
            .await
            .unwrap_err();
        assert!(matches!(next, ProviderError::Unavailable(ref reason) if reason.contains("ReadResource")));
        assert_eq!(launcher.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_install_failure_terminates_provider() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProviderConfig::new("google", "666.666.666");
        config.config_dir = Some(dir.path().to_path_buf());
        let provider = TerraformProvider::google(
            ProviderInstaller::new(config, Arc::new(UnpublishedDownloader)),
            None,
            "proj",
            "europe-west1",
        );

        let first = provider
            .read_resource("google_storage_bucket", "b", &Attributes::new())
            .await
            .unwrap_err();
        assert_eq!(first.to_string(), "Provider version 666.666.666 does not exist");

        let second = provider
            .resource_schema("google_storage_bucket")
            .await
            .unwrap_err();
        assert!(matches!(second, ProviderError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_shutdown_before_start() {
        let provider = TerraformProvider::new(
            "aws",
            ProviderInstaller::new(
                ProviderConfig::new("aws", "3.19.0"),
                Arc::new(UnpublishedDownloader),
            ),
            None,
            Value::Null,
        );

        provider.shutdown().await.unwrap();
        assert!(matches!(
            provider.resource_schema("aws_instance").await,
            Err(ProviderError::Unavailable(_))
        ));
    }
}
