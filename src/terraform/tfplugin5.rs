//! tfplugin5 protocol messages and client
//!
//! The subset of `tfplugin5.proto` used to read resource state, plus the
//! go-plugin controller used to stop the plugin process.

use std::collections::HashMap;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

/// Typed value serialized with msgpack (preferred) or JSON
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DynamicValue {
    #[prost(bytes = "vec", tag = "1")]
    pub msgpack: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub json: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Diagnostic {
    #[prost(enumeration = "diagnostic::Severity", tag = "1")]
    pub severity: i32,
    #[prost(string, tag = "2")]
    pub summary: String,
    #[prost(string, tag = "3")]
    pub detail: String,
}

pub mod diagnostic {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Severity {
        Invalid = 0,
        Error = 1,
        Warning = 2,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Schema {
    #[prost(int64, tag = "1")]
    pub version: i64,
    #[prost(message, optional, tag = "2")]
    pub block: Option<schema::Block>,
}

pub mod schema {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Block {
        #[prost(int64, tag = "1")]
        pub version: i64,
        #[prost(message, repeated, tag = "2")]
        pub attributes: Vec<Attribute>,
        #[prost(message, repeated, tag = "3")]
        pub block_types: Vec<NestedBlock>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Attribute {
        #[prost(string, tag = "1")]
        pub name: String,
        /// JSON type expression
        #[prost(bytes = "vec", tag = "2")]
        pub r#type: Vec<u8>,
        #[prost(string, tag = "3")]
        pub description: String,
        #[prost(bool, tag = "4")]
        pub required: bool,
        #[prost(bool, tag = "5")]
        pub optional: bool,
        #[prost(bool, tag = "6")]
        pub computed: bool,
        #[prost(bool, tag = "7")]
        pub sensitive: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NestedBlock {
        #[prost(string, tag = "1")]
        pub type_name: String,
        #[prost(message, optional, tag = "2")]
        pub block: Option<Block>,
        #[prost(enumeration = "nested_block::NestingMode", tag = "3")]
        pub nesting: i32,
        #[prost(int64, tag = "4")]
        pub min_items: i64,
        #[prost(int64, tag = "5")]
        pub max_items: i64,
    }

    pub mod nested_block {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum NestingMode {
            Invalid = 0,
            Single = 1,
            List = 2,
            Set = 3,
            Map = 4,
            Group = 5,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetProviderSchemaRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetProviderSchemaResponse {
    #[prost(message, optional, tag = "1")]
    pub provider: Option<Schema>,
    #[prost(map = "string, message", tag = "2")]
    pub resource_schemas: HashMap<String, Schema>,
    #[prost(map = "string, message", tag = "3")]
    pub data_source_schemas: HashMap<String, Schema>,
    #[prost(message, repeated, tag = "4")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigureRequest {
    #[prost(string, tag = "1")]
    pub terraform_version: String,
    #[prost(message, optional, tag = "2")]
    pub config: Option<DynamicValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ConfigureResponse {
    #[prost(message, repeated, tag = "1")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadResourceRequest {
    #[prost(string, tag = "1")]
    pub type_name: String,
    #[prost(message, optional, tag = "2")]
    pub current_state: Option<DynamicValue>,
    #[prost(bytes = "vec", tag = "3")]
    pub private: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadResourceResponse {
    #[prost(message, optional, tag = "1")]
    pub new_state: Option<DynamicValue>,
    #[prost(message, repeated, tag = "2")]
    pub diagnostics: Vec<Diagnostic>,
    #[prost(bytes = "vec", tag = "3")]
    pub private: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImportResourceStateRequest {
    #[prost(string, tag = "1")]
    pub type_name: String,
    #[prost(string, tag = "2")]
    pub id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImportedResource {
    #[prost(string, tag = "1")]
    pub type_name: String,
    #[prost(message, optional, tag = "2")]
    pub state: Option<DynamicValue>,
    #[prost(bytes = "vec", tag = "3")]
    pub private: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ImportResourceStateResponse {
    #[prost(message, repeated, tag = "1")]
    pub imported_resources: Vec<ImportedResource>,
    #[prost(message, repeated, tag = "2")]
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StopRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StopResponse {
    #[prost(string, tag = "1")]
    pub error: String,
}

/// `google.protobuf.Empty`, used by the go-plugin controller
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Empty {}

pub const GET_SCHEMA: &str = "/tfplugin5.Provider/GetSchema";
pub const CONFIGURE: &str = "/tfplugin5.Provider/Configure";
pub const READ_RESOURCE: &str = "/tfplugin5.Provider/ReadResource";
pub const IMPORT_RESOURCE_STATE: &str = "/tfplugin5.Provider/ImportResourceState";
pub const STOP: &str = "/tfplugin5.Provider/Stop";
pub const CONTROLLER_SHUTDOWN: &str = "/plugin.GRPCController/Shutdown";

/// Unary client for the `tfplugin5.Provider` service
#[derive(Debug, Clone)]
pub struct ProviderGrpcClient {
    inner: tonic::client::Grpc<Channel>,
}

impl ProviderGrpcClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    async fn unary<Req, Resp>(&mut self, request: Req, path: &'static str) -> Result<Resp, tonic::Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        self.inner
            .ready()
            .await
            .map_err(|e| tonic::Status::unavailable(format!("plugin not ready: {}", e)))?;
        let codec = tonic::codec::ProstCodec::default();
        let response = self
            .inner
            .unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(path),
                codec,
            )
            .await?;
        Ok(response.into_inner())
    }

    pub async fn get_schema(&mut self) -> Result<GetProviderSchemaResponse, tonic::Status> {
        self.unary(GetProviderSchemaRequest {}, GET_SCHEMA).await
    }

    pub async fn configure(
        &mut self,
        request: ConfigureRequest,
    ) -> Result<ConfigureResponse, tonic::Status> {
        self.unary(request, CONFIGURE).await
    }

    pub async fn read_resource(
        &mut self,
        request: ReadResourceRequest,
    ) -> Result<ReadResourceResponse, tonic::Status> {
        self.unary(request, READ_RESOURCE).await
    }

    pub async fn import_resource_state(
        &mut self,
        request: ImportResourceStateRequest,
    ) -> Result<ImportResourceStateResponse, tonic::Status> {
        self.unary(request, IMPORT_RESOURCE_STATE).await
    }

    pub async fn stop(&mut self) -> Result<StopResponse, tonic::Status> {
        self.unary(StopRequest {}, STOP).await
    }

    /// Ask go-plugin to exit the plugin process
    pub async fn shutdown_plugin(&mut self) -> Result<Empty, tonic::Status> {
        self.unary(Empty {}, CONTROLLER_SHUTDOWN).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_nesting_mode_accessor() {
        let nested = schema::NestedBlock {
            type_name: "settings".to_string(),
            block: None,
            nesting: schema::nested_block::NestingMode::List as i32,
            min_items: 0,
            max_items: 1,
        };
        assert_eq!(nested.nesting(), schema::nested_block::NestingMode::List);

        let unknown = schema::NestedBlock {
            nesting: 42,
            ..nested
        };
        assert_eq!(unknown.nesting(), schema::nested_block::NestingMode::Invalid);
    }

    #[test]
    fn test_read_request_wire_format() {
        let request = ReadResourceRequest {
            type_name: "google_storage_bucket".to_string(),
            current_state: Some(DynamicValue {
                msgpack: vec![0xc0],
                json: Vec::new(),
            }),
            private: Vec::new(),
        };

        let bytes = request.encode_to_vec();
        // field 1, length-delimited
        assert_eq!(bytes[0], 0x0a);
        assert_eq!(ReadResourceRequest::decode(bytes.as_slice()).unwrap(), request);
    }
}
