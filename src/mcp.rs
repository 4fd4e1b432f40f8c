//! MCP binding over stdio.
//!
//! * **Tools**: `query_vector_store` (embed + search + format).
//! * **Resources**: `qdrant://collections` (collection list) and the
//!   template `qdrant://collections/{collectionName}` (collection info).
//!
//! stdout carries the JSON-RPC stream; all logging goes to stderr.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::transport::stdio;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};
use serde_json::json;
use tracing::info;

use crate::config::Config;
use crate::handler::{QueryHandler, ToolResponse, QUERY_TOOL};

pub const SERVER_NAME: &str = "qdrant-search";
pub const COLLECTIONS_URI: &str = "qdrant://collections";
pub const COLLECTION_URI_TEMPLATE: &str = "qdrant://collections/{collectionName}";

/// Bridges the [`QueryHandler`] to the MCP JSON-RPC protocol.
#[derive(Clone)]
pub struct McpBridge {
    handler: Arc<QueryHandler>,
}

/// What a resource URI addresses.
#[derive(Debug, PartialEq, Eq)]
pub enum ResourceTarget<'a> {
    Collections,
    Collection(&'a str),
    /// `qdrant://collections/` with nothing after the slash.
    MissingName,
}

/// Resolve a `qdrant://collections[/<name>]` URI.
pub fn parse_resource_uri(uri: &str) -> Option<ResourceTarget<'_>> {
    let rest = uri.strip_prefix(COLLECTIONS_URI)?;
    if rest.is_empty() {
        return Some(ResourceTarget::Collections);
    }
    let rest = rest.strip_prefix('/')?;
    let path = rest.split(['?', '#']).next().unwrap_or_default();
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => Some(ResourceTarget::Collection(name)),
        _ => Some(ResourceTarget::MissingName),
    }
}

impl McpBridge {
    pub fn new(handler: Arc<QueryHandler>) -> Self {
        Self { handler }
    }

    /// Run a tool call. Only `query_vector_store` is advertised; other names
    /// come back as an error-flagged result.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        if name != QUERY_TOOL {
            return Ok(Self::to_call_result(ToolResponse::error(format!(
                "Unsupported tool: {}",
                name
            ))));
        }

        let params = serde_json::Value::Object(arguments.unwrap_or_default());
        let response = self
            .handler
            .call(name, params)
            .await
            .map_err(|e| McpError::invalid_params(format!("{:#}", e), None))?;

        Ok(Self::to_call_result(response))
    }

    /// Text of the resource at `uri`. Backend failures are reported in the
    /// text; only URIs outside `qdrant://collections` are protocol errors.
    pub async fn read_text(&self, uri: &str) -> Result<String, McpError> {
        match parse_resource_uri(uri) {
            Some(ResourceTarget::Collections) => {
                Ok(self.handler.list_collections().await.first_text().to_string())
            }
            Some(ResourceTarget::Collection(name)) => {
                Ok(self.handler.collection_info(name).await.first_text().to_string())
            }
            Some(ResourceTarget::MissingName) => {
                Ok("Error: collectionName parameter is missing in URI.".to_string())
            }
            None => Err(McpError::new(
                ErrorCode::RESOURCE_NOT_FOUND,
                format!("no resource at uri: {}", uri),
                None,
            )),
        }
    }

    fn query_tool() -> Tool {
        let schema = json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question to ask about the indexed documentation."
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Maximum number of results to return (default: 5)."
                },
                "filter_type": {
                    "type": "string",
                    "description": "Filter by document type (api, database, manual, relationship)."
                }
            },
            "required": ["query"]
        });
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> = match schema {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::new()),
        };

        Tool {
            name: Cow::Borrowed(QUERY_TOOL),
            title: None,
            description: Some(Cow::Borrowed(
                "Search the vector store for passages relevant to a natural-language question.",
            )),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(true)),
            execution: None,
            icons: None,
            meta: None,
        }
    }

    fn collections_resource() -> Resource {
        let mut raw = RawResource::new(COLLECTIONS_URI, "list_collections");
        raw.description = Some("Names of all collections in the vector store".to_string());
        raw.mime_type = Some("text/plain".to_string());
        raw.no_annotation()
    }

    fn collection_template() -> Result<ResourceTemplate, McpError> {
        serde_json::from_value(json!({
            "uriTemplate": COLLECTION_URI_TEMPLATE,
            "name": "collection_info",
            "description": "Vector size, distance metric and point count of one collection",
            "mimeType": "text/plain"
        }))
        .map_err(|e| McpError::internal_error(e.to_string(), None))
    }

    fn text_contents(uri: &str, text: impl Into<String>) -> ResourceContents {
        let mut contents = ResourceContents::text(text, uri);
        if let ResourceContents::TextResourceContents { mime_type, .. } = &mut contents {
            *mime_type = Some("text/plain".to_string());
        }
        contents
    }

    fn to_call_result(response: ToolResponse) -> CallToolResult {
        let content: Vec<Content> = response
            .content
            .into_iter()
            .map(|c| Content::text(c.text))
            .collect();

        if response.is_error {
            return CallToolResult::error(content);
        }

        let mut result = CallToolResult::success(content);
        if let Some(data) = response.data {
            result.structured_content = serde_json::to_value(data).ok();
        }
        result
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                title: Some("Qdrant Search".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Semantic search over a Qdrant collection. Use query_vector_store to ask a \
                 question; read qdrant://collections to list collections and \
                 qdrant://collections/{collectionName} to inspect one."
                    .to_string(),
            ),
        }
    }

    // ── Tools ────────────────────────────────────────────────────────────

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(vec![Self::query_tool()])))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        (name == QUERY_TOOL).then(Self::query_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.call(&request.name, request.arguments).await
    }

    // ── Resources ────────────────────────────────────────────────────────

    fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListResourcesResult::with_all_items(vec![
            Self::collections_resource(),
        ])))
    }

    fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourceTemplatesResult, McpError>> + Send + '_
    {
        std::future::ready(
            Self::collection_template()
                .map(|template| ListResourceTemplatesResult::with_all_items(vec![template])),
        )
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let uri = request.uri.as_str();
        let text = self.read_text(uri).await?;
        Ok(ReadResourceResult {
            contents: vec![Self::text_contents(uri, text)],
        })
    }
}

/// Serve the MCP protocol on stdin/stdout until the client disconnects.
pub async fn run_stdio(config: &Config) -> anyhow::Result<()> {
    let handler = Arc::new(QueryHandler::from_config(config)?);
    info!(
        collection = %config.qdrant.collection,
        "MCP server '{}' initializing", SERVER_NAME
    );

    let service = McpBridge::new(handler).serve(stdio()).await?;
    info!("MCP server '{}' is running and connected via stdio", SERVER_NAME);
    service.waiting().await?;

    Ok(())
}
