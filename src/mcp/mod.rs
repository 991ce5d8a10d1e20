//! MCP (Model Context Protocol) tool layer over the vault core.
//!
//! Read-only tools answer from the shadow cache and the workflow engine.
//! `force_trigger` and `force_flush_commit` are the only mutating tools.
//! The server speaks stdio; logs go to stderr.

use rmcp::{
    ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ErrorData as McpError, *},
    schemars, tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::DocumentQuery;
use crate::vault::VaultCore;

const DEFAULT_QUERY_LIMIT: usize = 50;

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct QueryDocumentsRequest {
    /// Only documents whose path starts with this prefix (e.g. "projects/")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
    /// Frontmatter `type` value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    /// Frontmatter `status` value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Documents must carry all of these tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Documents linking to this vault-relative path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links_to: Option<String>,
    /// Documents linked from this vault-relative path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_from: Option<String>,
    /// Filter on frontmatter parse failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_parse_error: Option<bool>,
    /// Maximum number of results (default: 50)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_QUERY_LIMIT
}

impl From<QueryDocumentsRequest> for DocumentQuery {
    fn from(req: QueryDocumentsRequest) -> Self {
        DocumentQuery {
            path_prefix: req.path_prefix,
            doc_type: req.doc_type,
            status: req.status,
            tags: req.tags,
            links_to: req.links_to,
            linked_from: req.linked_from,
            has_parse_error: req.has_parse_error,
            limit: Some(req.limit),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GetDocumentRequest {
    /// Vault-relative path, e.g. "notes/idea.md"
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct EmptyRequest {}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GetExecutionRequest {
    /// Execution id returned by dispatch or force_trigger
    pub execution_id: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct ForceTriggerRequest {
    /// Id of a registered workflow
    pub workflow_id: String,
    /// Input handed to the workflow; a "path" field is recorded as the triggering path
    #[serde(default)]
    pub input: serde_json::Value,
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    serde_json::to_string_pretty(value)
        .map(|text| CallToolResult::success(vec![Content::text(text)]))
        .map_err(|e| McpError::internal_error(format!("failed to serialize result: {e}"), None))
}

fn error_result(message: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message.into())])
}

#[derive(Clone)]
pub struct VaultToolServer {
    core: Arc<VaultCore>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl VaultToolServer {
    pub fn new(core: Arc<VaultCore>) -> Self {
        Self {
            core,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Query indexed vault documents by path prefix, type, status, tags, or links")]
    pub async fn query_documents(
        &self,
        Parameters(request): Parameters<QueryDocumentsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let docs = self.core.query(&request.into());
        json_result(&docs)
    }

    #[tool(description = "Get one indexed document with its frontmatter, tags, and links")]
    pub async fn get_document(
        &self,
        Parameters(GetDocumentRequest { path }): Parameters<GetDocumentRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.core.get(&path) {
            Some(doc) => json_result(&doc),
            None => Ok(error_result(format!("Document not indexed: {path}"))),
        }
    }

    #[tool(description = "Counts of indexed files, tags, links, parse errors, and dangling links")]
    pub async fn cache_stats(
        &self,
        Parameters(_params): Parameters<EmptyRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.core.stats())
    }

    #[tool(description = "List registered workflows with their triggers and path filters")]
    pub async fn list_workflows(
        &self,
        Parameters(_params): Parameters<EmptyRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.core.list_workflows())
    }

    #[tool(description = "Get the status of a workflow execution")]
    pub async fn get_execution(
        &self,
        Parameters(GetExecutionRequest { execution_id }): Parameters<GetExecutionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let Ok(id) = Uuid::parse_str(execution_id.trim()) else {
            return Ok(error_result(format!("Invalid execution id: {execution_id}")));
        };
        match self.core.get_execution(&id) {
            Some(execution) => json_result(&execution),
            None => Ok(error_result(format!(
                "Execution not found (it may have been evicted from history): {execution_id}"
            ))),
        }
    }

    #[tool(description = "Run a workflow now with the given input; returns an execution id to poll")]
    pub async fn force_trigger(
        &self,
        Parameters(ForceTriggerRequest { workflow_id, input }): Parameters<ForceTriggerRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.core.force_trigger(&workflow_id, input).await {
            Ok(id) => json_result(&serde_json::json!({ "execution_id": id })),
            Err(e) => Ok(error_result(e.to_string())),
        }
    }

    #[tool(description = "Commit pending vault changes immediately, bypassing the debounce window")]
    pub async fn force_flush_commit(
        &self,
        Parameters(_params): Parameters<EmptyRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.core.force_flush_commit().await {
            Ok(report) => json_result(&report),
            Err(e) => Ok(error_result(e.to_string())),
        }
    }

    #[tool(description = "Auto-commit state: pending paths, time to flush, preserved paths, last flush")]
    pub async fn commit_status(
        &self,
        Parameters(_params): Parameters<EmptyRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.core.commit_status() {
            Some(status) => json_result(&status),
            None => Ok(error_result("Auto-commit is disabled")),
        }
    }
}

#[tool_handler]
impl ServerHandler for VaultToolServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_protocol_version(ProtocolVersion::V_2024_11_05)
            .with_server_info(
                Implementation::new("weave", env!("CARGO_PKG_VERSION"))
                    .with_title("Weave Vault Core"),
            )
            .with_instructions(
                "This server exposes a markdown vault's index and automations. \
                Use 'query_documents' to find notes by tag, type, status, or links, and \
                'get_document' for one note's metadata and backlinks. \
                'list_workflows' and 'get_execution' show automation state; \
                'force_trigger' runs a workflow on demand. \
                'commit_status' and 'force_flush_commit' inspect and flush pending version-control commits."
                    .to_string(),
            )
    }
}

/// Serve the tools over stdio until the client disconnects.
pub async fn serve_stdio(core: Arc<VaultCore>) -> anyhow::Result<()> {
    use rmcp::transport::stdio;

    let service = VaultToolServer::new(core)
        .serve(stdio())
        .await
        .map_err(|e| anyhow::anyhow!("failed to start MCP server: {e}"))?;
    service
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;
    Ok(())
}
