//! Stdio MCP surface over the same search pipeline as the HTTP server.

use rmcp::{model::*, ServiceExt};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::types::*;
use crate::AppState;

#[derive(Clone)]
pub struct McpService {
    pub state: Arc<AppState>,
}

impl McpService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    async fn search_profiles(&self, arguments: Option<JsonObject>) -> Result<CallToolResult, ErrorData> {
        let args = arguments.ok_or_else(|| {
            ErrorData::new(
                ErrorCode::INVALID_PARAMS,
                "Missing required arguments object",
                None,
            )
        })?;
        let request: SearchRequest = serde_json::from_value(serde_json::Value::Object(args))
            .map_err(|e| {
                ErrorData::new(
                    ErrorCode::INVALID_PARAMS,
                    format!("Invalid arguments: {}", e),
                    None,
                )
            })?;

        let event = SearchEvent {
            username: Some("mcp".to_string()),
            ..Default::default()
        };
        match self.state.search(&request, event).await {
            Ok(report) => Ok(CallToolResult::success(vec![Content::text(format_report(&report))])),
            Err(e) => {
                error!("Search tool error: {}", e);
                Ok(CallToolResult::error(vec![Content::text(format!("Search failed: {}", e))]))
            }
        }
    }

    fn list_platforms(&self) -> CallToolResult {
        let text = self
            .state
            .config
            .platforms
            .iter()
            .map(|p| format!("- {} ({})", p.name, p.domains.join(", ")))
            .collect::<Vec<_>>()
            .join("\n");
        CallToolResult::success(vec![Content::text(text)])
    }
}

impl rmcp::ServerHandler for McpService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            server_info: Implementation {
                name: "profile-hunter".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Finds social-profile links for a username or name across Facebook, Instagram, Youtube, TikTok, Snapchat, Reddit, Twitter, Pinterest and LinkedIn.".to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _page: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: tools(),
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        info!("MCP tool call: {} with args: {:?}", request.name, request.arguments);

        match request.name.as_ref() {
            "search_profiles" => self.search_profiles(request.arguments).await,
            "list_platforms" => Ok(self.list_platforms()),
            _ => Err(ErrorData::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("Unknown tool: {}", request.name),
                None,
            )),
        }
    }
}

fn tools() -> Vec<Tool> {
    vec![
        Tool::new(
            "search_profiles",
            "Search every supported social platform for profile links matching a username or name. Returns up to `cap` links per platform.",
            schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "identifier": {
                        "type": "string",
                        "description": "Username or full name to look for"
                    },
                    "platforms": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Restrict the search to these platform names"
                    },
                    "cap": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Maximum links per platform"
                    }
                },
                "required": ["identifier"]
            })),
        ),
        Tool::new(
            "list_platforms",
            "List the supported platforms and the domains each one accepts.",
            schema(serde_json::json!({ "type": "object", "properties": {} })),
        ),
    ]
}

fn schema(value: serde_json::Value) -> Arc<JsonObject> {
    match value {
        serde_json::Value::Object(map) => Arc::new(map),
        _ => Arc::new(JsonObject::new()),
    }
}

fn format_report(report: &SearchReport) -> String {
    let total = report.total_links();
    if total == 0 {
        return format!("No profile links found for '{}'", report.identifier);
    }
    let mut text = format!("Found {} profile links for '{}':\n", total, report.identifier);
    for result in report.platforms.iter().filter(|p| !p.links.is_empty()) {
        text.push_str(&format!("\n**{}**\n", result.platform));
        for link in &result.links {
            text.push_str(&format!("{}. {}\n", link.rank + 1, link.url));
        }
    }
    text
}

/// Entry point for the stdio binary. Logs go to stderr since stdout
/// carries the protocol.
pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("Starting profile-hunter MCP service");
    let state = Arc::new(AppState::from_config(Config::from_env()).await?);
    let server = McpService::new(state).serve(rmcp::transport::stdio()).await?;
    info!("MCP stdio server running");
    let _quit_reason = server.waiting().await?;
    Ok(())
}
