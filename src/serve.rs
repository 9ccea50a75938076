//! HTTP server for the migration graph viewer
//!
//! `strata serve` → starts server, shows the revision graph and an editor for
//! the alembic ini file. Every request re-runs alembic; nothing is cached.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tiny_http::{Header, Method, Request, Response, Server};

use crate::config::Config;
use crate::graph::RevisionGraph;
use crate::ini::{self, Sections};
use crate::revision::Revision;
use crate::runner::{AlembicCli, OutputLog};
use crate::source::MigrationState;

#[derive(Serialize)]
struct ApiResponse<T> {
    ok: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

const GRAPH_VIEWER_HTML: &str = include_str!("viewer.html");

/// Everything a request handler needs to reach alembic
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub config: Config,
    pub root: PathBuf,
    pub log: OutputLog,
}

impl ServerContext {
    fn cli(&self) -> AlembicCli {
        AlembicCli::from_config(&self.config, &self.root, self.log.clone())
    }

    fn ini_path(&self) -> PathBuf {
        self.root.join(&self.config.config_file)
    }

    fn load_state(&self) -> crate::Result<MigrationState> {
        MigrationState::load(&self.cli())
    }

    fn graph(&self) -> crate::Result<RevisionGraph> {
        Ok(self.load_state()?.graph(&self.config.display()))
    }

    fn revisions(&self) -> crate::Result<Vec<Revision>> {
        Ok(self.load_state()?.revisions)
    }

    fn settings(&self) -> crate::Result<Sections> {
        Ok(ini::read_file(&self.ini_path())?)
    }
}

/// Start the graph viewer server
pub fn start_graph_server(port: u16, ctx: ServerContext) -> std::io::Result<()> {
    let addr = format!("127.0.0.1:{}", port);
    let server = Server::http(&addr).map_err(|e| std::io::Error::other(e.to_string()))?;

    let url = format!("http://localhost:{}", port);

    eprintln!("\n\x1b[1;32m▤ strata\x1b[0m");
    eprintln!("   Graph viewer: {}", url);
    eprintln!("   Press Ctrl+C to stop\n");
    tracing::info!(%url, "graph viewer listening");

    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, &ctx) {
            tracing::error!(error = %e, "request failed");
        }
    }

    Ok(())
}

fn content_type(value: &str) -> Option<Header> {
    Header::from_bytes(&b"Content-Type"[..], value.as_bytes()).ok()
}

fn respond_json<T: Serialize>(request: Request, body: &ApiResponse<T>, status: u16) -> std::io::Result<()> {
    let json = serde_json::to_string(body)?;
    let mut response = Response::from_string(json).with_status_code(status);
    if let Some(header) = content_type("application/json") {
        response = response.with_header(header);
    }
    request.respond(response)
}

/// Convert a handler result into a JSON response, logging failures
fn respond_result<T: Serialize>(request: Request, result: crate::Result<T>) -> std::io::Result<()> {
    match result {
        Ok(data) => respond_json(request, &ApiResponse::success(data), 200),
        Err(e) => {
            tracing::error!(error = %e, path = request.url(), "api call failed");
            respond_json(request, &ApiResponse::<()>::failure(e), 500)
        }
    }
}

fn handle_request(request: Request, ctx: &ServerContext) -> std::io::Result<()> {
    let url = request.url().to_string();
    let path = url.split('?').next().unwrap_or("/");
    let method = request.method().clone();
    tracing::debug!(%method, path, "request");

    match (&method, path) {
        (&Method::Get, "/") | (&Method::Get, "/graph") => {
            let mut response = Response::from_string(GRAPH_VIEWER_HTML);
            if let Some(header) = content_type("text/html; charset=utf-8") {
                response = response.with_header(header);
            }
            request.respond(response)
        }

        (&Method::Get, "/api/graph") => respond_result(request, ctx.graph()),

        (&Method::Get, "/api/revisions") => respond_result(request, ctx.revisions()),

        (&Method::Get, "/api/settings") => respond_result(request, ctx.settings()),

        (&Method::Post, "/api/settings") => handle_update_settings(request, ctx),

        _ => {
            let response = Response::from_string("Not found").with_status_code(404);
            request.respond(response)
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateSettingsRequest {
    #[serde(default = "default_section")]
    section: String,
    updates: BTreeMap<String, String>,
}

fn default_section() -> String {
    "alembic".to_string()
}

fn handle_update_settings(mut request: Request, ctx: &ServerContext) -> std::io::Result<()> {
    let mut body = String::new();
    if let Err(e) = request.as_reader().read_to_string(&mut body) {
        return respond_json(request, &ApiResponse::<()>::failure(format!("Failed to read body: {}", e)), 400);
    }

    let (status, response) = update_settings(ctx, &body);
    if status >= 500 {
        tracing::error!(error = ?response.error, "settings update failed");
    }
    respond_json(request, &response, status)
}

/// Apply a settings update body. Bad input is the client's fault (400); an
/// unreadable or unwritable ini file is ours (500).
fn update_settings(ctx: &ServerContext, body: &str) -> (u16, ApiResponse<Sections>) {
    let req: UpdateSettingsRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return (400, ApiResponse::failure(format!("Invalid JSON: {}", e))),
    };

    let updates: Vec<(String, String)> = req.updates.into_iter().collect();
    match ini::patch_file(&ctx.ini_path(), &req.section, &updates) {
        Ok(text) => (200, ApiResponse::success(ini::parse(&text))),
        Err(e) if e.is_invalid_input() => (400, ApiResponse::failure(e)),
        Err(e) => (500, ApiResponse::failure(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response: ApiResponse<String> = ApiResponse::success("hello".to_string());
        assert!(response.ok);
        assert_eq!(response.data, Some("hello".to_string()));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_api_response_failure() {
        let response = ApiResponse::<()>::failure("boom");
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_graph_payload_shape() {
        let graph = RevisionGraph::default();
        let json = serde_json::to_string(&ApiResponse::success(graph)).unwrap();
        assert_eq!(json, r#"{"ok":true,"data":{"nodes":[],"edges":[]},"error":null}"#);
    }

    #[test]
    fn test_update_request_defaults_section() {
        let req: UpdateSettingsRequest = serde_json::from_str(r#"{"updates": {"script_location": "db"}}"#).unwrap();
        assert_eq!(req.section, "alembic");
        assert_eq!(req.updates["script_location"], "db");
    }

    #[test]
    fn test_settings_read_from_ini() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alembic.ini"), "[alembic]\nscript_location = db\n").unwrap();
        let ctx = ServerContext {
            config: Config::default(),
            root: dir.path().to_path_buf(),
            log: OutputLog::discard(),
        };
        let sections = ctx.settings().unwrap();
        assert_eq!(sections["alembic"]["script_location"], "db");
    }

    fn ctx_with_ini(dir: &std::path::Path, text: &str) -> ServerContext {
        std::fs::write(dir.join("alembic.ini"), text).unwrap();
        ServerContext {
            config: Config::default(),
            root: dir.to_path_buf(),
            log: OutputLog::discard(),
        }
    }

    #[test]
    fn test_update_settings_writes_ini() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_ini(dir.path(), "[alembic]\nscript_location = db\n");
        let (status, response) = update_settings(&ctx, r#"{"updates": {" timezone ": "UTC"}}"#);
        assert_eq!(status, 200);
        assert_eq!(response.data.unwrap()["alembic"]["timezone"], "UTC");
        let text = std::fs::read_to_string(dir.path().join("alembic.ini")).unwrap();
        assert_eq!(text, "[alembic]\nscript_location = db\ntimezone = UTC\n");
    }

    #[test]
    fn test_update_settings_rejects_bad_key() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_ini(dir.path(), "[alembic]\nscript_location = db\n");
        for body in [
            r#"{"updates": {"a=b": "c"}}"#,
            r#"{"updates": {"": "c"}}"#,
            r##"{"updates": {"#x": "c"}}"##,
        ] {
            let (status, response) = update_settings(&ctx, body);
            assert_eq!(status, 400, "{}", body);
            assert!(!response.ok);
        }
        let text = std::fs::read_to_string(dir.path().join("alembic.ini")).unwrap();
        assert_eq!(text, "[alembic]\nscript_location = db\n");
    }

    #[test]
    fn test_update_settings_bad_json_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ServerContext {
            config: Config::default(),
            root: dir.path().to_path_buf(),
            log: OutputLog::discard(),
        };
        assert_eq!(update_settings(&ctx, "not json").0, 400);
        assert_eq!(update_settings(&ctx, r#"{"updates": {"a": "b"}}"#).0, 500);
    }

    #[test]
    fn test_viewer_html_is_valid() {
        assert!(GRAPH_VIEWER_HTML.contains("<!DOCTYPE html>"));
        assert!(GRAPH_VIEWER_HTML.contains("</html>"));
        assert!(GRAPH_VIEWER_HTML.contains("/api/graph"));
        assert!(GRAPH_VIEWER_HTML.contains("/api/settings"));
    }
}
