use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use access_policy::{check_project_access, AccessDecision, ProjectStore, RequestUser};
use anyhow::Context;
use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};
use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use http::header::{HeaderName, ACCEPT_ENCODING, CONNECTION, CONTENT_LENGTH};
use http::HeaderMap;
use tokio::net::TcpListener;
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;
use uuid::Uuid;

use crate::auth::Authenticator;
use crate::capabilities::CapabilitiesRewriter;
use crate::director::Director;
use crate::error::GateError;
use crate::gate::inspect_request;
use crate::request::{set_content_length, OwsOperation, OwsRequest};

const COMPONENT: &str = "ows-proxy";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Settings of the HTTP front of the gate.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Service endpoint of the internal map renderer.
    pub renderer_url: Url,
    /// Directory under which the renderer finds `{owner}/{project}/{file}`.
    pub map_root: String,
    /// Trusted identity header; stripped before forwarding.
    pub identity_header: HeaderName,
    /// Public address advertised in capability documents, if it differs
    /// from the renderer's.
    pub public_base_url: Option<Url>,
    pub max_body_bytes: usize,
    pub renderer_timeout: Duration,
}

struct AppState {
    store: Arc<dyn ProjectStore>,
    auth: Arc<dyn Authenticator>,
    director: Director,
    capabilities: CapabilitiesRewriter,
    client: reqwest::Client,
    max_body_bytes: usize,
    audit: AuditSink,
}

/// HTTP server exposing `/ows/{owner}/{project}` for every published
/// project.
///
/// Each request is authenticated, checked against the project's access
/// roles, narrowed where needed and then forwarded to the renderer. Requests
/// that fail a check are answered here and never reach the renderer.
pub struct Gateway {
    state: Arc<AppState>,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn ProjectStore>,
        auth: Arc<dyn Authenticator>,
        audit: AuditSink,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.renderer_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to build renderer client")?;
        let capabilities = CapabilitiesRewriter::new(config.public_base_url)
            .context("failed to compile capabilities pattern")?;
        let director = Director::new(config.renderer_url, config.map_root, config.identity_header);

        Ok(Self {
            state: Arc::new(AppState {
                store,
                auth,
                director,
                capabilities,
                client,
                max_body_bytes: config.max_body_bytes,
                audit,
            }),
        })
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/ows/{owner}/{project}", any(handle_request))
            .with_state(Arc::clone(&self.state))
    }

    /// Serve on `listener` until `shutdown` completes. In-flight requests
    /// are allowed to finish.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(%addr, "ows gateway listening");

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .context("gateway server failed")?;

        info!("ows gateway stopped");
        Ok(())
    }
}

/// A renderer response on its way back, with what happened on the way.
struct Forwarded {
    operation: OwsOperation,
    rewritten: bool,
    response: Response,
}

async fn handle_request(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    Path((owner, project)): Path<(String, String)>,
    request: Request,
) -> Response {
    let request_id = Uuid::new_v4();
    let user = state.auth.authenticate(request.headers());
    let source = AuditSource::new(COMPONENT)
        .with_project(format!("{owner}/{project}"))
        .with_username(&user.username)
        .with_remote_addr(remote_addr)
        .with_request_id(request_id);
    let span = info_span!(
        "ows_request",
        %request_id,
        %remote_addr,
        project = %format!("{owner}/{project}"),
        user = %user.username,
    );

    async move {
        match process(&state, owner, project, &user, request).await {
            Ok(forwarded) => {
                let status = forwarded.response.status();
                info!(
                    operation = forwarded.operation.as_str(),
                    %status,
                    rewritten = forwarded.rewritten,
                    "request forwarded"
                );
                let event_type = if forwarded.rewritten {
                    AuditEventType::RequestRewritten
                } else {
                    AuditEventType::RequestForwarded
                };
                state
                    .audit
                    .log(AuditEntry::new(
                        event_type,
                        source,
                        serde_json::json!({
                            "operation": forwarded.operation.as_str(),
                            "status": status.as_u16(),
                        }),
                    ))
                    .await;
                forwarded.response
            }
            Err(err) => {
                let status = err.status();
                warn!(%status, detail = %err.detail(), "request rejected");
                state
                    .audit
                    .log(AuditEntry::new(
                        audit_event(&err),
                        source,
                        serde_json::json!({
                            "status": status.as_u16(),
                            "detail": err.detail(),
                        }),
                    ))
                    .await;
                (status, err.public_message()).into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn process(
    state: &AppState,
    owner: String,
    project: String,
    user: &RequestUser,
    request: Request,
) -> Result<Forwarded, GateError> {
    let store = Arc::clone(&state.store);
    let metadata = tokio::task::spawn_blocking(move || store.load_project(&owner, &project))
        .await
        .map_err(|err| GateError::Store(err.to_string()))??;

    let mut perms = match check_project_access(&metadata.settings, user) {
        AccessDecision::Deny(reason) => return Err(GateError::denied(reason)),
        AccessDecision::Roles(ctx) => Some(ctx),
        AccessDecision::Open => None,
    };

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|err| {
            debug!(%err, "failed to buffer request body");
            GateError::PayloadTooLarge
        })?;

    let mut req = OwsRequest::new(parts.method, &parts.uri, parts.headers, body);
    state.director.direct(&mut req, &metadata.info);
    let inspection = inspect_request(&mut req, perms.as_mut(), &metadata.layers)?;

    let is_capabilities = inspection.operation == OwsOperation::GetCapabilities;
    if is_capabilities {
        // the rewriter needs the document as plain text
        req.headers.remove(ACCEPT_ENCODING);
    }
    let public_path = req.public_path.clone();

    let upstream = forward(state, req).await?;
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    let body = upstream
        .bytes()
        .await
        .map_err(|err| GateError::Upstream(err.to_string()))?;

    let capabilities = if is_capabilities && status.is_success() {
        std::str::from_utf8(&body)
            .ok()
            .and_then(|text| state.capabilities.rewrite(text, &public_path))
    } else {
        None
    };
    let rewritten = inspection.rewritten || capabilities.is_some();
    let body = capabilities.map(Bytes::from).unwrap_or(body);

    strip_hop_by_hop(&mut headers);
    set_content_length(&mut headers, body.len());
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    Ok(Forwarded {
        operation: inspection.operation,
        rewritten,
        response,
    })
}

async fn forward(state: &AppState, req: OwsRequest) -> Result<reqwest::Response, GateError> {
    let url = state.director.target_url(&req.params);
    let mut headers = req.headers;
    strip_hop_by_hop(&mut headers);
    // reqwest derives it from the body
    headers.remove(CONTENT_LENGTH);

    debug!(method = %req.method, %url, "forwarding to renderer");
    state
        .client
        .request(req.method, url)
        .headers(headers)
        .body(req.body)
        .send()
        .await
        .map_err(|err| GateError::Upstream(err.to_string()))
}

/// Remove connection-scoped headers, including any named by `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn audit_event(err: &GateError) -> AuditEventType {
    match err {
        GateError::AuthorizationDenied { .. } => AuditEventType::AccessDenied,
        GateError::ProjectNotFound(_) => AuditEventType::ProjectNotFound,
        GateError::MalformedRequestBody(_) | GateError::PayloadTooLarge => {
            AuditEventType::MalformedRequest
        }
        GateError::Upstream(_) => AuditEventType::UpstreamFailed,
        GateError::Store(_) => AuditEventType::SettingsInvalid,
    }
}
