//! # 上游分发器
//!
//! 按请求上下文组装出站请求（目标 URL、转发头、凭证注入）并交给传输层发送

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode, Uri, header, request::Parts};
use bytes::Bytes;
use std::sync::Arc;
use url::Url;

use super::context::{RequestContext, RoutingMode};
use super::credentials::{DEFAULT_QUERY_KEY, apply_credential, without_query_param};
use super::route_table::{AuthScheme, RouteEntry, RouteTable};
use super::transport::{OutboundRequest, Transport, UpstreamResponse};
use crate::error::{ProxyError, Result};
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};

/// 逐跳头，不转发
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "Authorization, Content-Type, x-api-key, x-goog-api-key, \
     xi-api-key, anthropic-version, anthropic-beta";

/// 移除逐跳头
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// 为响应附加 CORS 头
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
}

/// `OPTIONS` 预检响应
#[must_use]
pub fn preflight_response() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    apply_cors(response.headers_mut());
    response
}

/// 上游基础地址：未写 scheme 时默认 https
fn base_url(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// 上游分发器
pub struct UpstreamDispatcher {
    routes: Arc<RouteTable>,
    transport: Arc<dyn Transport>,
}

impl UpstreamDispatcher {
    #[must_use]
    pub fn new(routes: Arc<RouteTable>, transport: Arc<dyn Transport>) -> Self {
        Self { routes, transport }
    }

    fn route(&self, context: &RequestContext) -> Result<&RouteEntry> {
        self.routes.get(&context.service).ok_or_else(|| {
            ProxyError::internal(format!(
                "classified service '{}' is missing from the route table",
                context.service
            ))
        })
    }

    /// 目标 URL：`<scheme>://<host><upstream_path>?<query>`，保留调用方查询串
    pub fn target_url(&self, context: &RequestContext, uri: &Uri) -> Result<Url> {
        let route = self.route(context)?;
        let raw = format!("{}{}", base_url(&route.host), context.upstream_path);
        let mut url = Url::parse(&raw).map_err(|e| {
            ProxyError::config_with_source(format!("invalid upstream URL '{raw}'"), e)
        })?;
        url.set_query(uri.query().filter(|query| !query.is_empty()));
        Ok(url)
    }

    /// 用于缓存键的 URL：去掉所有凭证查询参数
    pub fn cache_url(&self, context: &RequestContext, uri: &Uri) -> Result<String> {
        let route = self.route(context)?;
        let mut url = without_query_param(&self.target_url(context, uri)?, DEFAULT_QUERY_KEY);
        if let AuthScheme::Query { name } = &route.auth {
            url = without_query_param(&url, name);
        }
        Ok(url.into())
    }

    /// 组装出站请求
    pub fn build_request(
        &self,
        context: &RequestContext,
        parts: &Parts,
        body: Bytes,
    ) -> Result<OutboundRequest> {
        let route = self.route(context)?;
        let mut url = self.target_url(context, &parts.uri)?;

        let mut headers = parts.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let body = match (context.mode, &context.rewritten_body) {
            (RoutingMode::Intelligent, Some(rewritten)) => {
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                rewritten.clone()
            }
            _ => body,
        };

        if let Some(credential) = &context.override_credential {
            url = without_query_param(&url, DEFAULT_QUERY_KEY);
            apply_credential(&route.auth, &mut headers, &mut url, credential)?;
        }

        Ok(OutboundRequest {
            request_id: context.request_id.clone(),
            method: parts.method.clone(),
            url,
            headers,
            body,
        })
    }

    /// 发送请求到上游
    pub async fn dispatch(
        &self,
        context: &RequestContext,
        parts: &Parts,
        body: Bytes,
    ) -> Result<UpstreamResponse> {
        let request = self.build_request(context, parts, body)?;

        ldebug!(
            context.request_id,
            LogStage::UpstreamRequest,
            LogComponent::Dispatcher,
            "dispatch",
            "Dispatching request upstream",
            service = context.service.as_str(),
            mode = %context.mode,
            rotated = context.is_rotated()
        );

        let mut response = self.transport.send(request).await?;
        strip_hop_by_hop(&mut response.headers);
        Ok(response)
    }
}
