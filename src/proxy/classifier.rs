//! # 请求分类器
//!
//! 根据路径前缀（透明模式）或请求体 `provider/model`（智能模式）解析出上游服务

use axum::http::{Method, request::Parts};
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;

use super::context::{RequestContext, RoutingMode};
use super::credentials::extract_incoming_credential;
use super::route_table::{CHAT_COMPLETIONS_PATH, RouteTable};
use crate::config::GatewaySecrets;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::ldebug;

/// 无法解析模型时使用的占位值
pub const UNKNOWN_MODEL: &str = "unknown";

/// 透明模式下路径中模型所在的段（从服务段开始计数，1 基）
const PATH_MODEL_SEGMENT: usize = 4;

/// 方法是否携带请求体
#[must_use]
pub fn method_carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

fn model_from_json(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("model")
        .and_then(Value::as_str)
        .filter(|model| !model.is_empty())
        .map(String::from)
}

/// 请求分类器
pub struct RequestClassifier {
    routes: Arc<RouteTable>,
    secrets: Arc<GatewaySecrets>,
}

impl RequestClassifier {
    #[must_use]
    pub const fn new(routes: Arc<RouteTable>, secrets: Arc<GatewaySecrets>) -> Self {
        Self { routes, secrets }
    }

    /// 分类入站请求
    ///
    /// 请求体只读取已缓冲的副本，调用后仍可完整转发。
    pub fn classify(&self, request_id: &str, parts: &Parts, body: &Bytes) -> Result<RequestContext> {
        let path = parts.uri.path();
        let segments = path_segments(path);

        if segments.is_empty() {
            return Err(ProxyError::malformed_request(format!(
                "request path '{path}' has no segments"
            )));
        }

        let context = if path == CHAT_COMPLETIONS_PATH && parts.method == Method::POST {
            self.classify_intelligent(request_id, parts, body)?
        } else {
            self.classify_transparent(request_id, parts, body, &segments)?
        };

        ldebug!(
            request_id,
            LogStage::Routing,
            LogComponent::Classifier,
            "request_classified",
            "Request classified",
            mode = %context.mode,
            service = context.service.as_str(),
            model = context.model.as_str()
        );

        Ok(context)
    }

    /// 分类失败时用于遥测的服务名
    #[must_use]
    pub fn service_hint(&self, parts: &Parts) -> String {
        path_segments(parts.uri.path())
            .first()
            .map(|segment| segment.to_ascii_lowercase())
            .filter(|token| self.routes.contains(token))
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn classify_transparent(
        &self,
        request_id: &str,
        parts: &Parts,
        body: &Bytes,
        segments: &[&str],
    ) -> Result<RequestContext> {
        let path = parts.uri.path();
        let service = segments[0].to_ascii_lowercase();
        let Some(route) = self.routes.get(&service) else {
            return Err(ProxyError::invalid_route(path, self.routes.tokens()));
        };

        let mut model = if method_carries_body(&parts.method) {
            model_from_json(body)
        } else {
            None
        };

        if model.is_none() && route.model_from_path {
            model = segments
                .get(PATH_MODEL_SEGMENT - 1)
                .and_then(|segment| segment.split(':').next())
                .filter(|token| !token.is_empty())
                .map(String::from);
        }

        let rest = path
            .trim_start_matches('/')
            .split_once('/')
            .map_or("", |(_, rest)| rest);

        Ok(RequestContext {
            request_id: request_id.to_string(),
            mode: RoutingMode::Transparent,
            service,
            model: model.unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
            cacheable: false,
            rewritten_body: None,
            override_credential: None,
            incoming_credential: extract_incoming_credential(
                &parts.headers,
                &parts.uri,
                Some(&route.auth),
            ),
            upstream_path: format!("/{rest}"),
        })
    }

    fn classify_intelligent(
        &self,
        request_id: &str,
        parts: &Parts,
        body: &Bytes,
    ) -> Result<RequestContext> {
        let incoming = extract_incoming_credential(&parts.headers, &parts.uri, None);
        if !self.secrets.matches_master(incoming.as_deref()) {
            return Err(ProxyError::unauthorized(
                "intelligent routing requires the gateway master secret",
            ));
        }

        let mut payload: Value = serde_json::from_slice(body)
            .map_err(|_| ProxyError::invalid_model("<missing>"))?;

        let requested = payload
            .get("model")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ProxyError::invalid_model("<missing>"))?;

        let Some((provider, upstream_model)) = requested.split_once('/') else {
            return Err(ProxyError::invalid_model(requested));
        };
        let service = provider.to_ascii_lowercase();
        if upstream_model.is_empty() {
            return Err(ProxyError::invalid_model(requested));
        }
        let Some(route) = self.routes.get(&service) else {
            return Err(ProxyError::invalid_model(requested));
        };

        payload["model"] = Value::String(upstream_model.to_string());
        let rewritten = serde_json::to_vec(&payload)
            .map_err(|e| ProxyError::internal_with_source("failed to re-encode request body", e))?;

        Ok(RequestContext {
            request_id: request_id.to_string(),
            mode: RoutingMode::Intelligent,
            service,
            model: upstream_model.to_string(),
            cacheable: false,
            rewritten_body: Some(Bytes::from(rewritten)),
            override_credential: None,
            incoming_credential: incoming,
            upstream_path: route.chat_completions_path.clone(),
        })
    }
}
