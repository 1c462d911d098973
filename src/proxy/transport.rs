//! # 上游传输层
//!
//! 发送已组装好的出站请求；响应体以流的形式返回，SSE 等流式响应逐块透传

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use reqwest::redirect::Policy;
use std::time::Duration;
use url::Url;

use crate::error::{Context, ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lwarn};

/// 出站请求
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub request_id: String,
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// 上游响应，body 未被读取
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl UpstreamResponse {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: Body) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }
}

/// 上游传输
///
/// 连接、TLS、解析等失败统一映射为 `UpstreamUnreachable`；非 2xx 状态码不是错误。
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse>;
}

/// 基于 reqwest 的传输实现
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// 创建传输层；不跟随重定向，3xx 原样返回给调用方
    ///
    /// `timeout` 限制建立连接和两次读取之间的空闲时间，不限制整个响应，
    /// 长时间持续输出的流式响应不会被截断。
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .redirect(Policy::none())
            .build()
            .with_internal_context(|| "failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse> {
        let OutboundRequest {
            request_id,
            method,
            url,
            headers,
            body,
        } = request;

        ldebug!(
            request_id,
            LogStage::UpstreamRequest,
            LogComponent::Transport,
            "send_upstream",
            "Sending upstream request",
            method = %method,
            host = url.host_str().unwrap_or_default(),
            path = url.path()
        );

        let mut builder = self.client.request(method, url).headers(headers);
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            lwarn!(
                request_id,
                LogStage::UpstreamRequest,
                LogComponent::Transport,
                "upstream_unreachable",
                "Upstream request failed",
                error = %e
            );
            ProxyError::upstream_unreachable_with_source("upstream request failed", e)
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = Body::from_stream(response.bytes_stream());

        Ok(UpstreamResponse::new(status, headers, body))
    }
}
