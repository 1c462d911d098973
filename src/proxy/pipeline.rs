//! # 网关请求管道
//!
//! 接收 → 分类 → 缓存查找 → 凭证轮换 → 分发 → 缓存写入 → 响应，
//! 每个完成分类的请求都会提交一条遥测记录

use axum::body::{Body, to_bytes};
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderName, HeaderValue, Method, Request, Response, request::Parts};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::classifier::{RequestClassifier, UNKNOWN_MODEL};
use super::context::RequestContext;
use super::dispatcher::{UpstreamDispatcher, apply_cors, preflight_response};
use super::route_table::RouteTable;
use super::transport::{Transport, UpstreamResponse};
use crate::cache::{CACHE_STATUS_HEADER, CacheEntry, CacheGateway, CacheKeyDeriver, CacheStatus};
use crate::config::GatewaySecrets;
use crate::error::{ErrorCategory, ProxyError, Result};
use crate::key_pool::{CounterStore, RotationCoordinator};
use crate::logging::{LogComponent, LogStage};
use crate::trace::{TelemetryEmitter, TelemetryRecord};
use crate::{ldebug, lerror, linfo, lwarn};

/// 响应中的请求ID头
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 管道依赖的协作者
pub struct GatewayComponents {
    pub routes: Arc<RouteTable>,
    pub secrets: Arc<GatewaySecrets>,
    pub cache_keys: CacheKeyDeriver,
    /// `None` 表示关闭响应缓存
    pub cache: Option<Arc<dyn CacheGateway>>,
    pub counter: Arc<dyn CounterStore>,
    pub transport: Arc<dyn Transport>,
    pub telemetry: TelemetryEmitter,
    pub max_body_bytes: usize,
}

/// 单个请求在管道中积累的遥测字段
struct RequestTrace {
    service: String,
    model: String,
    cache: CacheStatus,
}

impl RequestTrace {
    fn new() -> Self {
        Self {
            service: "unknown".to_string(),
            model: UNKNOWN_MODEL.to_string(),
            cache: CacheStatus::NotApplicable,
        }
    }
}

/// 网关请求管道
pub struct GatewayPipeline {
    classifier: RequestClassifier,
    cache_keys: CacheKeyDeriver,
    cache: Option<Arc<dyn CacheGateway>>,
    rotation: RotationCoordinator,
    dispatcher: UpstreamDispatcher,
    telemetry: TelemetryEmitter,
    max_body_bytes: usize,
}

impl GatewayPipeline {
    #[must_use]
    pub fn new(components: GatewayComponents) -> Self {
        let GatewayComponents {
            routes,
            secrets,
            cache_keys,
            cache,
            counter,
            transport,
            telemetry,
            max_body_bytes,
        } = components;

        Self {
            classifier: RequestClassifier::new(Arc::clone(&routes), Arc::clone(&secrets)),
            cache_keys,
            cache,
            rotation: RotationCoordinator::new(secrets, counter),
            dispatcher: UpstreamDispatcher::new(routes, transport),
            telemetry,
            max_body_bytes,
        }
    }

    /// 处理一个入站请求，总是返回响应
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        if request.method() == Method::OPTIONS {
            return preflight_response();
        }

        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let (parts, body) = request.into_parts();
        let mut trace = RequestTrace::new();

        linfo!(
            request_id,
            LogStage::RequestStart,
            LogComponent::Pipeline,
            "request_received",
            "Request received",
            method = %parts.method,
            path = parts.uri.path()
        );

        let outcome = self.process(&request_id, &parts, body, &mut trace).await;

        let (mut response, error_message) = match outcome {
            Ok(response) => (response, None),
            Err(err) => {
                if !err.is_logged() {
                    let mut response = err.to_response();
                    finish_headers(&mut response, &request_id, trace.cache);
                    return response;
                }
                match err.category() {
                    ErrorCategory::Client => lwarn!(
                        request_id,
                        LogStage::Error,
                        LogComponent::Pipeline,
                        "request_rejected",
                        "Request rejected",
                        service = trace.service.as_str(),
                        error = %err
                    ),
                    ErrorCategory::Server => lerror!(
                        request_id,
                        LogStage::Error,
                        LogComponent::Pipeline,
                        "request_failed",
                        "Request failed",
                        service = trace.service.as_str(),
                        error = %err
                    ),
                }
                (err.to_response(), Some(err.to_string()))
            }
        };
        finish_headers(&mut response, &request_id, trace.cache);

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let status_code = response.status().as_u16();

        linfo!(
            request_id,
            LogStage::Response,
            LogComponent::Pipeline,
            "request_completed",
            "Request completed",
            status = status_code,
            latency_ms = latency_ms,
            cache = trace.cache.as_str()
        );

        self.telemetry.emit(TelemetryRecord {
            request_id,
            service: trace.service,
            model: trace.model,
            status_code,
            latency_ms,
            cache_status: trace.cache,
            error_message,
            created_at: Utc::now(),
        });

        response
    }

    async fn process(
        &self,
        request_id: &str,
        parts: &Parts,
        body: Body,
        trace: &mut RequestTrace,
    ) -> Result<Response<Body>> {
        // 读取请求体之前先记下服务，体过大或读取失败的记录也能归属到服务
        trace.service = self.classifier.service_hint(parts);
        let body = self.read_body(parts, body).await?;

        let mut context = self.classifier.classify(request_id, parts, &body)?;
        trace.service.clone_from(&context.service);
        trace.model.clone_from(&context.model);

        context.cacheable = self.cache.is_some()
            && self
                .cache_keys
                .is_cacheable(&parts.method, &context.upstream_path, &context.model);

        let cache_key = if context.cacheable {
            let key = self.derive_cache_key(&context, parts, &body)?;
            if let Some(entry) = self.lookup(request_id, &key).await {
                trace.cache = CacheStatus::Hit;
                return Ok(cached_response(&entry));
            }
            trace.cache = CacheStatus::Miss;
            Some(key)
        } else {
            None
        };

        context.override_credential = self
            .rotation
            .select_credential(
                request_id,
                &context.service,
                context.incoming_credential.as_deref(),
            )
            .await?;

        let upstream = self.dispatcher.dispatch(&context, parts, body).await?;

        match cache_key {
            Some(key) if upstream.status.is_success() => {
                self.store_and_respond(request_id, &key, upstream).await
            }
            _ => Ok(streamed_response(upstream)),
        }
    }

    /// 读取完整请求体；超过上限返回 413，其余读取失败返回 400
    async fn read_body(&self, parts: &Parts, body: Body) -> Result<Bytes> {
        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_bytes) {
            return Err(ProxyError::payload_too_large(self.max_body_bytes));
        }

        to_bytes(body, self.max_body_bytes).await.map_err(|e| {
            if exceeds_length_limit(&e) {
                ProxyError::payload_too_large(self.max_body_bytes)
            } else {
                ProxyError::invalid_request_with_source("request body could not be read", e)
            }
        })
    }

    fn derive_cache_key(&self, context: &RequestContext, parts: &Parts, body: &Bytes) -> Result<String> {
        let url = self.dispatcher.cache_url(context, &parts.uri)?;
        let hashed_body = context.rewritten_body.as_ref().unwrap_or(body);
        Ok(self.cache_keys.derive_key(&url, &parts.method, hashed_body))
    }

    /// 缓存查找；后端错误按未命中处理
    async fn lookup(&self, request_id: &str, key: &str) -> Option<CacheEntry> {
        let cache = self.cache.as_ref()?;
        match cache.lookup(key).await {
            Ok(Some(entry)) => {
                ldebug!(
                    request_id,
                    LogStage::Cache,
                    LogComponent::Cache,
                    "cache_hit",
                    "Serving cached response",
                    backend = cache.backend()
                );
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                lwarn!(
                    request_id,
                    LogStage::Cache,
                    LogComponent::Cache,
                    "cache_lookup_failed",
                    "Cache lookup failed, treating as miss",
                    backend = cache.backend(),
                    error = %e
                );
                None
            }
        }
    }

    /// 缓冲 2xx 响应体，写入缓存后返回；写入失败不影响响应
    async fn store_and_respond(
        &self,
        request_id: &str,
        key: &str,
        upstream: UpstreamResponse,
    ) -> Result<Response<Body>> {
        let UpstreamResponse {
            status,
            headers,
            body,
        } = upstream;

        let body = to_bytes(body, usize::MAX).await.map_err(|e| {
            ProxyError::upstream_unreachable_with_source("failed to read upstream response body", e)
        })?;

        if let Some(cache) = &self.cache {
            let ttl = self.cache_keys.ttl();
            let entry = CacheEntry::from_response(status, &headers, body.clone(), ttl);
            if let Err(e) = cache.store(key, entry, ttl).await {
                lwarn!(
                    request_id,
                    LogStage::Cache,
                    LogComponent::Cache,
                    "cache_store_failed",
                    "Cache store failed",
                    backend = cache.backend(),
                    error = %e
                );
            }
        }

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

fn cached_response(entry: &CacheEntry) -> Response<Body> {
    let mut response = Response::new(Body::from(entry.body.clone()));
    *response.status_mut() = entry.status_code();
    *response.headers_mut() = entry.header_map();
    response
}

/// 请求体是否因超出长度上限而读取失败
fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.to_string().contains("length limit exceeded") {
            return true;
        }
        current = e.source();
    }
    false
}

fn streamed_response(upstream: UpstreamResponse) -> Response<Body> {
    let mut response = Response::new(upstream.body);
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;
    response
}

fn finish_headers(response: &mut Response<Body>, request_id: &str, cache: CacheStatus) {
    let headers = response.headers_mut();
    apply_cors(headers);
    headers.insert(
        HeaderName::from_static(CACHE_STATUS_HEADER),
        cache.header_value(),
    );
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheGateway;
    use crate::config::{default_routes, pool_key_name};
    use crate::key_pool::MemoryCounterStore;
    use crate::testing::{
        CollectingTelemetrySink, FailingCacheGateway, FailingCounterStore, RecordingTransport,
    };
    use std::collections::HashMap;

    fn pipeline(
        transport: Arc<RecordingTransport>,
        cache: Option<Arc<dyn CacheGateway>>,
    ) -> (GatewayPipeline, Arc<CollectingTelemetrySink>) {
        let mut pools = HashMap::new();
        pools.insert(pool_key_name("openai"), r#"["sk-a","sk-b"]"#.to_string());
        let sink = Arc::new(CollectingTelemetrySink::default());
        let (telemetry, _worker) = TelemetryEmitter::spawn(sink.clone());

        let pipeline = GatewayPipeline::new(GatewayComponents {
            routes: Arc::new(RouteTable::from_config(&default_routes())),
            secrets: Arc::new(GatewaySecrets::new(Some("relay-master".to_string()), pools)),
            cache_keys: CacheKeyDeriver::default(),
            cache,
            counter: Arc::new(MemoryCounterStore::new()),
            transport,
            telemetry,
            max_body_bytes: 1024 * 1024,
        });
        (pipeline, sink)
    }

    fn chat_request(token: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/openai/v1/chat/completions")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(r#"{"model":"gpt-4o","messages":[]}"#))
            .unwrap()
    }

    #[tokio::test]
    async fn test_options_is_preflight_only() {
        let transport = Arc::new(RecordingTransport::ok(200, "{}"));
        let (pipeline, _sink) = pipeline(transport.clone(), None);
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/openai/v1/chat/completions")
            .body(Body::empty())
            .unwrap();

        let response = pipeline.handle(request).await;
        assert_eq!(response.status().as_u16(), 204);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_then_hit_skips_rotation() {
        let transport = Arc::new(RecordingTransport::ok(200, r#"{"id":"chatcmpl-1"}"#));
        let cache: Arc<dyn CacheGateway> = Arc::new(MemoryCacheGateway::new(100));
        let (pipeline, _sink) = pipeline(transport.clone(), Some(cache));

        let first = pipeline.handle(chat_request("relay-master")).await;
        assert_eq!(first.headers().get(CACHE_STATUS_HEADER).unwrap(), "MISS");

        let second = pipeline.handle(chat_request("relay-master")).await;
        assert_eq!(second.headers().get(CACHE_STATUS_HEADER).unwrap(), "HIT");
        assert_eq!(transport.call_count(), 1);

        let body = to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, Bytes::from_static(br#"{"id":"chatcmpl-1"}"#));

        // 命中未消耗轮换序号，下一次未命中请求拿到第二个 key
        let third = pipeline
            .handle(
                Request::builder()
                    .method(Method::POST)
                    .uri("/openai/v1/chat/completions")
                    .header("authorization", "Bearer relay-master")
                    .body(Body::from(r#"{"model":"gpt-4o","messages":[1]}"#))
                    .unwrap(),
            )
            .await;
        assert_eq!(third.headers().get(CACHE_STATUS_HEADER).unwrap(), "MISS");
        let sent = transport.requests();
        assert_eq!(sent[0].headers.get("authorization").unwrap(), "Bearer sk-a");
        assert_eq!(sent[1].headers.get("authorization").unwrap(), "Bearer sk-b");
    }

    #[tokio::test]
    async fn test_cache_backend_failure_is_a_miss() {
        let transport = Arc::new(
            RecordingTransport::ok(200, r#"{"id":"x"}"#).with_header("x-upstream", "1"),
        );
        let cache = Arc::new(FailingCacheGateway::default());
        let (pipeline, _sink) = pipeline(transport.clone(), Some(cache.clone()));

        let response = pipeline.handle(chat_request("sk-caller")).await;
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.headers().get(CACHE_STATUS_HEADER).unwrap(), "MISS");
        assert_eq!(response.headers().get("x-upstream").unwrap(), "1");
        assert_eq!(transport.call_count(), 1);
        assert_eq!(cache.lookups(), 1);
        assert_eq!(cache.stores(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_recorded() {
        let transport = Arc::new(RecordingTransport::unreachable());
        let sink = Arc::new(CollectingTelemetrySink::default());
        let (telemetry, worker) = TelemetryEmitter::spawn(sink.clone());
        let pipeline = GatewayPipeline::new(GatewayComponents {
            routes: Arc::new(RouteTable::from_config(&default_routes())),
            secrets: Arc::new(GatewaySecrets::default()),
            cache_keys: CacheKeyDeriver::default(),
            cache: None,
            counter: Arc::new(MemoryCounterStore::new()),
            transport,
            telemetry,
            max_body_bytes: 1024,
        });

        let response = pipeline.handle(chat_request("sk-caller")).await;
        assert_eq!(response.status().as_u16(), 502);
        assert_eq!(response.headers().get(CACHE_STATUS_HEADER).unwrap(), "N/A");

        drop(pipeline);
        worker.await.unwrap();
        let records = sink.records();
        assert_eq!(records[0].status_code, 502);
        assert_eq!(records[0].model, "gpt-4o");
        assert!(records[0].error_message.as_deref().unwrap().contains("Upstream unreachable"));
    }

    #[tokio::test]
    async fn test_counter_failure_never_falls_back_to_caller_key() {
        let transport = Arc::new(RecordingTransport::ok(200, "{}"));
        let mut pools = HashMap::new();
        pools.insert(pool_key_name("openai"), r#"["sk-a"]"#.to_string());
        let (telemetry, _worker) =
            TelemetryEmitter::spawn(Arc::new(CollectingTelemetrySink::default()));
        let pipeline = GatewayPipeline::new(GatewayComponents {
            routes: Arc::new(RouteTable::from_config(&default_routes())),
            secrets: Arc::new(GatewaySecrets::new(Some("relay-master".to_string()), pools)),
            cache_keys: CacheKeyDeriver::default(),
            cache: None,
            counter: Arc::new(FailingCounterStore),
            transport: transport.clone(),
            telemetry,
            max_body_bytes: 1024,
        });

        let response = pipeline.handle(chat_request("relay-master")).await;
        assert_eq!(response.status().as_u16(), 503);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_request_has_no_telemetry() {
        let transport = Arc::new(RecordingTransport::ok(200, "{}"));
        let sink = Arc::new(CollectingTelemetrySink::default());
        let (telemetry, worker) = TelemetryEmitter::spawn(sink.clone());
        let pipeline = GatewayPipeline::new(GatewayComponents {
            routes: Arc::new(RouteTable::from_config(&default_routes())),
            secrets: Arc::new(GatewaySecrets::default()),
            cache_keys: CacheKeyDeriver::default(),
            cache: None,
            counter: Arc::new(MemoryCounterStore::new()),
            transport,
            telemetry,
            max_body_bytes: 1024,
        });

        let response = pipeline
            .handle(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status().as_u16(), 444);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );

        let response = pipeline
            .handle(Request::builder().uri("/nope/v1").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status().as_u16(), 404);

        drop(pipeline);
        worker.await.unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status_code, 404);
        assert_eq!(records[0].service, "unknown");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected_with_telemetry() {
        let transport = Arc::new(RecordingTransport::ok(200, "{}"));
        let sink = Arc::new(CollectingTelemetrySink::default());
        let (telemetry, worker) = TelemetryEmitter::spawn(sink.clone());
        let pipeline = GatewayPipeline::new(GatewayComponents {
            routes: Arc::new(RouteTable::from_config(&default_routes())),
            secrets: Arc::new(GatewaySecrets::default()),
            cache_keys: CacheKeyDeriver::default(),
            cache: None,
            counter: Arc::new(MemoryCounterStore::new()),
            transport: transport.clone(),
            telemetry,
            max_body_bytes: 16,
        });

        let response = pipeline
            .handle(
                Request::builder()
                    .method(Method::POST)
                    .uri("/openai/v1/files")
                    .body(Body::from("x".repeat(64)))
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status().as_u16(), 413);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["type"], "payload_too_large");

        // 声明的长度超限时不读取请求体
        let response = pipeline
            .handle(
                Request::builder()
                    .method(Method::POST)
                    .uri("/gemini/v1beta/models")
                    .header("content-length", "4096")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status().as_u16(), 413);
        assert_eq!(transport.call_count(), 0);

        drop(pipeline);
        worker.await.unwrap();
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status_code, 413);
        assert_eq!(records[0].service, "openai");
        assert!(records[0].error_message.as_deref().unwrap().contains("16 byte"));
        assert_eq!(records[1].service, "gemini");
    }
}
