//! # 协作者替身
//!
//! 传输层、缓存、计数器、遥测输出的可控实现

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::cache::{CacheEntry, CacheGateway};
use crate::error::{CacheError, CounterStoreError, ProxyError, Result};
use crate::key_pool::CounterStore;
use crate::proxy::transport::{OutboundRequest, Transport, UpstreamResponse};
use crate::trace::{TelemetryRecord, TelemetrySink};

/// 记录所有出站请求并返回固定响应的传输层
pub struct RecordingTransport {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    unreachable: bool,
    requests: Mutex<Vec<OutboundRequest>>,
}

impl RecordingTransport {
    #[must_use]
    pub fn ok(status: u16, body: &str) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::OK),
            headers: HeaderMap::new(),
            body: Bytes::copy_from_slice(body.as_bytes()),
            unreachable: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 每次发送都返回 `UpstreamUnreachable`
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::ok(200, "")
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
        self
    }

    /// 已发送的请求（按顺序）
    #[must_use]
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if self.unreachable {
            return Err(ProxyError::upstream_unreachable("connection refused"));
        }

        let mut headers = self.headers.clone();
        headers.insert(
            axum::http::header::CONTENT_LENGTH,
            HeaderValue::from(self.body.len()),
        );
        Ok(UpstreamResponse::new(
            self.status,
            headers,
            Body::from(self.body.clone()),
        ))
    }
}

/// 总是失败的计数器存储
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCounterStore;

#[async_trait]
impl CounterStore for FailingCounterStore {
    async fn next_index(&self, service: &str, _modulus: usize) -> std::result::Result<i64, CounterStoreError> {
        Err(CounterStoreError::MissingRow {
            service: service.to_string(),
        })
    }
}

/// 总是失败的缓存，并统计调用次数
#[derive(Debug, Default)]
pub struct FailingCacheGateway {
    lookups: AtomicUsize,
    stores: AtomicUsize,
}

impl FailingCacheGateway {
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheGateway for FailingCacheGateway {
    async fn lookup(&self, _key: &str) -> std::result::Result<Option<CacheEntry>, CacheError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::operation("cache backend offline"))
    }

    async fn store(
        &self,
        _key: &str,
        _entry: CacheEntry,
        _ttl: Duration,
    ) -> std::result::Result<(), CacheError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::operation("cache backend offline"))
    }

    fn backend(&self) -> &'static str {
        "failing"
    }
}

/// 收集所有遥测记录
#[derive(Debug, Default)]
pub struct CollectingTelemetrySink {
    records: Mutex<Vec<TelemetryRecord>>,
}

impl CollectingTelemetrySink {
    #[must_use]
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TelemetrySink for CollectingTelemetrySink {
    async fn record(&self, record: &TelemetryRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// 总是失败的遥测输出
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingTelemetrySink;

#[async_trait]
impl TelemetrySink for FailingTelemetrySink {
    async fn record(&self, _record: &TelemetryRecord) -> Result<()> {
        Err(ProxyError::database_with_source(
            "request log insert failed",
            std::io::Error::other("disk full"),
        ))
    }
}
