//! # 网关入站服务器
//!
//! axum 路由：`/healthz` 之外的所有请求交给网关管道处理

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::dispatcher::{apply_cors, preflight_response};
use super::pipeline::GatewayPipeline;
use crate::error::{Context, ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{lerror, linfo};

/// 健康检查路径，不参与路由分类
pub const HEALTH_PATH: &str = "/healthz";

/// 网关入站服务器
pub struct GatewayServer {
    router: Router,
    listen_address: String,
}

impl GatewayServer {
    #[must_use]
    pub fn new(pipeline: Arc<GatewayPipeline>, listen_address: impl Into<String>) -> Self {
        Self {
            router: Self::create_router(pipeline),
            listen_address: listen_address.into(),
        }
    }

    /// 构建路由
    pub fn create_router(pipeline: Arc<GatewayPipeline>) -> Router {
        Router::new()
            .route(HEALTH_PATH, any(health))
            .fallback(gateway_handler)
            .with_state(pipeline)
            .layer(TraceLayer::new_for_http())
    }

    /// 启动服务器，收到 Ctrl-C 后优雅退出
    pub async fn serve(self) -> Result<()> {
        let addr: SocketAddr = self.listen_address.parse().map_err(|e| {
            ProxyError::config_with_source(
                format!("Invalid listen address '{}'", self.listen_address),
                e,
            )
        })?;

        let listener = TcpListener::bind(&addr).await?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Server,
            "server_start",
            "Gateway server listening",
            address = %addr
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .with_internal_context(|| "Gateway server error")?;

        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::Server,
            "server_stopped",
            "Gateway server stopped"
        );
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        lerror!(
            "system",
            LogStage::Shutdown,
            LogComponent::Server,
            "signal_failed",
            "Failed to listen for shutdown signal",
            error = %e
        );
        std::future::pending::<()>().await;
    }
}

/// 健康检查；与网关路由一样带 CORS 头，`OPTIONS` 走预检
async fn health(method: Method) -> Response {
    let mut response = match method {
        Method::OPTIONS => return preflight_response(),
        Method::GET | Method::HEAD => Json(json!({ "status": "ok" })).into_response(),
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    };
    apply_cors(response.headers_mut());
    response
}

async fn gateway_handler(
    State(pipeline): State<Arc<GatewayPipeline>>,
    request: Request,
) -> Response {
    pipeline.handle(request).await
}
