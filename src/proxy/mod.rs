//! # 代理模块
//!
//! 路由表、请求分类、凭证注入、上游分发与入站服务器

pub mod classifier;
pub mod context;
pub mod credentials;
pub mod dispatcher;
pub mod pipeline;
pub mod route_table;
pub mod server;
pub mod transport;

pub use classifier::RequestClassifier;
pub use context::{RequestContext, RoutingMode};
pub use dispatcher::UpstreamDispatcher;
pub use pipeline::{GatewayComponents, GatewayPipeline};
pub use route_table::{AuthScheme, RouteEntry, RouteTable};
pub use server::GatewayServer;
pub use transport::{OutboundRequest, ReqwestTransport, Transport, UpstreamResponse};
