//! # AI Relay 主程序
//!
//! 加载配置、初始化存储并启动网关服务

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ai_relay::{
    ProxyError, Result,
    cache::{CacheKeyDeriver, build_cache_gateway},
    config::{GatewaySecrets, load_config},
    database::{init_database, run_migrations},
    key_pool::DatabaseCounterStore,
    lerror, linfo,
    logging::{self, LogComponent, LogStage},
    proxy::{GatewayComponents, GatewayPipeline, GatewayServer, ReqwestTransport, RouteTable},
    trace::{
        DatabaseTelemetrySink, FanoutTelemetrySink, LogTelemetrySink, TelemetryEmitter, TelemetrySink,
    },
};
use clap::Parser;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "ai-relay", version, about = "AI 服务请求路由网关")]
struct Args {
    /// 配置文件路径，默认 `config/config.{RUST_ENV}.toml`
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 日志级别
    #[arg(long)]
    log_level: Option<String>,

    /// 打印日志配置说明后退出
    #[arg(long)]
    print_logging_help: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if args.print_logging_help {
        logging::print_logging_help();
        return Ok(());
    }

    // 初始化日志系统
    logging::init_logging(args.log_level.as_deref());

    if let Err(e) = run(args).await {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "service_start_failed",
            "Gateway failed",
            error = %e
        );
        std::process::exit(1);
    }

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "service_shutdown",
        "Gateway shut down"
    );
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    let db = init_database(&config.database)
        .await
        .map_err(|e| ProxyError::database_with_source("数据库连接失败", e))?;
    run_migrations(&db)
        .await
        .map_err(|e| ProxyError::database_with_source("数据库迁移失败", e))?;
    let db = Arc::new(db);

    let cache = build_cache_gateway(&config.cache).await?;
    let transport = ReqwestTransport::new(Duration::from_secs(
        config.server.upstream_timeout_seconds,
    ))?;

    let sinks: Vec<Arc<dyn TelemetrySink>> = vec![
        Arc::new(LogTelemetrySink),
        Arc::new(DatabaseTelemetrySink::new(db.clone())),
    ];
    let sink = FanoutTelemetrySink::new(sinks);
    let (telemetry, telemetry_worker) = TelemetryEmitter::spawn(Arc::new(sink));

    let secrets = GatewaySecrets::from_config(&config.secrets);
    let master_secret_configured = secrets.has_master_secret();

    let pipeline = GatewayPipeline::new(GatewayComponents {
        routes: Arc::new(RouteTable::from_config(&config.routes)),
        secrets: Arc::new(secrets),
        cache_keys: CacheKeyDeriver::from_config(&config.cache),
        cache,
        counter: Arc::new(DatabaseCounterStore::new(db)),
        transport: Arc::new(transport),
        telemetry,
        max_body_bytes: config.server.max_body_bytes,
    });

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "Gateway starting",
        routes = config.routes.len(),
        master_secret_configured = master_secret_configured,
        cache = ?config.cache.cache_type
    );

    GatewayServer::new(Arc::new(pipeline), config.listen_address())
        .serve()
        .await?;

    // 管道随服务器一起释放后，遥测工作者会清空队列并退出
    if let Err(e) = telemetry_worker.await {
        lerror!(
            "system",
            LogStage::Shutdown,
            LogComponent::Telemetry,
            "worker_join_failed",
            "Telemetry worker did not finish cleanly",
            error = %e
        );
    }
    Ok(())
}
