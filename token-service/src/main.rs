use anyhow::Result;
use token_service::{config::AppConfig, server::Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置（缺少签名密钥时直接失败）
    let config = AppConfig::load()?;

    // 初始化日志
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "token_service={},tower_http=debug,livekit_api=info",
            config.logging.level
        )
        .into()
    });

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true),
            )
            .init();
    }

    tracing::info!("Starting token service with config: {:?}", config);

    // 启动服务器
    let server = Server::new(config)?;
    server.run().await?;

    Ok(())
}
