use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice_client::{
    ClientConfig, ControllerOptions, LiveKitTransport, SessionController, Surface,
    SystemMicrophone, TokenServiceClient, ViewModel,
};

const HELP: &str = "commands: c=connect d=disconnect m=mic s=speaker t=talk r=release q=quit";

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "voice_client=info,livekit=warn".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    let config = ClientConfig::from_env()?;
    let agent_name = std::env::var("AGENT_NAME").unwrap_or_else(|_| "Alex".to_string());
    let surface = match std::env::var("VOICE_SURFACE").as_deref() {
        Ok("classic") => Surface::Classic,
        _ => Surface::Avatar,
    };

    tracing::info!("Using token service at {}", config.token_service_url);

    // 原始 PCM 采集输入，例如 arecord 写入的 FIFO
    let transport = match std::env::var("VOICE_CAPTURE_PATH") {
        Ok(path) => LiveKitTransport::new().with_capture_path(path),
        Err(_) => {
            tracing::warn!("VOICE_CAPTURE_PATH is not set; the microphone cannot be enabled");
            LiveKitTransport::new()
        }
    };

    let controller = SessionController::new(
        ControllerOptions::default().with_agent_name(agent_name.clone()),
        Arc::new(TokenServiceClient::new(config)?),
        Arc::new(transport),
        Arc::new(SystemMicrophone::default()),
    );

    // 每次状态变化都渲染一次视图
    let mut snapshots = controller.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            let view = ViewModel::render(&snapshot, surface, &agent_name);
            tracing::info!(
                state = %snapshot.state,
                status = %view.status_text,
                connect = %view.connect_button.label,
                mic = %view.mic_button.label,
                speaker = %view.speaker_button.label,
                talking = view.avatar_talking,
                "{}",
                snapshot.last_notice().unwrap_or_default()
            );
            if let Some(agent) = view.agent_status {
                tracing::info!("{}: {}", agent.title, agent.subtitle);
            }
        }
    });

    tracing::info!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "c" => {
                let controller = controller.clone();
                tokio::spawn(async move {
                    if let Err(e) = controller.connect().await {
                        tracing::warn!("Connect did not complete: {}", e);
                    }
                });
            }
            "d" => controller.disconnect().await?,
            "m" => {
                if let Err(e) = controller.toggle_microphone().await {
                    tracing::warn!("Microphone toggle failed: {}", e);
                }
            }
            "s" => {
                controller.toggle_speaker().await;
            }
            "t" => {
                controller.set_local_speaking(true);
            }
            "r" => {
                controller.set_local_speaking(false);
            }
            "q" => break,
            "" => {}
            other => tracing::warn!("Unknown command {:?}; {}", other, HELP),
        }
    }

    controller.disconnect().await?;
    Ok(())
}
