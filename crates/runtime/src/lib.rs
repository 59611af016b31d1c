use std::sync::Arc;

use anyhow::{Context, Result};
use parley_chats::{
    ChatSession, ChatSettings, DeliverySettings, LoopbackTransport, TypingSettings,
};
use parley_config::AppConfig;
use parley_users::User;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::INFO)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// Map loaded configuration onto the chat core's settings
pub fn settings_from(config: &AppConfig) -> ChatSettings {
    ChatSettings {
        typing: TypingSettings {
            throttle: config.typing.throttle(),
            expiry: config.typing.expiry(),
        },
        delivery: DeliverySettings {
            max_content_length: config.delivery.max_content_length,
        },
        event_capacity: config.events.broadcast_capacity,
    }
}

#[derive(Clone)]
pub struct ChatServices {
    pub session: Arc<ChatSession<LoopbackTransport>>,
    pub transport: Arc<LoopbackTransport>,
    feed_task: Arc<JoinHandle<usize>>,
}

impl ChatServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let transport = Arc::new(LoopbackTransport::new(config.loopback.ack_delay()));
        let session = Arc::new(ChatSession::new(
            Arc::clone(&transport),
            settings_from(config),
        ));

        let mut local_user = User::new(&config.session.user_id, &config.session.display_name);
        if let Some(avatar) = &config.session.avatar_url {
            local_user = local_user.with_avatar(avatar);
        }
        session
            .set_current_user(local_user)
            .context("failed to register the local user")?;

        let feed = transport
            .remote_feed()
            .context("remote feed already taken")?;
        let pump = Arc::clone(&session);
        let feed_task = tokio::spawn(async move { pump.run_remote_feed(feed).await });

        info!(
            user_id = %config.session.user_id,
            ack_delay_ms = config.loopback.ack_delay_ms,
            "chat services ready"
        );

        Ok(Self {
            session,
            transport,
            feed_task: Arc::new(feed_task),
        })
    }

    /// Stop pumping remote events and wait for pending deliveries
    pub async fn shutdown(&self) {
        self.feed_task.abort();
        self.session.wait_idle().await;
        info!("chat services stopped");
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
