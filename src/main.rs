use std::sync::Arc;

use lead_chat::api::ApiClient;
use lead_chat::chatbot::ChatController;
use lead_chat::config::AppConfig;
use lead_chat::host::CliHost;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::from_env()?;
    let api = Arc::new(ApiClient::new(&config.api)?);

    // Greeting precedence: pinned env value, then theme settings, then default.
    if config.fetch_theme && !config.welcome_pinned {
        match api.theme_settings().await {
            Ok(theme) => {
                if let Some(welcome) = theme.welcome_message() {
                    config.chatbot.welcome_message = welcome.to_string();
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not load theme settings; using default greeting"),
        }
    }

    eprintln!("💬 Lead Chat v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: {}", api.base_url());
    eprintln!("   Type /help for commands, /quit to exit.\n");

    let controller = ChatController::new(config.chatbot.clone(), api);
    tracing::debug!(widget_id = %controller.id(), "Starting CLI host");

    CliHost::new(controller).run(config.open_on_start).await?;
    Ok(())
}
