//! Configuration types.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default API root, matching a locally served backend.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/";

pub const DEFAULT_WELCOME_MESSAGE: &str = "Hello! I'm XpertAI. Let's get you started.";
pub const DEFAULT_RESTART_MESSAGE: &str = "Let's start over.";
pub const DEFAULT_START_FAILED_MESSAGE: &str = "Connection failed. Please try again.";
pub const DEFAULT_SEND_FAILED_MESSAGE: &str = "Error sending message. Please try again.";

/// Site API connection settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Root URL every endpoint path is joined onto. Always ends with `/`.
    pub base_url: String,
    /// Static CSRF token, used only when the cookie jar holds none.
    pub csrf_token: Option<SecretString>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            csrf_token: None,
        }
    }
}

/// Texts the chat widget shows on its own behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatbotConfig {
    /// Greeting shown before the first question. The theme settings
    /// endpoint may replace it at startup.
    pub welcome_message: String,
    /// Greeting shown when the user restarts the conversation.
    pub restart_message: String,
    /// Shown when the opening exchange fails.
    pub start_failed_message: String,
    /// Shown when an answer could not be delivered.
    pub send_failed_message: String,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
            restart_message: DEFAULT_RESTART_MESSAGE.to_string(),
            start_failed_message: DEFAULT_START_FAILED_MESSAGE.to_string(),
            send_failed_message: DEFAULT_SEND_FAILED_MESSAGE.to_string(),
        }
    }
}

/// Everything the binary needs, read from `LEAD_CHAT_*` variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub chatbot: ChatbotConfig,
    /// Whether `LEAD_CHAT_WELCOME_MESSAGE` pinned the greeting. A pinned
    /// greeting is never replaced by theme settings.
    pub welcome_pinned: bool,
    /// Open the widget as soon as the host starts.
    pub open_on_start: bool,
    /// Fetch theme settings at startup for the greeting text.
    pub fetch_theme: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            chatbot: ChatbotConfig::default(),
            welcome_pinned: false,
            open_on_start: true,
            fetch_theme: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = normalize_base_url(
            &non_empty("LEAD_CHAT_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        )?;

        let csrf_token = non_empty("LEAD_CHAT_CSRF_TOKEN").map(SecretString::from);

        let mut chatbot = ChatbotConfig::default();
        let welcome = non_empty("LEAD_CHAT_WELCOME_MESSAGE");
        let welcome_pinned = welcome.is_some();
        if let Some(welcome) = welcome {
            chatbot.welcome_message = welcome;
        }
        if let Some(restart) = non_empty("LEAD_CHAT_RESTART_MESSAGE") {
            chatbot.restart_message = restart;
        }

        Ok(Self {
            api: ApiConfig {
                base_url,
                csrf_token,
            },
            chatbot,
            welcome_pinned,
            open_on_start: parse_flag(&lookup, "LEAD_CHAT_OPEN_ON_START", true)?,
            fetch_theme: parse_flag(&lookup, "LEAD_CHAT_FETCH_THEME", true)?,
        })
    }
}

fn parse_flag<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => Ok(default),
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}

/// Validate the API root and make sure relative endpoint paths join below it.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let url = reqwest::Url::parse(&with_slash).map_err(|e| ConfigError::InvalidValue {
        key: "LEAD_CHAT_API_URL".to_string(),
        message: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidValue {
            key: "LEAD_CHAT_API_URL".to_string(),
            message: format!("{trimmed} cannot be used as a base URL"),
        });
    }
    Ok(url.to_string())
}
