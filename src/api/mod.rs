//! Site API client — the slice of the backend the chat widget talks to.
//!
//! Keeps session cookies between requests and forwards the `csrftoken`
//! cookie as the `X-CSRFToken` header, the way a browser session against a
//! Django backend would.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::chatbot::{FlowRequest, FlowResponse, FlowTransport};
use crate::config::{ApiConfig, normalize_base_url};
use crate::error::{ApiError, ConfigError};

pub const CHAT_FLOW_PATH: &str = "chatbot-flow/";
pub const THEME_SETTINGS_PATH: &str = "theme-settings/";

const CSRF_COOKIE: &str = "csrftoken";
const CSRF_HEADER: &str = "X-CSRFToken";

/// Site-wide theme settings. Only the chatbot greeting is used here; the
/// colour fields are carried for hosts that style the widget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeSettings {
    #[serde(default)]
    pub chatbot_welcome_message: Option<String>,
    #[serde(default)]
    pub primary_color: Option<String>,
    #[serde(default)]
    pub secondary_color: Option<String>,
    #[serde(default)]
    pub accent_color: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

impl ThemeSettings {
    /// The configured greeting, if the backend provides a non-blank one.
    pub fn welcome_message(&self) -> Option<&str> {
        self.chatbot_welcome_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

/// HTTP client for the site API.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    jar: Arc<Jar>,
    csrf_token: Option<SecretString>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ConfigError> {
        let base = normalize_base_url(&config.base_url)?;
        let base_url = Url::parse(&base).map_err(|e| ConfigError::InvalidValue {
            key: "LEAD_CHAT_API_URL".to_string(),
            message: e.to_string(),
        })?;

        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            jar,
            csrf_token: config.csrf_token.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url.join(path).map_err(|e| ApiError::InvalidUrl {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// CSRF token for the next request: the session cookie wins over the
    /// configured fallback.
    fn csrf_token(&self) -> Option<String> {
        self.jar
            .cookies(&self.base_url)
            .and_then(|header| header.to_str().ok().and_then(|h| cookie_value(h, CSRF_COOKIE)))
            .or_else(|| {
                self.csrf_token
                    .as_ref()
                    .map(|t| t.expose_secret().to_string())
            })
    }

    fn with_csrf(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.csrf_token() {
            Some(token) => request.header(CSRF_HEADER, token),
            None => request,
        }
    }

    /// GET the theme settings.
    pub async fn theme_settings(&self) -> Result<ThemeSettings, ApiError> {
        let url = self.endpoint(THEME_SETTINGS_PATH)?;
        let response = self
            .with_csrf(self.client.get(url))
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed {
                endpoint: THEME_SETTINGS_PATH.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: THEME_SETTINGS_PATH.into(),
                status: status.as_u16(),
            });
        }

        response
            .json::<ThemeSettings>()
            .await
            .map_err(|e| ApiError::InvalidResponse {
                endpoint: THEME_SETTINGS_PATH.into(),
                reason: e.to_string(),
            })
    }

    /// POST one exchange to the chatbot flow handler.
    ///
    /// A non-2xx response that still carries an `error` body is a validation
    /// rejection and comes back as `Ok`. Any other non-2xx is an error.
    pub async fn chat_flow(&self, request: &FlowRequest) -> Result<FlowResponse, ApiError> {
        let url = self.endpoint(CHAT_FLOW_PATH)?;
        let response = self
            .with_csrf(self.client.post(url))
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed {
                endpoint: CHAT_FLOW_PATH.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ApiError::RequestFailed {
            endpoint: CHAT_FLOW_PATH.into(),
            reason: e.to_string(),
        })?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse {
                endpoint: CHAT_FLOW_PATH.into(),
                reason: e.to_string(),
            });
        }

        match serde_json::from_str::<FlowResponse>(&body) {
            Ok(parsed) if parsed.error.as_deref().is_some_and(|e| !e.trim().is_empty()) => {
                tracing::debug!(status = status.as_u16(), "Flow handler rejected answer");
                Ok(parsed)
            }
            _ => Err(ApiError::Status {
                endpoint: CHAT_FLOW_PATH.into(),
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl FlowTransport for ApiClient {
    async fn exchange(&self, request: &FlowRequest) -> Result<FlowResponse, ApiError> {
        self.chat_flow(request).await
    }
}

/// Pull one cookie's value out of a `Cookie` header (`a=1; b=2`).
fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}
