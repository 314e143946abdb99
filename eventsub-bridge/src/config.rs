//! Environment-driven configuration for the bridge.

use anyhow::{anyhow, Context, Result};
use eventsub_api::{ApiConfig, EventKind};
use eventsub_auth::OAuthConfig;
use eventsub_stream::SessionConfig;
use std::fmt;
use std::path::{Path, PathBuf};

/// Everything the bridge reads from its environment.
#[derive(Clone)]
pub struct BridgeConfig {
    pub client_id: String,
    pub client_secret: String,

    /// Channel to watch; defaults to the user that authorized the bridge
    pub broadcaster_id: Option<String>,

    /// Default: http://localhost:<port>/auth/callback
    pub redirect_uri: Option<String>,

    /// Port of the local relay server
    /// Default: 8080
    pub port: u16,

    /// Default: tokens.json
    pub token_path: PathBuf,

    /// Default: channel.follow,channel.subscribe
    pub event_kinds: Vec<EventKind>,

    /// Default: wss://eventsub.wss.twitch.tv/ws
    pub eventsub_url: String,

    pub keepalive_timeout_seconds: Option<u32>,
}

impl BridgeConfig {
    /// Load `.env` (or the given file) into the process environment, then read the config.
    pub fn from_env(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path).with_context(|| format!("failed to load {}", path.display()))?;
            }
            None => {
                let _ = dotenvy::dotenv();
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the config through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let opt = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match opt("PORT") {
            Some(value) => value
                .parse::<u16>()
                .map_err(|e| anyhow!("failed to parse PORT='{value}': {e}"))?,
            None => 8080,
        };

        let event_kinds = match opt("EVENTSUB_EVENTS") {
            Some(value) => parse_event_kinds(&value)?,
            None => vec![EventKind::Follow, EventKind::Subscribe],
        };

        let keepalive_timeout_seconds = opt("EVENTSUB_KEEPALIVE_SECONDS")
            .map(|value| {
                value
                    .parse::<u32>()
                    .map_err(|e| anyhow!("failed to parse EVENTSUB_KEEPALIVE_SECONDS='{value}': {e}"))
            })
            .transpose()?;

        Ok(Self {
            client_id: opt("TWITCH_CLIENT_ID").unwrap_or_default(),
            client_secret: opt("TWITCH_CLIENT_SECRET").unwrap_or_default(),
            broadcaster_id: opt("TWITCH_BROADCASTER_ID"),
            redirect_uri: opt("TWITCH_REDIRECT_URI"),
            port,
            token_path: opt("TOKEN_PATH").unwrap_or_else(|| "tokens.json".to_string()).into(),
            event_kinds,
            eventsub_url: opt("EVENTSUB_WS_URL").unwrap_or_else(|| SessionConfig::default().url),
            keepalive_timeout_seconds,
        })
    }

    pub fn has_client_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// The configured redirect, or the callback route of the local server.
    pub fn redirect_uri(&self) -> String {
        self.redirect_uri
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}/auth/callback", self.port))
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn oauth_config(&self) -> OAuthConfig {
        OAuthConfig::new(&self.client_id, &self.client_secret).with_redirect_uri(self.redirect_uri())
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig::default()
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new()
            .with_url(&self.eventsub_url)
            .with_event_kinds(self.event_kinds.iter().copied());
        if let Some(id) = &self.broadcaster_id {
            config = config.with_broadcaster_id(id);
        }
        if let Some(seconds) = self.keepalive_timeout_seconds {
            config = config.with_keepalive_timeout(seconds);
        }
        config
    }
}

fn parse_event_kinds(value: &str) -> Result<Vec<EventKind>> {
    let mut kinds = Vec::new();
    for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let kind: EventKind = name.parse().context("invalid EVENTSUB_EVENTS")?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        return Err(anyhow!("EVENTSUB_EVENTS names no event kinds"));
    }
    Ok(kinds)
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &mask(&self.client_secret))
            .field("broadcaster_id", &self.broadcaster_id)
            .field("redirect_uri", &self.redirect_uri())
            .field("port", &self.port)
            .field("token_path", &self.token_path)
            .field("event_kinds", &self.event_kinds)
            .field("eventsub_url", &self.eventsub_url)
            .field("keepalive_timeout_seconds", &self.keepalive_timeout_seconds)
            .finish()
    }
}

fn mask(s: &str) -> String {
    if s.is_empty() {
        String::new()
    } else if s.chars().count() <= 6 {
        "***".into()
    } else {
        format!("{}***", s.chars().take(3).collect::<String>())
    }
}
