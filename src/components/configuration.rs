use config::{ConfigError, Environment, File};
use serde::Deserialize;

#[derive(clap::Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// Backend base URL
    #[clap(long, value_parser)]
    pub backend_url: Option<String>,

    /// Public API key sent with every backend request
    #[clap(long, value_parser)]
    pub anon_key: Option<String>,

    /// Realtime WebSocket URL, derived from the backend URL when omitted
    #[clap(long, value_parser)]
    pub realtime_url: Option<String>,

    /// Account email
    #[clap(long, value_parser)]
    pub email: Option<String>,

    /// Account password
    #[clap(long, value_parser)]
    pub password: Option<String>,

    /// Milliseconds between two matching status polls
    #[clap(long, value_parser)]
    pub match_poll_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RealtimeConfig {
    pub url: String,
    pub heartbeat_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchingConfig {
    pub procedure: String,
    pub status_table: String,
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
}

#[derive(Deserialize, Clone)]
pub struct AuthConfig {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub realtime: RealtimeConfig,
    pub matching: MatchingConfig,
    pub auth: AuthConfig,
    pub env: String, // prd / stg / dev
}

const ENV_PREFIX: &str = "VOICE_SOCIAL";

const REALTIME_PATH: &str = "/realtime/v1/websocket";

impl Config {
    pub fn new(args: &ConfigArgs) -> Result<Self, ConfigError> {
        log::debug!("Args: {:#?}", args);

        let config = config::Config::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("backend.url", args.backend_url.clone())?
            .set_override_option("backend.anon_key", args.anon_key.clone())?
            .set_override_option("realtime.url", args.realtime_url.clone())?
            .set_override_option("auth.email", args.email.clone())?
            .set_override_option("auth.password", args.password.clone())?
            .set_override_option("matching.poll_interval_ms", args.match_poll_interval_ms)?
            .set_default("backend.url", "http://0.0.0.0:54321")? // local stack
            .set_default("backend.anon_key", "")?
            .set_default("realtime.url", "")?
            .set_default("realtime.heartbeat_interval_seconds", 30)?
            .set_default("matching.procedure", "match_random_user")?
            .set_default("matching.status_table", "matchmaking")?
            .set_default("matching.poll_interval_ms", 3000)?
            .set_default("matching.max_attempts", 10)?
            .set_default("auth.email", "")?
            .set_default("auth.password", "")?
            .set_default("env", "dev")?
            .build()?;

        config.try_deserialize()
    }

    /// The realtime endpoint, falling back to the one served next to the REST API.
    pub fn realtime_url(&self) -> String {
        if !self.realtime.url.is_empty() {
            return self.realtime.url.clone();
        }

        let base = self.backend.url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };

        format!("{base}{REALTIME_PATH}")
    }
}
