//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// What to do when a material or size answer is not in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnrecognizedChoice {
    /// Tell the customer and ask again.
    #[default]
    Reprompt,
    /// Apologize and end the conversation.
    Abandon,
}

impl std::str::FromStr for UnrecognizedChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reprompt" => Ok(Self::Reprompt),
            "abandon" => Ok(Self::Abandon),
            other => Err(format!("expected 'reprompt' or 'abandon', got '{other}'")),
        }
    }
}

/// Knobs of the order flow itself.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Assets shown per page.
    pub page_size: usize,
    /// Whether the portrait-only format also collects a photo.
    pub photo_required_without_text: bool,
    pub on_unrecognized: UnrecognizedChoice,
    /// Bound on asset listing and order submission.
    pub external_timeout: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            page_size: 3,
            photo_required_without_text: false,
            on_unrecognized: UnrecognizedChoice::Reprompt,
            external_timeout: Duration::from_secs(10),
        }
    }
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Service name reported by the health endpoint and logs.
    pub name: String,
    /// Telegram bot token. Without it the bot talks over stdin/stdout.
    pub telegram_token: Option<SecretString>,
    pub allowed_users: Vec<String>,
    /// Chat that is told about every new order.
    pub admin_chat_id: Option<String>,
    pub db_path: PathBuf,
    /// Admin REST port, `None` when disabled.
    pub http_port: Option<u16>,
    pub asset_base_url: Option<String>,
    pub asset_manifest: Option<PathBuf>,
    /// Conversations idle longer than this are dropped.
    pub idle_timeout: Duration,
    pub prune_interval: Duration,
    pub flow: FlowConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "memorial-order-bot".to_string(),
            telegram_token: None,
            allowed_users: vec!["*".to_string()],
            admin_chat_id: None,
            db_path: PathBuf::from("./data/orders.db"),
            http_port: Some(8080),
            asset_base_url: None,
            asset_manifest: None,
            idle_timeout: Duration::from_secs(24 * 60 * 60),
            prune_interval: Duration::from_secs(600), // 10 minutes
            flow: FlowConfig::default(),
        }
    }
}

impl BotConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let non_empty = |key: &str| get(key).filter(|v| !v.is_empty());

        let telegram_token = match get("TELEGRAM_BOT_TOKEN") {
            None => None,
            Some(token) if token.is_empty() => {
                return Err(ConfigError::MissingRequired {
                    key: "TELEGRAM_BOT_TOKEN".into(),
                    hint: "Set it to the token from @BotFather, or unset it to use the CLI.".into(),
                });
            }
            Some(token) => Some(SecretString::from(token)),
        };

        let allowed_users: Vec<String> = get("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let http_port: u16 = parse_or("ORDER_BOT_HTTP_PORT", get("ORDER_BOT_HTTP_PORT"), 8080)?;

        let page_size: usize = parse_or(
            "ORDER_BOT_PAGE_SIZE",
            get("ORDER_BOT_PAGE_SIZE"),
            defaults.flow.page_size,
        )?;
        if page_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ORDER_BOT_PAGE_SIZE".into(),
                message: "must be at least 1".into(),
            });
        }

        let photo_required_without_text = parse_or(
            "ORDER_BOT_PHOTO_REQUIRED_WITHOUT_TEXT",
            get("ORDER_BOT_PHOTO_REQUIRED_WITHOUT_TEXT"),
            defaults.flow.photo_required_without_text,
        )?;

        let on_unrecognized = parse_or(
            "ORDER_BOT_ON_UNRECOGNIZED",
            get("ORDER_BOT_ON_UNRECOGNIZED"),
            defaults.flow.on_unrecognized,
        )?;

        let timeout_secs: u64 = parse_or(
            "ORDER_BOT_EXTERNAL_TIMEOUT_SECS",
            get("ORDER_BOT_EXTERNAL_TIMEOUT_SECS"),
            defaults.flow.external_timeout.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "ORDER_BOT_EXTERNAL_TIMEOUT_SECS".into(),
                message: "must be at least 1".into(),
            });
        }

        let idle_minutes: u64 = parse_or(
            "ORDER_BOT_IDLE_TIMEOUT_MIN",
            get("ORDER_BOT_IDLE_TIMEOUT_MIN"),
            defaults.idle_timeout.as_secs() / 60,
        )?;

        Ok(Self {
            telegram_token,
            allowed_users,
            admin_chat_id: non_empty("ORDER_BOT_ADMIN_CHAT_ID"),
            db_path: non_empty("ORDER_BOT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            http_port: (http_port != 0).then_some(http_port),
            asset_base_url: non_empty("ORDER_BOT_ASSET_BASE_URL"),
            asset_manifest: non_empty("ORDER_BOT_ASSET_MANIFEST").map(PathBuf::from),
            idle_timeout: Duration::from_secs(idle_minutes * 60),
            flow: FlowConfig {
                page_size,
                photo_required_without_text,
                on_unrecognized,
                external_timeout: Duration::from_secs(timeout_secs),
            },
            ..defaults
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(s) if s.is_empty() => Ok(default),
        Some(s) => s.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{s}': {e}"),
        }),
    }
}
