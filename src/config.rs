use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub merchant_id: String,
    pub base_url: String,
    /// Base of the user-facing payment page; the authority is appended to it.
    pub start_pay_url: String,
    pub callback_url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelegramConfig {
    /// Empty token disables outbound notifications.
    pub bot_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub ttl_seconds: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_seconds: 86400 }
    }
}

fn default_currency() -> String {
    "IRT".to_string()
}

impl Config {
    pub fn from_toml() -> anyhow::Result<Self> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        use std::io::ErrorKind;

        let config_result = std::fs::read_to_string(&config_path);

        let mut config: Config = match config_result {
            Ok(config_str) => toml::from_str(&config_str)
                .map_err(|e| anyhow::anyhow!("failed to parse config file {config_path}: {e}"))?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // No config file: build from environment variables and defaults.
                fn get_env(name: &str) -> Option<String> {
                    env::var(name).ok()
                }
                fn get_env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
                    env::var(name)
                        .ok()
                        .and_then(|v| v.parse::<T>().ok())
                        .unwrap_or(default)
                }

                let database_url = get_env("DATABASE_URL").ok_or_else(|| {
                    anyhow::anyhow!("DATABASE_URL not set and no config file at {config_path}")
                })?;

                Config {
                    server: ServerConfig {
                        host: get_env("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                        port: get_env_parse("SERVER_PORT", 8080u16),
                    },
                    database: DatabaseConfig {
                        url: database_url,
                        max_connections: get_env_parse("DB_MAX_CONNECTIONS", 10u32),
                    },
                    gateway: GatewayConfig {
                        merchant_id: get_env("GATEWAY_MERCHANT_ID").unwrap_or_default(),
                        base_url: get_env("GATEWAY_BASE_URL").unwrap_or_else(|| {
                            "https://api.zarinpal.com/pg/v4/payment".to_string()
                        }),
                        start_pay_url: get_env("GATEWAY_START_PAY_URL").unwrap_or_else(|| {
                            "https://www.zarinpal.com/pg/StartPay".to_string()
                        }),
                        callback_url: get_env("GATEWAY_CALLBACK_URL").unwrap_or_default(),
                        currency: get_env("GATEWAY_CURRENCY").unwrap_or_else(default_currency),
                    },
                    telegram: TelegramConfig {
                        bot_token: get_env("TELEGRAM_BOT_TOKEN").unwrap_or_default(),
                    },
                    session: SessionConfig {
                        ttl_seconds: get_env_parse("SESSION_TTL_SECONDS", 86400i64),
                    },
                }
            }
            Err(e) => {
                return Err(anyhow::anyhow!("failed to read config file {config_path}: {e}"));
            }
        };

        // Environment variables override file values when both are present.
        if let Ok(v) = env::var("SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = env::var("SERVER_PORT")
            && let Ok(p) = v.parse()
        {
            config.server.port = p;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            config.database.url = v;
        }
        if let Ok(v) = env::var("DB_MAX_CONNECTIONS")
            && let Ok(mc) = v.parse()
        {
            config.database.max_connections = mc;
        }
        if let Ok(v) = env::var("GATEWAY_MERCHANT_ID") {
            config.gateway.merchant_id = v;
        }
        if let Ok(v) = env::var("GATEWAY_BASE_URL") {
            config.gateway.base_url = v;
        }
        if let Ok(v) = env::var("GATEWAY_START_PAY_URL") {
            config.gateway.start_pay_url = v;
        }
        if let Ok(v) = env::var("GATEWAY_CALLBACK_URL") {
            config.gateway.callback_url = v;
        }
        if let Ok(v) = env::var("GATEWAY_CURRENCY") {
            config.gateway.currency = v;
        }
        if let Ok(v) = env::var("TELEGRAM_BOT_TOKEN") {
            config.telegram.bot_token = v;
        }
        if let Ok(v) = env::var("SESSION_TTL_SECONDS")
            && let Ok(n) = v.parse()
        {
            config.session.ttl_seconds = n;
        }

        Ok(config)
    }
}
