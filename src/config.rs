use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::llm::google::{DEFAULT_MODEL, GOOGLE_API_BASE};
use crate::payment::{CheckoutTerms, ConfirmPolicy, Keypair, Lamports, Pubkey};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Invalid merchant wallet address: {0}")]
    InvalidWallet(String),

    #[error("Error creating customer wallet: {0}. Make sure CUSTOMER_WALLET_PRIVATE_KEY is a valid hexadecimal string.")]
    InvalidPrivateKey(String),

    #[error("Failed to read secrets file: {0}")]
    File(#[from] config::ConfigError),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub solana: SolanaConfig,
    pub payment: PaymentConfig,
    pub llm: LLMConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub analyze_rate_per_minute: u32,
    pub session_ttl: Duration,
}

#[derive(Clone)]
pub struct SolanaConfig {
    pub api_url: String,
    pub merchant_wallet: String,
    pub customer_private_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub amount: Lamports,
    pub label: Option<String>,
    pub message: Option<String>,
    pub memo: Option<String>,
    pub confirm_attempts: u32,
    pub confirm_interval: Duration,
}

#[derive(Clone)]
pub struct LLMConfig {
    pub provider: String,
    pub google_api_key: String,
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// The four secrets, wherever they came from.
///
/// `secrets.toml` layout:
///
/// ```toml
/// [solana]
/// MERCHANT_WALLET = "..."
/// API_URL = "https://api.devnet.solana.com"
///
/// [wallet]
/// CUSTOMER_WALLET_PRIVATE_KEY = "hex..."
///
/// [api_keys]
/// GOOGLE_API_KEY = "..."
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    solana: SolanaSection,
    #[serde(default)]
    wallet: WalletSection,
    #[serde(default)]
    api_keys: ApiKeysSection,
}

#[derive(Debug, Default, Deserialize)]
struct SolanaSection {
    #[serde(default, alias = "MERCHANT_WALLET")]
    merchant_wallet: Option<String>,
    #[serde(default, alias = "API_URL")]
    api_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WalletSection {
    #[serde(default, alias = "CUSTOMER_WALLET_PRIVATE_KEY")]
    customer_wallet_private_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiKeysSection {
    #[serde(default, alias = "GOOGLE_API_KEY")]
    google_api_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            solana: SolanaSection {
                merchant_wallet: non_empty_env("MERCHANT_WALLET"),
                api_url: non_empty_env("SOLANA_API_URL"),
            },
            wallet: WalletSection {
                customer_wallet_private_key: non_empty_env("CUSTOMER_WALLET_PRIVATE_KEY"),
            },
            api_keys: ApiKeysSection {
                google_api_key: non_empty_env("GOOGLE_API_KEY"),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Ok(config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?)
    }

    /// Fill any value missing here from `other`.
    pub fn or(self, other: Secrets) -> Self {
        Self {
            solana: SolanaSection {
                merchant_wallet: self.solana.merchant_wallet.or(other.solana.merchant_wallet),
                api_url: self.solana.api_url.or(other.solana.api_url),
            },
            wallet: WalletSection {
                customer_wallet_private_key: self
                    .wallet
                    .customer_wallet_private_key
                    .or(other.wallet.customer_wallet_private_key),
            },
            api_keys: ApiKeysSection {
                google_api_key: self.api_keys.google_api_key.or(other.api_keys.google_api_key),
            },
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env_or(key, default)
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            message: e.to_string(),
        })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_secrets(Secrets::from_env())
    }

    /// Secrets from a TOML file, with the environment filling any gaps.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_secrets(Secrets::from_file(path)?.or(Secrets::from_env()))
    }

    /// Use `secrets_path` when it exists, the environment otherwise.
    pub fn load(secrets_path: Option<&Path>) -> Result<Self, ConfigError> {
        match secrets_path {
            Some(path) if path.is_file() => Self::from_file(path),
            _ => Self::from_env(),
        }
    }

    /// Required secrets plus every non-secret setting from the environment.
    pub fn from_secrets(secrets: Secrets) -> Result<Self, ConfigError> {
        let memo = non_empty_env("PAYMENT_MEMO");
        let config = Self {
            server: ServerConfig {
                port: parse_env("PORT", "8501")?,
                host: env_or("HOST", "0.0.0.0"),
                cors_allowed_origins: env_or("ALLOWED_ORIGINS", "*")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", "20971520")?,
                analyze_rate_per_minute: parse_env("ANALYZE_RATE_PER_MINUTE", "10")?,
                session_ttl: Duration::from_secs(parse_env("SESSION_TTL_SECS", "3600")?),
            },
            solana: SolanaConfig {
                api_url: secrets
                    .solana
                    .api_url
                    .ok_or(ConfigError::Missing("SOLANA_API_URL"))?,
                merchant_wallet: secrets
                    .solana
                    .merchant_wallet
                    .ok_or(ConfigError::Missing("MERCHANT_WALLET"))?,
                customer_private_key: secrets.wallet.customer_wallet_private_key,
            },
            payment: PaymentConfig {
                amount: Lamports::from_sol_str(&env_or("PAYMENT_AMOUNT_SOL", "0.001")).map_err(
                    |e| ConfigError::Invalid {
                        key: "PAYMENT_AMOUNT_SOL".to_string(),
                        message: e.to_string(),
                    },
                )?,
                label: Some(env_or("PAYMENT_LABEL", "Plot Hole")),
                message: Some(env_or("PAYMENT_MESSAGE", "Screenplay plot-hole analysis")),
                memo,
                confirm_attempts: parse_env("CONFIRM_ATTEMPTS", "10")?,
                confirm_interval: Duration::from_millis(parse_env("CONFIRM_INTERVAL_MS", "1000")?),
            },
            llm: LLMConfig {
                provider: env_or("LLM_PROVIDER", "google"),
                google_api_key: secrets
                    .api_keys
                    .google_api_key
                    .ok_or(ConfigError::Missing("GOOGLE_API_KEY"))?,
                api_base: env_or("GEMINI_API_BASE", GOOGLE_API_BASE),
                model: env_or("GEMINI_MODEL", DEFAULT_MODEL),
                max_tokens: parse_env("LLM_MAX_TOKENS", "8192")?,
                temperature: parse_env("LLM_TEMPERATURE", "0.7")?,
            },
        };

        // Surface bad keys at startup rather than on the first checkout.
        config.solana.merchant_wallet()?;
        config.solana.customer_keypair()?;
        if config.payment.amount.0 == 0 {
            return Err(ConfigError::Invalid {
                key: "PAYMENT_AMOUNT_SOL".to_string(),
                message: "price must be greater than zero".to_string(),
            });
        }
        Ok(config)
    }
}

impl SolanaConfig {
    pub fn merchant_wallet(&self) -> Result<Pubkey, ConfigError> {
        self.merchant_wallet
            .parse()
            .map_err(|e: crate::payment::KeyError| ConfigError::InvalidWallet(e.to_string()))
    }

    pub fn customer_keypair(&self) -> Result<Option<Keypair>, ConfigError> {
        self.customer_private_key
            .as_deref()
            .map(|hex| Keypair::from_hex(hex).map_err(|e| ConfigError::InvalidPrivateKey(e.to_string())))
            .transpose()
    }
}

impl PaymentConfig {
    pub fn terms(&self) -> CheckoutTerms {
        CheckoutTerms {
            amount: self.amount,
            label: self.label.clone(),
            message: self.message.clone(),
            memo: self.memo.clone(),
        }
    }

    pub fn confirm_policy(&self) -> ConfirmPolicy {
        ConfirmPolicy {
            attempts: self.confirm_attempts,
            interval: self.confirm_interval,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for SolanaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaConfig")
            .field("api_url", &self.api_url)
            .field("merchant_wallet", &self.merchant_wallet)
            .field(
                "customer_private_key",
                &self.customer_private_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl fmt::Debug for LLMConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LLMConfig")
            .field("provider", &self.provider)
            .field("google_api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}
