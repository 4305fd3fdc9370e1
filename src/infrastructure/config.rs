use crate::domain::CreditPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub public_base_url: String,
    /// Comma-separated list; empty allows any origin (the extension runs on arbitrary pages).
    pub cors_allowed_origins: String,
    /// Request body cap. Screenshots arrive as base64 data URLs, well past axum's 2 MB default.
    pub max_body_bytes: usize,

    // Session tokens minted by the auth provider
    pub auth_secret: String,

    // Vision model
    pub anthropic_api_key: String,
    pub anthropic_base_url: String,
    pub anthropic_model: String,
    pub anthropic_max_tokens: u32,

    // Payment gateway
    pub cashfree_app_id: String,
    pub cashfree_secret_key: String,
    pub cashfree_environment: String,
    pub require_webhook_signature: bool,
    pub order_amount: f64,
    pub order_currency: String,

    // Transactional email
    pub resend_api_key: String,
    pub email_from: String,

    // Credits
    pub free_max_credits: i32,
    pub paid_max_credits: i32,
    pub trial_reset_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("ASKSHOT"))
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("public_base_url", "http://localhost:3000")?
            .set_default("cors_allowed_origins", "")?
            .set_default("max_body_bytes", 20 * 1024 * 1024)?
            .set_default("anthropic_base_url", "https://api.anthropic.com")?
            .set_default("anthropic_model", "claude-3-sonnet-20240229")?
            .set_default("anthropic_max_tokens", 1024)?
            .set_default("cashfree_environment", "sandbox")?
            .set_default("require_webhook_signature", false)?
            .set_default("order_amount", 1.0)?
            .set_default("order_currency", "INR")?
            .set_default("resend_api_key", "")?
            .set_default("email_from", "AskShot <onboarding@askshot.app>")?
            .set_default("free_max_credits", 5)?
            .set_default("paid_max_credits", 20)?
            .set_default("trial_reset_hours", 24)?
            .build()?;

        config.try_deserialize()
    }

    pub fn credit_policy(&self) -> CreditPolicy {
        CreditPolicy {
            free_max_credits: self.free_max_credits,
            paid_max_credits: self.paid_max_credits,
            reset_period: chrono::Duration::hours(self.trial_reset_hours.max(1)),
        }
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
