use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum MailerError {
    #[error("Email request failed: {0}")]
    RequestFailed(String),
    #[error("Email provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_welcome(&self, name: Option<String>, email: &str) -> Result<(), MailerError>;
}

const RESEND_URL: &str = "https://api.resend.com/emails";
const WELCOME_SUBJECT: &str = "Welcome to AskShot! Your account is ready 🎉";
const EXTENSION_URL: &str = "https://chromewebstore.google.com/detail/kanioaflpfaoldkjeflbidhncicaobac";

/// Greeting name: the display name, or the local part of the address.
pub fn greeting_name(name: Option<&str>, email: &str) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => n.to_string(),
        None => email.split('@').next().unwrap_or(email).to_string(),
    }
}

pub fn render_welcome_html(username: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <body style="background:#f9fafb;font-family:sans-serif">
    <div style="max-width:600px;margin:40px auto;padding:40px;background:#fff;border:1px solid #e5e7eb;border-radius:8px">
      <h1 style="text-align:center;color:#1f2937">Welcome to AskShot!</h1>
      <p>Hi {username},</p>
      <p>Thank you for signing up with AskShot! Your AI-powered screenshot assistant is ready to help
      you capture, analyze, and get instant answers from any screenshot.</p>
      <p style="text-align:center"><a href="{EXTENSION_URL}">Add AskShot to Chrome</a></p>
      <p style="text-align:center">If you have any questions or need help getting started, just reply to this email.</p>
      <hr/>
      <p style="text-align:center;color:#6b7280">AskShot &middot; Your AI-powered screenshot assistant</p>
    </div>
  </body>
</html>"#,
        username = html_escape(username),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub struct ResendMailer {
    client: Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new(api_key: String, from: String) -> Result<Self, MailerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MailerError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, api_key, from })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send_welcome(&self, name: Option<String>, email: &str) -> Result<(), MailerError> {
        let username = greeting_name(name.as_deref(), email);
        let body = json!({
            "from": self.from,
            "to": [email],
            "subject": WELCOME_SUBJECT,
            "html": render_welcome_html(&username),
        });

        let resp = self
            .client
            .post(RESEND_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MailerError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(MailerError::Rejected { status, body });
        }

        Ok(())
    }
}

/// Used when no email provider key is configured.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send_welcome(&self, _name: Option<String>, email: &str) -> Result<(), MailerError> {
        info!(email = %email, "Email disabled, skipping welcome message");
        Ok(())
    }
}
