//! AskShot
//!
//! Backend for the AskShot browser extension: users capture a screenshot, ask a
//! question about it, and get an answer from a vision model. Each answer spends one
//! credit; credits refill on a rolling period and a one-time payment upgrades the
//! account to the paid tier.
//!
//! ## Standalone
//!
//! Run the binary:
//! ```bash
//! askshot-server
//! ```
//!
//! ## Embedded (Axum)
//!
//! When the `server` feature is enabled, the API can be mounted into a larger Axum app:
//! ```rust,ignore
//! use axum::Router;
//! use askshot::infrastructure::AppConfig;
//! use askshot::server::{build_state_with_pool, router};
//! use sqlx::PgPool;
//!
//! let cfg = AppConfig::from_env()?;
//! let pool = PgPool::connect(&cfg.database_url).await?;
//! let state = build_state_with_pool(cfg, pool, true).await?;
//! let app = Router::new().nest("/askshot", router(state));
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

// Standalone + embedded HTTP server support (Axum).
// Enabled behind the `server` feature so the core library can be used without Axum.
#[cfg(feature = "server")]
pub mod server;

pub use application::*;
pub use domain::*;
pub use infrastructure::*;

#[cfg(feature = "server")]
pub use server::*;
