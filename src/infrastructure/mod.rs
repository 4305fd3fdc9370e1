pub mod anthropic;
pub mod cashfree;
pub mod config;
pub mod email;
pub mod repository;
pub mod session;

pub use anthropic::*;
pub use cashfree::*;
pub use config::*;
pub use email::*;
pub use repository::*;
pub use session::*;
