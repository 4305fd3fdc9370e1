pub mod image;
pub mod order;
pub mod plan;
pub mod question;
pub mod screenshot;
pub mod user;

pub use image::*;
pub use order::*;
pub use plan::*;
pub use question::*;
pub use screenshot::*;
pub use user::*;
