pub mod accounts;
pub mod analysis;
pub mod history;
pub mod payments;

pub use accounts::*;
pub use analysis::*;
pub use history::*;
pub use payments::*;
