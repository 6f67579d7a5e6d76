pub mod provider;
pub mod user;
pub mod stats;

pub use provider::*;
pub use user::*;
pub use stats::*;
