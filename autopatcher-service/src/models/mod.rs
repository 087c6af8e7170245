pub mod analysis;
pub mod github;
pub mod webhook_event;

pub use analysis::*;
pub use webhook_event::*;
