pub mod agent;
pub mod deal;
pub mod message;
pub mod run;
pub mod step_result;

pub use agent::*;
pub use deal::*;
pub use message::*;
pub use run::*;
pub use step_result::*;
