pub mod commands;
pub mod contracts;
pub mod dunning;
pub mod error;
pub mod identity;
pub mod migrations;
pub mod setup;
pub mod state;

pub use contracts::envelope::{FailureEnvelope, SuccessEnvelope};
pub use dunning::DunningContext;
pub use error::{ClientError, ClientResult};
pub use identity::Actor;

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");
