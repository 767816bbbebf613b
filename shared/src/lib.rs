mod commitment;
mod event;
mod ledger;
mod localdate;
mod pact;

pub use commitment::*;
pub use event::*;
pub use ledger::*;
pub use localdate::*;
pub use pact::*;

pub type UserId = String;
pub type PactId = uuid::Uuid;
