mod indexation_processor;
pub mod messaging;
mod outbox_processor;

pub use indexation_processor::*;
pub use outbox_processor::*;
