mod answer;
mod outbox_event;
mod process_registry;
mod resource;
mod status_registry;

pub mod extraction;
pub mod services;
pub mod vector_store;

pub use answer::*;
pub use outbox_event::*;
pub use process_registry::*;
pub use resource::*;
pub use status_registry::*;
