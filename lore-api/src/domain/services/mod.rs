mod resource_service;
mod search_service;

pub use resource_service::*;
pub use search_service::*;
