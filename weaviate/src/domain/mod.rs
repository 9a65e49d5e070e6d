mod graphql;
mod object;

pub use graphql::*;
pub use object::*;
