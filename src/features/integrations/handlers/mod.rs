pub mod integration_handler;

pub use integration_handler::*;
