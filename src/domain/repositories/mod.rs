pub mod rest_backend;
pub mod status_provider;

pub use rest_backend::*;
pub use status_provider::StatusProvider;
