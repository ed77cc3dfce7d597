pub mod snapshot_handler;

pub use snapshot_handler::{router, AppState};
