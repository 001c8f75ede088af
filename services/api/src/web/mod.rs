pub mod ai;
pub mod auth;
pub mod generation_task;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod stories;

// Re-export the pieces the binary needs to assemble the router.
pub use middleware::{optional_auth, require_auth};
pub use rest::ApiDoc;
pub use state::AppState;
