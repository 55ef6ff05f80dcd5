pub mod http;
pub mod server;

pub use http::{AppState, current_latest, router};
pub use server::PackageServer;
