//! StatNerd relay: a loopback HTTP service that runs the add-on update
//! script on behalf of the browser UI.

pub mod error;
pub mod gate;
pub mod http_api;
pub mod server;

pub use error::RelayError;
pub use gate::{RunGate, RunGuard};
pub use http_api::{RelayState, create_router};
pub use server::{RelayServer, RelayStatus};
