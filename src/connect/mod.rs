//! Browser connection resolution.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`endpoint`] | Remote-debugging endpoint discovery and host rewrite |
//! | [`resolver`] | Strategy chain producing a live [`Connection`] |

pub mod endpoint;
pub mod resolver;

pub use endpoint::{fetch_ws_url, resolve_cdp_endpoint, rewrite_advertised_host};
pub use resolver::{Connection, ConnectionMode, ConnectionResolver};
