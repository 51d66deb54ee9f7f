//! Connection Tracking
//!
//! Every query admitted by the dispatch engine gets a [`MonitoredConn`]:
//!
//! ```text
//!            caller monitor                    target monitor
//!   caller ◀──────────────── MonitoredConn ────────────────▶ target
//!            bytes_in                           bytes_out
//!                               │
//!                               ▼
//!                     ConnSet (nonce -> conn)
//! ```
//!
//! Each half is a [`MonitoredWriter`]. Closing one half closes the other and
//! drops the record from the [`ConnSet`].

mod connection;
mod monitor;
mod set;

pub use connection::{ConnState, MonitoredConn, Side};
pub use monitor::{CloseHook, MonitoredWriter};
pub use set::{ConnSet, ConnStats};
