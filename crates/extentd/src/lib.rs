//! extentd - the extentfs extent server
//!
//! Holds every extent in one in-memory table, answers the line protocol from
//! `extentproto` on TCP, and persists the table to a directory of extent
//! files whenever a client disconnects.
//!
//! ```rust,no_run
//! # async fn demo() -> std::io::Result<()> {
//! use extent::FlushPolicy;
//! use extentd::ExtentServer;
//! use tokio_util::sync::CancellationToken;
//!
//! let server = ExtentServer::open(".extents".as_ref(), FlushPolicy::Full)
//!     .map_err(std::io::Error::other)?;
//! server.serve("0.0.0.0:8989", CancellationToken::new()).await
//! # }
//! ```

pub mod handler;
pub mod server;
pub mod telemetry;

pub use handler::{ConnectionHandler, StoreContext};
pub use server::ExtentServer;
