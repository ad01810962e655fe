//! extentproto - Wire protocol for the extentfs extent server
//!
//! This crate defines what travels over the socket between `extentd` and its
//! clients, and the client half of that conversation.
//!
//! ## Line Protocol
//!
//! Each unit is a JSON header line, optionally followed by one payload line.
//! See [`message`] for the header layout and [`connection`] for framing.
//!
//! | code          | request payload            | reply                                   |
//! |---------------|----------------------------|-----------------------------------------|
//! | `put_extents` | `["<b64>", ...]`           | `ok`, `["<hash>", ...]`                  |
//! | `get_extents` | `["<hash>", ...]`          | `ok` or `negative`, `["<b64>", ...]`     |
//! | `poll_extent` | `["<hash>"]`               | `affirmative` or `negative`, no payload |
//!
//! Content bytes are base64 strings, so arbitrary binary content fits on a
//! single JSON line.
//!
//! ## Client
//!
//! [`ExtentSession`] chunks file content, stores it with one `put_extents`,
//! and reads it back with one `get_extents`:
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), extentproto::SessionError> {
//! use extentproto::ExtentSession;
//!
//! let session = ExtentSession::connect("localhost:8989").await?;
//! let recipe = session.try_write_file(b"hello world").await?;
//! let content = session.try_read_file(&recipe).await?;
//! assert_eq!(&content[..], b"hello world");
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod message;
pub mod session;

pub use connection::{Connection, Frame};
pub use message::{Message, MsgCode, MsgStatus, WireError};
pub use session::{ExtentSession, SessionError};
