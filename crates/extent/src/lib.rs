//! Content-addressed extent storage for extentfs.
//!
//! File content is split into fixed-size extents, each identified by the
//! BLAKE3 hash of its bytes. A file is then just an ordered list of hashes,
//! its [`ExtentRecipe`]. Equal content hashes equal, so extents deduplicate
//! naturally across files.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use extent::{chunk, ExtentStore, ExtentTable, FlushPolicy};
//! use std::path::Path;
//!
//! let table = ExtentTable::new();
//! table.load_from_disk(Path::new(".extents")).unwrap();
//!
//! let hashes: Vec<_> = chunk::split(b"hello world", 6)
//!     .into_iter()
//!     .map(|c| table.insert(c.to_vec()))
//!     .collect();
//! assert!(hashes.iter().all(|h| table.has(h)));
//!
//! table.flush_to_disk(Path::new(".extents"), FlushPolicy::Full);
//! ```
//!
//! # Layout
//!
//! Persisted extents live flat in one directory, one file per hash. See
//! [`persist`] for the file format.

pub mod chunk;
pub mod extent;
pub mod hash;
pub mod persist;
pub mod store;

pub use chunk::{reassemble, split, split_bytes, DEFAULT_EXTENT_SIZE};
pub use extent::{Extent, ExtentData, ExtentRecipe};
pub use hash::{ExtentHash, HashError, HASH_HEX_LEN};
pub use persist::{ensure_extent_dir, PersistenceError};
pub use store::{ExtentStore, ExtentTable, FlushPolicy, FlushReport, LoadReport};
