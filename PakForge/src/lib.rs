//! # PakForge
//!
//! A pure-Rust library for the flat, directory-indexed archive containers
//! used by id Tech and Build engine games.
//!
//! ## Supported Formats
//!
//! - **SiN pak** (`SPAK`) - Ritual Entertainment's Quake 2 pak variant
//! - **Quake pak** (`PACK`) - id Software Quake / Quake 2 archives
//!
//! Every container follows the same shape: a fixed header, a directory
//! table of (name, offset, size) records, and raw payload blocks. PakForge
//! parses that into a hierarchical tree of typed, lazily loaded entries and
//! serializes the tree back out bit-exact.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pakforge::prelude::*;
//!
//! // Auto-detect the container format and open it.
//! let (archive, format) = Archive::open_path("pak0.sin", &OpenOptions::new())?;
//! println!("opened as {}", format.name());
//!
//! // Walk every entry in on-disk order.
//! for (path, entry) in archive.root().iter_entries() {
//!     println!("{path} ({} bytes, {})", entry.size(), entry.kind().as_str());
//! }
//! # Ok::<(), pakforge::Error>(())
//! ```
//!
//! ### Building an archive from scratch
//!
//! ```
//! use pakforge::prelude::*;
//!
//! let mut archive = Archive::new();
//! archive
//!     .root_mut()
//!     .create_dir("maps")
//!     .add_entry(Entry::new("e1m1.bsp", 0))
//!     .set_data(vec![0u8; 16]);
//!
//! let mut out = ByteBuffer::new();
//! let report = SinFormat.write(&mut archive, &mut out, true)?;
//! assert!(report.is_clean());
//! # Ok::<(), pakforge::Error>(())
//! ```
//!
//! Payloads are released after type detection by default and refetched from
//! the backing file on demand; pass
//! [`OpenOptions::with_keep_payloads`](formats::OpenOptions::with_keep_payloads)
//! to keep everything resident.

pub mod archive;
pub mod buffer;
pub mod detect;
pub mod error;
pub mod formats;

// Re-exports for convenience
pub use error::{Error, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};

    pub use crate::buffer::ByteBuffer;

    pub use crate::archive::{
        Archive, ArchiveEvent, ChangeListener, DirNode, Entry, Residency,
    };

    pub use crate::detect::{EntryKind, SignatureDetector, TypeDetector};

    pub use crate::formats::{
        ContainerFormat, OpenOptions, QuakePakFormat, SinFormat, WriteReport, detect, detect_file,
        registry,
    };
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
