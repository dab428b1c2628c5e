//! A read-only decoder for the XFS on-disk filesystem format, aimed at forensic and archival
//! use: open a raw volume image, walk its allocation groups, inodes and directories, and read
//! file content, symlink targets, and extended attributes without mounting it.
//!
//! Nothing here writes to a volume, replays its log, or repairs inconsistencies; a dirty or
//! unsupported image is expected to fail decoding cleanly rather than be coerced into a
//! best-effort read.
//!
//! The public surface is [`volume::Volume`] and [`file_entry::FileEntry`]; everything under
//! [`xfs`] is the on-disk decoding engine those two build on.

pub mod byte_source;
pub mod error;
pub mod file_entry;
pub mod geometry;
pub mod io_context;
pub mod path;
pub mod volume;
pub mod xfs;

pub use byte_source::{ByteSource, FileByteSource, SliceByteSource};
pub use error::{Error, ErrorKind, Result};
pub use file_entry::FileEntry;
pub use volume::{OpenMode, OpenOptions, Volume};
