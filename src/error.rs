//! Error types produced while decoding an XFS volume.
//!
//! Every decoder in this crate returns a [`Result<T>`] built around [`Error`]. A context
//! label is attached by each layer that propagates an error upward (see [`Error::context`]),
//! so a caller sees the chain of decoders that were active when the failure occurred rather
//! than a single flat message.
//!
//! `NotFound` is deliberately absent from this enum: a missing path component or directory
//! entry is a normal, successful outcome (a `None`/sentinel-null return), not an [`Error`].

use std::string::{String, ToString};
use std::vec::Vec;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// The kind of failure that occurred. Distinct from [`Error`] itself so that callers can match
/// on it without peeling away context frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// An argument supplied by the caller is invalid (bad open mode, out-of-range AG, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The volume uses a format variant this decoder does not support (pre-v4, realtime
    /// subvolume, unsupported block/inode size).
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The superblock failed structural validation.
    #[error("corrupt superblock: {0}")]
    CorruptSuperblock(String),

    /// An inode failed structural validation.
    #[error("corrupt inode: {0}")]
    CorruptInode(String),

    /// An extent list failed structural validation (bad ordering, zero length, ...).
    #[error("corrupt extent list: {0}")]
    CorruptExtent(String),

    /// The bmap btree failed structural validation (bad magic, level mismatch, ...).
    #[error("corrupt bmap btree: {0}")]
    CorruptBtree(String),

    /// A directory block or shortform payload failed structural validation.
    #[error("corrupt directory: {0}")]
    CorruptDirectory(String),

    /// An attribute fork failed structural validation.
    #[error("corrupt attribute fork: {0}")]
    CorruptAttribute(String),

    /// Symlink resolution exceeded the bounded recursion depth.
    #[error("symlink loop detected")]
    SymlinkLoop,

    /// A read was requested past the logical end of a fork.
    #[error("read out of bounds")]
    OutOfBounds,

    /// The underlying [`crate::byte_source::ByteSource`] failed or returned a short read.
    #[error("I/O error: {0}")]
    IoError(String),

    /// The volume cannot be closed because file entries are still open against it.
    #[error("resource busy: open file entries remain")]
    ResourceBusy,

    /// The abort flag was set and the operation was cancelled cooperatively.
    #[error("operation aborted")]
    Aborted,

    /// A v3 metadata CRC32C did not match. Only returned when strict mode is enabled on the
    /// [`crate::io_context::IoContext`]; otherwise mismatches are reported through the warning
    /// channel and decoding proceeds.
    #[error("checksum mismatch: {0}")]
    ChecksumMismatch(String),
}

/// A decoding error, carrying the originating [`ErrorKind`] plus a chain of short labels added
/// by each decoder layer that propagated it.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Vec<String>,
}

impl Error {
    /// Builds a new error from a [`ErrorKind`] with an empty context chain.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: Vec::new(),
        }
    }

    /// Returns the originating [`ErrorKind`].
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Appends a short label to the context chain and returns `self`.
    ///
    /// Intended for use at decoder-layer boundaries:
    ///
    /// ```ignore
    /// decode_extent_list(buf).map_err(|e| e.context("data fork"))?;
    /// ```
    #[must_use]
    pub fn context(mut self, label: impl Into<String>) -> Self {
        self.context.push(label.into());
        self
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.kind)?;
        for label in self.context.iter().rev() {
            write!(f, " (while decoding {label})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Convenience extension to attach a context label to any `Result<T, Error>`.
pub trait ResultExt<T> {
    /// Attaches `label` to the error's context chain, if any.
    fn ctx(self, label: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn ctx(self, label: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(label.into()))
    }
}

pub(crate) fn invalid_argument(msg: impl ToString) -> Error {
    Error::new(ErrorKind::InvalidArgument(msg.to_string()))
}

pub(crate) fn unsupported(msg: impl ToString) -> Error {
    Error::new(ErrorKind::UnsupportedFormat(msg.to_string()))
}

pub(crate) fn corrupt_superblock(msg: impl ToString) -> Error {
    Error::new(ErrorKind::CorruptSuperblock(msg.to_string()))
}

pub(crate) fn corrupt_inode(msg: impl ToString) -> Error {
    Error::new(ErrorKind::CorruptInode(msg.to_string()))
}

pub(crate) fn corrupt_extent(msg: impl ToString) -> Error {
    Error::new(ErrorKind::CorruptExtent(msg.to_string()))
}

pub(crate) fn corrupt_btree(msg: impl ToString) -> Error {
    Error::new(ErrorKind::CorruptBtree(msg.to_string()))
}

pub(crate) fn corrupt_directory(msg: impl ToString) -> Error {
    Error::new(ErrorKind::CorruptDirectory(msg.to_string()))
}

pub(crate) fn corrupt_attribute(msg: impl ToString) -> Error {
    Error::new(ErrorKind::CorruptAttribute(msg.to_string()))
}

pub(crate) fn io_error(msg: impl ToString) -> Error {
    Error::new(ErrorKind::IoError(msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_labels_are_displayed_innermost_first() {
        let err = corrupt_inode("bad magic").context("data fork").context("inode 128");
        let rendered = err.to_string();
        assert!(rendered.starts_with("corrupt inode: bad magic"));
        assert!(rendered.contains("while decoding inode 128"));
        // The most recently attached label describes the outermost caller, so it should render
        // last even though it was pushed last.
        let data_fork_pos = rendered.find("while decoding data fork").unwrap();
        let inode_pos = rendered.find("while decoding inode 128").unwrap();
        assert!(inode_pos < data_fork_pos);
    }

    #[test]
    fn ctx_extension_attaches_a_label_on_the_error_path() {
        let result: Result<()> = Err(corrupt_extent("zero length"));
        let err = result.ctx("fork decode").unwrap_err();
        assert!(err.to_string().contains("while decoding fork decode"));
    }

    #[test]
    fn kind_accessor_matches_the_originating_variant() {
        let err: Error = ErrorKind::SymlinkLoop.into();
        assert!(matches!(err.kind(), &ErrorKind::SymlinkLoop));
    }
}
