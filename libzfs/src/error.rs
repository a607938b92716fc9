//! Error types for control-device operations.
//!
//! Everything the library can fail with is a [`ZfsError`]. Raw kernel
//! failures keep their numeric code in [`KernelError`] so callers can branch
//! on it; nothing in this crate retries or swallows them.

use std::fmt;
use std::io;

use libnvlist::{DecodeError, EncodeError};
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for libzfs operations.
#[derive(Debug, Error, Clone)]
pub enum ZfsError {
    /// The request could not be packed.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// The kernel's response could not be unpacked into the requested shape.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A name does not fit its fixed-size command-buffer field.
    #[error("{field} is {len} bytes, at most {max} are supported")]
    NameTooLong {
        /// Command-buffer field the name was destined for.
        field: &'static str,
        /// Length of the name in bytes.
        len: usize,
        /// Capacity of the field, excluding the terminator.
        max: usize,
    },

    /// The caller supplied an argument the request cannot carry.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The kernel asked for more output space than the configured ceiling.
    #[error("kernel output needs {needed} bytes, limit is {max}")]
    OutputTooLarge {
        /// Size the kernel reported (or the next growth step).
        needed: u64,
        /// Configured maximum output buffer size.
        max: u64,
    },

    /// The kernel rejected the command.
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// A send stream ended with something other than success.
    #[error("send stream terminated: {0}")]
    StreamTerminated(StreamEnd),

    /// Local I/O failure (pipe, thread spawn, descriptor handling).
    #[error("I/O error: {0}")]
    Io(String),

    /// The control device could not be opened.
    #[error("control device {path} unavailable: {reason}")]
    DeviceUnavailable {
        /// Device path that was tried.
        path: String,
        /// Human-readable failure reason.
        reason: String,
    },
}

impl ZfsError {
    /// Create a [`ZfsError::Io`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn io<E: fmt::Display>(e: E) -> Self {
        Self::Io(e.to_string())
    }

    /// Create a [`ZfsError::InvalidArgument`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn invalid<E: fmt::Display>(e: E) -> Self {
        Self::InvalidArgument(e.to_string())
    }

    /// The kernel error behind this failure, if there is one.
    pub fn kernel(&self) -> Option<&KernelError> {
        match self {
            Self::Kernel(k) => Some(k),
            Self::StreamTerminated(StreamEnd::Failed(inner)) => inner.kernel(),
            _ => None,
        }
    }
}

impl From<nix::Error> for ZfsError {
    fn from(e: nix::Error) -> Self {
        Self::io(e.desc())
    }
}

impl From<ZfsError> for io::Error {
    fn from(e: ZfsError) -> Self {
        let kind = match &e {
            ZfsError::StreamTerminated(StreamEnd::Cancelled) => io::ErrorKind::BrokenPipe,
            ZfsError::InvalidArgument(_) | ZfsError::NameTooLong { .. } => {
                io::ErrorKind::InvalidInput
            }
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

// ============================================================================
// KernelError
// ============================================================================

/// Base of the ZFS-private error space (`ZFS_ERR_CHECKPOINT_EXISTS`).
pub const ZFS_ERR_BASE: i32 = 1024;

const ZFS_ERR_NAMES: &[&str] = &[
    "ZFS_ERR_CHECKPOINT_EXISTS",
    "ZFS_ERR_DISCARDING_CHECKPOINT",
    "ZFS_ERR_NO_CHECKPOINT",
    "ZFS_ERR_DEVRM_IN_PROGRESS",
    "ZFS_ERR_VDEV_TOO_BIG",
    "ZFS_ERR_IOC_CMD_UNAVAIL",
    "ZFS_ERR_IOC_ARG_UNAVAIL",
    "ZFS_ERR_IOC_ARG_REQUIRED",
    "ZFS_ERR_IOC_ARG_BADTYPE",
    "ZFS_ERR_WRONG_PARENT",
    "ZFS_ERR_FROM_IVSET_GUID_MISSING",
    "ZFS_ERR_FROM_IVSET_GUID_MISMATCH",
    "ZFS_ERR_SPILL_BLOCK_FLAG_MISSING",
    "ZFS_ERR_UNKNOWN_SEND_STREAM_FEATURE",
    "ZFS_ERR_EXPORT_IN_PROGRESS",
    "ZFS_ERR_BOOKMARK_SOURCE_NOT_ANCESTOR",
    "ZFS_ERR_STREAM_TRUNCATED",
    "ZFS_ERR_STREAM_LARGE_BLOCK_MISMATCH",
    "ZFS_ERR_RESILVER_IN_PROGRESS",
    "ZFS_ERR_REBUILD_IN_PROGRESS",
    "ZFS_ERR_BADPROP",
];

/// `ZFS_ERR_IOC_CMD_UNAVAIL`: the loaded module does not know the command.
pub const ZFS_ERR_IOC_CMD_UNAVAIL: i32 = ZFS_ERR_BASE + 5;

/// A failed kernel command, identified by its raw error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelError {
    pub code: i32,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kernel error {} ({})", self.code, self.name())
    }
}

impl std::error::Error for KernelError {}

impl KernelError {
    pub fn new(code: i32) -> Self {
        Self { code }
    }

    /// Symbolic name, preferring the ZFS meaning where ZFS reuses an errno.
    pub fn name(&self) -> String {
        if self.code >= ZFS_ERR_BASE {
            return usize::try_from(self.code - ZFS_ERR_BASE)
                .ok()
                .and_then(|i| ZFS_ERR_NAMES.get(i))
                .map_or_else(|| format!("ZFS_ERR_{}", self.code), |n| (*n).to_owned());
        }
        match self.errno() {
            Errno::EBADE => "ECKSUM".to_owned(),
            Errno::EBADR => "EFRAGS".to_owned(),
            Errno::ENOANO => "ENOTACTIVE".to_owned(),
            Errno::UnknownErrno => format!("errno {}", self.code),
            errno => format!("{errno:?}"),
        }
    }

    pub fn errno(&self) -> Errno {
        Errno::from_raw(self.code)
    }

    pub fn is_not_found(&self) -> bool {
        self.errno() == Errno::ENOENT
    }

    pub fn is_busy(&self) -> bool {
        self.errno() == Errno::EBUSY
    }

    pub fn already_exists(&self) -> bool {
        self.errno() == Errno::EEXIST
    }

    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self.errno(), Errno::ENOSPC | Errno::EDQUOT | Errno::ENOMEM)
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self.errno(), Errno::EPERM | Errno::EACCES)
    }

    /// The running module does not implement the command.
    pub fn is_unsupported(&self) -> bool {
        self.code == ZFS_ERR_IOC_CMD_UNAVAIL
            || matches!(self.errno(), Errno::ENOTSUP | Errno::ENOTTY)
    }

    /// Checksum failure (`ECKSUM`).
    pub fn is_checksum(&self) -> bool {
        self.errno() == Errno::EBADE
    }

    pub(crate) fn is_broken_pipe(&self) -> bool {
        self.errno() == Errno::EPIPE
    }
}

impl From<Errno> for KernelError {
    fn from(e: Errno) -> Self {
        Self::new(e as i32)
    }
}

// ============================================================================
// StreamEnd
// ============================================================================

/// Terminal outcome of a send stream.
#[derive(Debug, Clone)]
pub enum StreamEnd {
    /// The kernel finished writing the stream.
    Completed,
    /// The kernel call failed after streaming started.
    Failed(Box<ZfsError>),
    /// The reader closed its end before the kernel finished.
    Cancelled,
}

impl StreamEnd {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Convert to the `Result` a caller of the underlying command would see.
    pub fn into_result(self) -> Result<(), ZfsError> {
        match self {
            Self::Completed => Ok(()),
            other => Err(ZfsError::StreamTerminated(other)),
        }
    }
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Failed(e) => write!(f, "failed: {e}"),
            Self::Cancelled => f.write_str("cancelled by reader"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ZfsError::NameTooLong {
            field: "zc_value",
            len: 8192,
            max: 8191,
        };
        assert_eq!(
            err.to_string(),
            "zc_value is 8192 bytes, at most 8191 are supported"
        );

        let err = ZfsError::from(KernelError::new(Errno::ENOENT as i32));
        assert_eq!(
            err.to_string(),
            "kernel error 2 (ENOENT)"
        );
    }

    #[test]
    fn zfs_specific_names() {
        assert_eq!(KernelError::new(1024).name(), "ZFS_ERR_CHECKPOINT_EXISTS");
        assert_eq!(KernelError::new(1029).name(), "ZFS_ERR_IOC_CMD_UNAVAIL");
        assert_eq!(KernelError::new(1044).name(), "ZFS_ERR_BADPROP");
        assert_eq!(KernelError::new(1045).name(), "ZFS_ERR_1045");
        assert_eq!(KernelError::new(52).name(), "ECKSUM");
        assert_eq!(KernelError::new(53).name(), "EFRAGS");
        assert_eq!(KernelError::new(55).name(), "ENOTACTIVE");
    }

    #[test]
    fn classification() {
        assert!(KernelError::from(Errno::ENOENT).is_not_found());
        assert!(KernelError::from(Errno::EBUSY).is_busy());
        assert!(KernelError::from(Errno::EEXIST).already_exists());
        assert!(KernelError::from(Errno::ENOSPC).is_resource_exhausted());
        assert!(KernelError::from(Errno::EDQUOT).is_resource_exhausted());
        assert!(KernelError::from(Errno::EACCES).is_permission_denied());
        assert!(KernelError::new(ZFS_ERR_IOC_CMD_UNAVAIL).is_unsupported());
        assert!(KernelError::new(52).is_checksum());
        assert!(!KernelError::from(Errno::EINVAL).is_not_found());
    }

    #[test]
    fn kernel_error_reachable_through_stream_failure() {
        let err = ZfsError::StreamTerminated(StreamEnd::Failed(Box::new(ZfsError::Kernel(
            KernelError::from(Errno::EIO),
        ))));
        assert_eq!(err.kernel(), Some(&KernelError::from(Errno::EIO)));
        assert!(StreamEnd::Completed.into_result().is_ok());
    }

    #[test]
    fn io_error_kind() {
        let io: io::Error = ZfsError::StreamTerminated(StreamEnd::Cancelled).into();
        assert_eq!(io.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn kernel_error_serde_roundtrip() {
        let err = KernelError::new(1035);
        let json = serde_json::to_string(&err).expect("serialize");
        assert_eq!(json, r#"{"code":1035}"#);
        let de: KernelError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(de, err);
    }
}
