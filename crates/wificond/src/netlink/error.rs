//! Crate-wide error type.

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Negative errno returned in an `NLMSG_ERROR` reply.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel { errno: i32, message: String },

    /// [`Error::Kernel`] tagged with the nl80211 command that failed.
    #[error("{operation}: {message} (errno {errno})")]
    KernelWithContext {
        operation: String,
        errno: i32,
        message: String,
    },

    /// A length field points past the end of the buffer.
    #[error("message truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Attribute payload width does not match its value type.
    #[error("attribute {kind}: expected {expected} payload bytes, got {actual}")]
    SizeMismatch {
        kind: u16,
        expected: usize,
        actual: usize,
    },

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("missing required attribute: {name}")]
    MissingAttribute { name: &'static str },

    /// The session for this interface was torn down; no kernel call was made.
    #[error("interface {ifindex} is no longer managed")]
    InterfaceInvalidated { ifindex: u32 },

    /// A session for this interface is already registered.
    #[error("interface {ifindex} is already managed")]
    AlreadyManaged { ifindex: u32 },

    #[error("cannot manage more than {limit} interface(s) at once")]
    TooManyInterfaces { limit: usize },

    /// The call is not valid in the session's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("generic netlink family not found: {name}")]
    FamilyNotFound { name: String },

    #[error("operation not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// Build from the negative errno carried by `nlmsgerr`.
    pub fn from_errno(errno: i32) -> Self {
        let errno = -errno;
        Self::Kernel {
            errno,
            message: io::Error::from_raw_os_error(errno).to_string(),
        }
    }

    /// Name the command a kernel error belongs to. Other errors pass through.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        if let Self::Kernel { errno, message } = self {
            Self::KernelWithContext {
                operation: operation.into(),
                errno,
                message,
            }
        } else {
            self
        }
    }

    /// Positive errno of a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    /// The bytes on the wire were malformed.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Truncated { .. }
                | Self::SizeMismatch { .. }
                | Self::InvalidMessage(_)
                | Self::InvalidAttribute(_)
        )
    }

    pub fn is_invalidated(&self) -> bool {
        matches!(self, Self::InterfaceInvalidated { .. })
    }

    /// Missing family, interface or object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FamilyNotFound { .. })
            || matches!(self.errno(), Some(libc::ENOENT | libc::ENODEV))
    }

    /// `ENODEV` from a scan request means the driver is wedged.
    pub fn is_no_device(&self) -> bool {
        self.errno() == Some(libc::ENODEV)
    }

    pub fn is_busy(&self) -> bool {
        self.errno() == Some(libc::EBUSY)
    }

    /// Scan and mode changes need `CAP_NET_ADMIN`.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self.errno(), Some(libc::EPERM | libc::EACCES))
    }
}
