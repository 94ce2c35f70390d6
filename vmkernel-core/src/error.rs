//! Scheduler error taxonomy (spec §7).

/// Errors returned by the scheduler tree, allocation model, wait engine and
/// user boundary. Named abstractly rather than per-subsystem since callers
/// routinely propagate one subsystem's error out through another (e.g. a
/// `move_group` admission failure surfaces through the tree API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedError {
    #[error("malformed request")]
    BadParam,
    #[error("no such id or name")]
    NotFound,
    #[error("name collision")]
    Exists,
    #[error("entity busy")]
    Busy,
    #[error("capacity or depth limit exceeded")]
    LimitExceeded,
    #[error("heap exhausted")]
    NoMemory,
    #[error("user address not accessible")]
    NoAccess,
    #[error("invalid user address")]
    InvalidAddress,
    #[error("incompatible peer version")]
    VersionMismatch { major: u16, minor: u16 },
    #[error("wait deadline elapsed")]
    Timeout,
    #[error("cartel is terminating")]
    DeathPending,
    #[error("feature not supported on this build")]
    NotSupported,
    #[error("world not fully initialized")]
    NotReady,
}

pub type SchedResult<T> = Result<T, SchedError>;
