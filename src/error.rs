//! Hand-rolled error type for the buffer pool core.
//!
//! `small-db` favors a single hand-rolled error struct over `thiserror`/`anyhow`;
//! this carries that convention forward but turns it into an enum so callers can
//! match on the specific failure kind: `TransactionAborted`, `NoEvictable`,
//! `IoError`, `Interrupted`, or `Other`. Every variant captures a `backtrace`
//! at construction, mirroring `small-db`'s own `SmallError::show_backtrace()`
//! calls at its lock-timeout and deadlock error sites.

use std::{error::Error, fmt, io};

use backtrace::Backtrace;

/// The failure kinds the page cache core can raise.
#[derive(Debug)]
pub enum SmallError {
    /// Lock acquisition exhausted its retry budget; the caller must abort.
    TransactionAborted { detail: String, backtrace: Backtrace },

    /// The cache is full of dirty pages and cannot make room for a new one.
    NoEvictable { detail: String, backtrace: Backtrace },

    /// A read/write against the external `DbFile`/`LogFile` failed.
    IoError { detail: String, source: Option<io::Error>, backtrace: Backtrace },

    /// A blocking lock wait was interrupted before its budget expired.
    Interrupted { detail: String, backtrace: Backtrace },

    /// Anything else a collaborator trait wants to report.
    Other { detail: String, backtrace: Backtrace },
}

impl SmallError {
    pub fn aborted(detail: impl Into<String>) -> Self {
        SmallError::TransactionAborted { detail: detail.into(), backtrace: Backtrace::new() }
    }

    pub fn no_evictable(detail: impl Into<String>) -> Self {
        SmallError::NoEvictable { detail: detail.into(), backtrace: Backtrace::new() }
    }

    pub fn io(detail: impl Into<String>) -> Self {
        SmallError::IoError { detail: detail.into(), source: None, backtrace: Backtrace::new() }
    }

    pub fn interrupted(detail: impl Into<String>) -> Self {
        SmallError::Interrupted { detail: detail.into(), backtrace: Backtrace::new() }
    }

    pub fn other(detail: impl Into<String>) -> Self {
        SmallError::Other { detail: detail.into(), backtrace: Backtrace::new() }
    }

    /// True if this error should be surfaced to the caller as a transaction abort.
    pub fn is_abort(&self) -> bool {
        matches!(self, SmallError::TransactionAborted { .. })
    }

    /// Logs the backtrace captured when this error was constructed. Callers
    /// at a failure boundary (a timed-out `acquire`, an unrecoverable
    /// `IoError`) call this before propagating, in the same spot `small-db`
    /// calls `err.show_backtrace()`.
    pub fn show_backtrace(&self) {
        let bt = match self {
            SmallError::TransactionAborted { backtrace, .. }
            | SmallError::NoEvictable { backtrace, .. }
            | SmallError::IoError { backtrace, .. }
            | SmallError::Interrupted { backtrace, .. }
            | SmallError::Other { backtrace, .. } => backtrace,
        };
        log::error!("{}\n{:?}", self, bt);
    }
}

impl fmt::Display for SmallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SmallError::TransactionAborted { detail, .. } => {
                write!(f, "transaction aborted: {}", detail)
            }
            SmallError::NoEvictable { detail, .. } => {
                write!(f, "no evictable page: {}", detail)
            }
            SmallError::IoError { detail, source, .. } => match source {
                Some(e) => write!(f, "io error: {} ({})", detail, e),
                None => write!(f, "io error: {}", detail),
            },
            SmallError::Interrupted { detail, .. } => {
                write!(f, "interrupted: {}", detail)
            }
            SmallError::Other { detail, .. } => write!(f, "{}", detail),
        }
    }
}

impl Error for SmallError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SmallError::IoError { source: Some(e), .. } => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SmallError {
    fn from(e: io::Error) -> Self {
        SmallError::IoError { detail: e.to_string(), source: Some(e), backtrace: Backtrace::new() }
    }
}

/// Shorthand used everywhere a core operation can fail, mirroring `small-db`'s
/// `types::SmallResult`.
pub type SmallResult<T = ()> = Result<T, SmallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let e = SmallError::no_evictable("cache full of dirty pages");
        assert!(e.to_string().contains("cache full of dirty pages"));
    }

    #[test]
    fn is_abort_only_for_transaction_aborted() {
        assert!(SmallError::aborted("retry budget exhausted").is_abort());
        assert!(!SmallError::no_evictable("x").is_abort());
    }
}
