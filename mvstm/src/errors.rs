use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Error kinds for STM operations
///
/// The first three kinds are control-flow signals: they never escape [`run`](crate::run)
/// and are consumed by the retry loop. Every other kind is fatal and propagates to
/// the caller unchanged.
///
/// # Examples
///
/// ```rust,ignore
/// use mvstm::errors::{StmError, ErrorKind, StmResult};
///
/// fn example() -> StmResult<()> {
///     Err(StmError::new("ref is unbound", ErrorKind::UnboundRef))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Control-flow signals - consumed by the retry loop
    /// Transient conflict; the attempt is discarded and replayed immediately
    Retry,
    /// Blocking retry; the attempt is replayed once a watched ref changes
    BlockingRetry,
    /// Intentional early exit requested by the transaction body
    Abort,

    // Transaction lifecycle errors
    /// The transaction exhausted its retry budget
    RetryLimitExceeded,
    /// A transactional operation was called with no transaction running
    NoTransaction,
    /// The operation is not allowed in the current context
    IllegalState,
    /// An argument was rejected
    InvalidArgument,

    // Ref errors
    /// The ref was read before it was ever bound to a value
    UnboundRef,
    /// A validator rejected the proposed value
    ValidationError,

    // Event errors
    /// A listener tried to restart a transaction that is committing or aborting
    EventError,

    // Callback errors
    /// A user callable failed with a foreign error
    CallbackError,

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl ErrorKind {
    /// Returns `true` for the kinds handled by the retry loop.
    pub fn is_signal(&self) -> bool {
        matches!(self, ErrorKind::Retry | ErrorKind::BlockingRetry | ErrorKind::Abort)
    }

    /// Returns `true` for both flavours of retry.
    pub fn is_retry(&self) -> bool {
        matches!(self, ErrorKind::Retry | ErrorKind::BlockingRetry)
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Retry => write!(f, "Retry"),
            ErrorKind::BlockingRetry => write!(f, "Blocking retry"),
            ErrorKind::Abort => write!(f, "Abort"),
            ErrorKind::RetryLimitExceeded => write!(f, "Retry limit exceeded"),
            ErrorKind::NoTransaction => write!(f, "No transaction"),
            ErrorKind::IllegalState => write!(f, "Illegal state"),
            ErrorKind::InvalidArgument => write!(f, "Invalid argument"),
            ErrorKind::UnboundRef => write!(f, "Unbound ref"),
            ErrorKind::ValidationError => write!(f, "Validation error"),
            ErrorKind::EventError => write!(f, "Event error"),
            ErrorKind::CallbackError => write!(f, "Callback error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom STM error type.
///
/// `StmError` carries a message, an [`ErrorKind`], an optional cause and, for fatal
/// kinds, a backtrace captured unresolved at construction and resolved on first
/// `Debug` print. Signals skip the capture because a contended transaction raises
/// them thousands of times.
///
/// # Examples
///
/// ```rust,ignore
/// use mvstm::errors::{StmError, ErrorKind};
///
/// let cause = StmError::new("counter must stay positive", ErrorKind::CallbackError);
/// let err = StmError::new_with_cause("Invalid reference state", ErrorKind::ValidationError, cause);
/// ```
#[derive(Clone)]
pub struct StmError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<StmError>>,
    backtrace: Option<Atomic<Backtrace>>,
}

impl StmError {
    /// Creates a new `StmError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        let backtrace = if error_kind.is_signal() {
            None
        } else {
            Some(atomic(Backtrace::new_unresolved()))
        };
        StmError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace,
        }
    }

    /// Creates a new `StmError` chained to the error that caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: StmError) -> Self {
        let mut error = StmError::new(message, error_kind);
        error.cause = Some(Box::new(cause));
        error
    }

    /// The ordinary conflict signal.
    pub fn retry() -> Self {
        StmError::new("transaction retry", ErrorKind::Retry)
    }

    /// The blocking retry signal raised by `block_retry` and exhausted `or_else`.
    pub fn blocking_retry() -> Self {
        StmError::new("transaction blocking retry", ErrorKind::BlockingRetry)
    }

    /// The abort signal.
    pub fn abort() -> Self {
        StmError::new("transaction aborted", ErrorKind::Abort)
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&StmError> {
        self.cause.as_deref()
    }

    pub fn is_retry(&self) -> bool {
        self.error_kind.is_retry()
    }
}

impl Display for StmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for StmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.cause, &self.backtrace) {
            (Some(cause), _) => write!(f, "{}: {}\nCaused by: {:?}", self.error_kind, self.message, cause),
            (None, Some(backtrace)) => {
                let mut backtrace = backtrace.write();
                backtrace.resolve();
                write!(f, "{}: {}\n{:?}", self.error_kind, self.message, *backtrace)
            }
            (None, None) => write!(f, "{}: {}", self.error_kind, self.message),
        }
    }
}

impl Error for StmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for STM operations.
///
/// `StmResult<T>` is shorthand for `Result<T, StmError>`.
pub type StmResult<T> = Result<T, StmError>;

// Lets user callables fail with `?` on any error type.
impl From<anyhow::Error> for StmError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<StmError>() {
            Ok(stm_error) => stm_error,
            Err(err) => StmError::new(&format!("{:#}", err), ErrorKind::CallbackError),
        }
    }
}

impl From<String> for StmError {
    fn from(msg: String) -> Self {
        StmError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for StmError {
    fn from(msg: &str) -> Self {
        StmError::new(msg, ErrorKind::InternalError)
    }
}
