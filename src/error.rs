use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// The class of a failure, used by callers to decide how to react.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, derive_more::Display)]
pub enum ErrorKind {
    /// A block window could not be fetched, so the reconstructed ledger would have a hole.
    ///
    /// The reconstruction for the whole range must be retried or abandoned; a partial ledger is
    /// never surfaced as if it were complete.
    #[display("incomplete history")]
    IncompleteHistory,

    /// A settlement submission was attempted while another one for the same user was in flight.
    #[display("conflict")]
    Conflict,

    /// The caller supplied invalid input.
    #[display("bad request")]
    BadRequest,

    /// An internal consistency error, or a transient failure of some inner component.
    #[display("internal error")]
    Internal,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    /// Extend an error message with additional context, keeping the same kind.
    pub fn context(self, context: impl Display) -> Self {
        Self {
            message: format!("{context}: {}", self.message),
            kind: self.kind,
        }
    }

    /// Stock error for a failed log-window fetch.
    ///
    /// A gap in the scanned range invalidates every downstream sum, so this error aborts the
    /// reconstruction rather than letting a window be silently skipped. It is generally best
    /// practice to extend the message with the failing window using [`context`](Self::context).
    pub fn incomplete_history() -> Self {
        Self {
            message: "event history is incomplete".to_string(),
            kind: ErrorKind::IncompleteHistory,
        }
    }

    /// Stock error for a second concurrent settlement submission for the same user.
    ///
    /// The planner's dedup keys are only meaningful against a stable settled-ledger snapshot, so
    /// racing submissions are rejected, not retried.
    pub fn conflict() -> Self {
        Self {
            message: "settlement already in flight".to_string(),
            kind: ErrorKind::Conflict,
        }
    }

    /// An error arising from the caller's input.
    pub fn bad_request() -> Self {
        Self {
            message: "bad request".to_string(),
            kind: ErrorKind::BadRequest,
        }
    }

    /// An error internal to the service.
    ///
    /// This can either indicate an internal consistency error, or a transient failure of some
    /// inner component that is out of the caller's control.
    pub fn internal() -> Self {
        Self {
            message: "internal error".to_string(),
            kind: ErrorKind::Internal,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::internal().context(err)
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Extension functions for converting other result types into [`Result`].
pub trait ResultExt {
    type Ok;

    /// Wrap an error with a domain error kind, preserving the original error context.
    fn context(self, f: impl FnOnce() -> Error) -> Result<Self::Ok>;
}

impl<T, E> ResultExt for Result<T, E>
where
    E: std::error::Error,
{
    type Ok = T;

    fn context(self, f: impl FnOnce() -> Error) -> Result<<Self as ResultExt>::Ok> {
        self.map_err(|err| f().context(err))
    }
}

macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !$cond {
            return Err($err);
        }
    };
}
pub(crate) use ensure;
