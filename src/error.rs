use std::convert::From;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::result;
use std::sync;

/// StatusCode describes the recoverable failure modes of filter construction.
///
/// Broken invariants (row-count mismatches, out-of-domain bit access and the
/// like) are not represented here; those halt the process with a diagnostic
/// instead of travelling through `Result`.
#[derive(Clone, Debug, PartialEq)]
pub enum StatusCode {
    OK,

    InvalidArgument,
    InvalidData,
    LockError,
    NotFound,
    NotSupported,
    TypeMismatch,
    Unknown,
}

/// Status encapsulates a `StatusCode` and an error message. It can be displayed, and also
/// implements `Error`.
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub code: StatusCode,
    pub err: String,
}

impl Default for Status {
    fn default() -> Status {
        Status {
            code: StatusCode::OK,
            err: String::new(),
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter) -> result::Result<(), fmt::Error> {
        fmt.write_str(&self.err)
    }
}

impl Error for Status {}

impl Status {
    pub fn new(code: StatusCode, msg: &str) -> Status {
        let err = if msg.is_empty() {
            format!("{:?}", code)
        } else {
            format!("{:?}: {}", code, msg)
        };
        Status { code, err }
    }
    pub fn annotate<S: AsRef<str>>(self, msg: S) -> Status {
        Status {
            code: self.code,
            err: format!("{}: {}", msg.as_ref(), self.err),
        }
    }
}

/// The crate-wide result type.
pub type Result<T> = result::Result<T, Status>;

impl<T> From<sync::PoisonError<T>> for Status {
    fn from(_: sync::PoisonError<T>) -> Status {
        Status::new(StatusCode::LockError, "lock poisoned")
    }
}
