//! Error type, numeric error codes, and their symbolic names.

use crate::dataset::{Dataset, Format};
use crate::element::NcType;
use crate::mode::ModeFault;
use crate::request::RequestId;
use crate::slice::{ImapFault, RegionFault};
use crate::store::Store;
use std::error;
use std::fmt;
use std::io;
use std::result;

/// A numeric error code, as reported per request by
/// [`Dataset::wait_all`](crate::Dataset::wait_all).
///
/// [`ErrorCode::NOERR`] is the sentinel meaning "no error". Every other code
/// is negative. Use [`strerror`] and [`strerrno`] (or the `Display` impl) to
/// turn a code into something readable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const NOERR: ErrorCode = ErrorCode(0);
    pub const EINVAL: ErrorCode = ErrorCode(-36);
    pub const EPERM: ErrorCode = ErrorCode(-37);
    pub const ENOTINDEFINE: ErrorCode = ErrorCode(-38);
    pub const EINDEFINE: ErrorCode = ErrorCode(-39);
    pub const EINVALCOORDS: ErrorCode = ErrorCode(-40);
    pub const ENAMEINUSE: ErrorCode = ErrorCode(-42);
    pub const EBADTYPE: ErrorCode = ErrorCode(-45);
    pub const EBADDIM: ErrorCode = ErrorCode(-46);
    pub const EUNLIMPOS: ErrorCode = ErrorCode(-47);
    pub const ENOTVAR: ErrorCode = ErrorCode(-49);
    pub const EUNLIMIT: ErrorCode = ErrorCode(-54);
    pub const EEDGE: ErrorCode = ErrorCode(-57);
    pub const ESTRIDE: ErrorCode = ErrorCode(-58);
    pub const ENOMEM: ErrorCode = ErrorCode(-61);
    pub const ENOTINDEP: ErrorCode = ErrorCode(-202);
    pub const EINDEP: ErrorCode = ErrorCode(-203);
    pub const EFILE: ErrorCode = ErrorCode(-204);
    pub const EREAD: ErrorCode = ErrorCode(-205);
    pub const EWRITE: ErrorCode = ErrorCode(-206);
    pub const EIOMISMATCH: ErrorCode = ErrorCode(-209);
    pub const EINVAL_REQUEST: ErrorCode = ErrorCode(-212);
    pub const ENOTSUPPORT: ErrorCode = ErrorCode(-214);
    pub const EPREVATTACHBUF: ErrorCode = ErrorCode(-216);
    pub const ENULLABUF: ErrorCode = ErrorCode(-217);
    pub const EPENDINGBPUT: ErrorCode = ErrorCode(-218);
    pub const EINSUFFBUF: ErrorCode = ErrorCode(-219);
    pub const EPENDING: ErrorCode = ErrorCode(-231);

    /// Returns `true` iff this is [`ErrorCode::NOERR`].
    pub fn is_ok(self) -> bool {
        self == ErrorCode::NOERR
    }

    /// The symbolic name of the code, e.g. `"NC_EINSUFFBUF"`.
    pub fn name(self) -> &'static str {
        strerrno(self)
    }

    /// A human-readable description of the code.
    pub fn message(self) -> &'static str {
        strerror(self)
    }
}

impl Default for ErrorCode {
    fn default() -> ErrorCode {
        ErrorCode::NOERR
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", strerror(*self), strerrno(*self))
    }
}

macro_rules! error_table {
    ($(($code:ident, $name:expr, $msg:expr)),* $(,)?) => {
        /// Returns the human-readable message for `code`.
        pub fn strerror(code: ErrorCode) -> &'static str {
            match code {
                $(ErrorCode::$code => $msg,)*
                _ => "Unknown error",
            }
        }

        /// Returns the symbolic name for `code`, e.g. `"NC_NOERR"`.
        pub fn strerrno(code: ErrorCode) -> &'static str {
            match code {
                $(ErrorCode::$code => $name,)*
                _ => "NC_EUNKNOWN",
            }
        }
    };
}

error_table! {
    (NOERR, "NC_NOERR", "No error"),
    (EINVAL, "NC_EINVAL", "Invalid argument"),
    (EPERM, "NC_EPERM", "Write to read only"),
    (ENOTINDEFINE, "NC_ENOTINDEFINE", "Operation not allowed in data mode"),
    (EINDEFINE, "NC_EINDEFINE", "Operation not allowed in define mode"),
    (EINVALCOORDS, "NC_EINVALCOORDS", "Index exceeds dimension bound"),
    (ENAMEINUSE, "NC_ENAMEINUSE", "String match to name in use"),
    (EBADTYPE, "NC_EBADTYPE", "Not a valid data type or type mismatch"),
    (EBADDIM, "NC_EBADDIM", "Invalid dimension id or name"),
    (EUNLIMPOS, "NC_EUNLIMPOS", "NC_UNLIMITED in the wrong index"),
    (ENOTVAR, "NC_ENOTVAR", "Variable not found"),
    (EUNLIMIT, "NC_EUNLIMIT", "NC_UNLIMITED size already in use"),
    (EEDGE, "NC_EEDGE", "Start+count exceeds dimension bound"),
    (ESTRIDE, "NC_ESTRIDE", "Illegal stride"),
    (ENOMEM, "NC_ENOMEM", "Memory allocation (malloc) failure"),
    (ENOTINDEP, "NC_ENOTINDEP", "Operation not allowed in collective data mode"),
    (EINDEP, "NC_EINDEP", "Operation not allowed in independent data mode"),
    (EFILE, "NC_EFILE", "Unknown error in file operation"),
    (EREAD, "NC_EREAD", "Unknown error in reading file"),
    (EWRITE, "NC_EWRITE", "Unknown error in writing to file"),
    (EIOMISMATCH, "NC_EIOMISMATCH", "Input/Output data amount mismatch"),
    (EINVAL_REQUEST, "NC_EINVAL_REQUEST", "Invalid nonblocking request ID"),
    (ENOTSUPPORT, "NC_ENOTSUPPORT", "Feature is not supported"),
    (EPREVATTACHBUF, "NC_EPREVATTACHBUF", "Attached buffer was previously attached"),
    (ENULLABUF, "NC_ENULLABUF", "No attached buffer"),
    (EPENDINGBPUT, "NC_EPENDINGBPUT", "Cannot detach buffer as pending bput requests exist"),
    (EINSUFFBUF, "NC_EINSUFFBUF", "Insufficient size of attached buffer"),
    (EPENDING, "NC_EPENDING", "Pending nonblocking requests exist"),
}

/// A failure reported by a [`Store`] during a physical transfer or a
/// collective operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreError {
    code: ErrorCode,
    message: String,
}

impl StoreError {
    pub fn new<M: Into<String>>(code: ErrorCode, message: M) -> StoreError {
        StoreError {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl error::Error for StoreError {}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.message, strerrno(self.code))
    }
}

/// An error from any dataset, variable, buffer, or request operation.
#[derive(Debug)]
pub enum Error {
    /// An axis of the selection lies outside the variable's shape.
    InvalidRegion { axis: usize, fault: RegionFault },
    /// The selection's dimensionality differs from the variable's rank.
    RankMismatch { expected: usize, found: usize },
    /// An index map was given where it cannot be honoured.
    UnsupportedImap(ImapFault),
    /// The attached buffer cannot hold another `requested` bytes.
    BufferExhausted { requested: usize, available: usize },
    /// A buffer reservation was released more than once.
    DoubleRelease,
    /// The attached buffer still holds `usage` bytes of staged requests.
    BufferBusy { usage: usize },
    NoBufferAttached,
    AlreadyAttached,
    InvalidCapacity(usize),
    /// The id was never issued by this dataset, or its slot has been reused.
    UnknownRequest(RequestId),
    /// The request exists but has already been committed or cancelled.
    RequestNotPending(RequestId),
    /// `n` nonblocking requests are still outstanding.
    PendingRequests(usize),
    InvalidModeTransition(ModeFault),
    NameInUse(String),
    NoSuchDimension(String),
    NoSuchVariable(String),
    /// The dataset already has an unlimited dimension.
    UnlimitedInUse,
    /// The named variable uses the unlimited dimension on an axis other than 0.
    UnlimitedPosition(String),
    /// The type cannot be stored in this file format.
    BadType { nc_type: NcType, format: Format },
    /// The element type of the caller's data differs from the variable's.
    TypeMismatch { expected: NcType, found: NcType },
    /// The caller's data holds `found` elements but the selection needs `expected`.
    ShapeMismatch { expected: usize, found: usize },
    /// The dataset was opened read-only.
    ReadOnly,
    /// `rank` is not a member of a group of `size` processes.
    InvalidGroup { rank: usize, size: usize },
    Collaborator(StoreError),
    Io(io::Error),
}

impl Error {
    /// The error code reported for this error.
    pub fn code(&self) -> ErrorCode {
        use Error::*;
        match self {
            InvalidRegion { fault, .. } => fault.code(),
            RankMismatch { .. } => ErrorCode::EINVAL,
            UnsupportedImap(_) => ErrorCode::ENOTSUPPORT,
            BufferExhausted { .. } => ErrorCode::EINSUFFBUF,
            DoubleRelease => ErrorCode::EINVAL,
            BufferBusy { .. } => ErrorCode::EPENDINGBPUT,
            NoBufferAttached => ErrorCode::ENULLABUF,
            AlreadyAttached => ErrorCode::EPREVATTACHBUF,
            InvalidCapacity(_) => ErrorCode::EINVAL,
            UnknownRequest(_) => ErrorCode::EINVAL_REQUEST,
            RequestNotPending(_) => ErrorCode::EINVAL_REQUEST,
            PendingRequests(_) => ErrorCode::EPENDING,
            InvalidModeTransition(fault) => fault.code(),
            NameInUse(_) => ErrorCode::ENAMEINUSE,
            NoSuchDimension(_) => ErrorCode::EBADDIM,
            NoSuchVariable(_) => ErrorCode::ENOTVAR,
            UnlimitedInUse => ErrorCode::EUNLIMIT,
            UnlimitedPosition(_) => ErrorCode::EUNLIMPOS,
            BadType { .. } => ErrorCode::EBADTYPE,
            TypeMismatch { .. } => ErrorCode::EBADTYPE,
            ShapeMismatch { .. } => ErrorCode::EIOMISMATCH,
            ReadOnly => ErrorCode::EPERM,
            InvalidGroup { .. } => ErrorCode::EINVAL,
            Collaborator(err) => err.code(),
            Io(_) => ErrorCode::EREAD,
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Collaborator(err) => Some(err),
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;
        match self {
            InvalidRegion { axis, fault } => write!(f, "invalid region on axis {}: {}", axis, fault),
            RankMismatch { expected, found } => write!(
                f,
                "selection has {} dimensions but the variable has {}",
                found, expected
            ),
            UnsupportedImap(fault) => write!(f, "unsupported index map: {}", fault),
            BufferExhausted {
                requested,
                available,
            } => write!(
                f,
                "attached buffer exhausted: {} bytes requested, {} available",
                requested, available
            ),
            DoubleRelease => write!(f, "buffer reservation released twice"),
            BufferBusy { usage } => write!(
                f,
                "attached buffer is busy with {} bytes of pending requests",
                usage
            ),
            NoBufferAttached => write!(f, "no buffer is attached"),
            AlreadyAttached => write!(f, "a buffer is already attached"),
            InvalidCapacity(cap) => write!(f, "invalid buffer capacity: {}", cap),
            UnknownRequest(id) => write!(f, "unknown request id {}", id),
            RequestNotPending(id) => write!(f, "request {} is not pending", id),
            PendingRequests(n) => write!(f, "{} nonblocking requests are still pending", n),
            InvalidModeTransition(fault) => write!(f, "{}", fault),
            NameInUse(name) => write!(f, "name already in use: {}", name),
            NoSuchDimension(name) => write!(f, "no such dimension: {}", name),
            NoSuchVariable(name) => write!(f, "no such variable: {}", name),
            UnlimitedInUse => write!(f, "the dataset already has an unlimited dimension"),
            UnlimitedPosition(name) => write!(
                f,
                "variable {} uses the unlimited dimension on an axis other than the first",
                name
            ),
            BadType { nc_type, format } => {
                write!(f, "type {} is not supported by the {} format", nc_type, format)
            }
            TypeMismatch { expected, found } => write!(
                f,
                "element type {} does not match the variable's type {}",
                found, expected
            ),
            ShapeMismatch { expected, found } => write!(
                f,
                "data has {} elements but the selection needs {}",
                found, expected
            ),
            ReadOnly => write!(f, "the dataset is read-only"),
            InvalidGroup { rank, size } => {
                write!(f, "rank {} is outside a group of {}", rank, size)
            }
            Collaborator(err) => write!(f, "store error: {}", err),
            Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Error {
        Error::Collaborator(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// An error closing a dataset.
///
/// Closing fails without losing anything: [`CloseError::into_dataset`] hands
/// the dataset back so the caller can commit or cancel its requests and try
/// again.
pub struct CloseError<S: Store> {
    dataset: Dataset<S>,
    error: Error,
}

impl<S: Store> CloseError<S> {
    pub(crate) fn new(dataset: Dataset<S>, error: Error) -> CloseError<S> {
        CloseError { dataset, error }
    }

    pub fn error(&self) -> &Error {
        &self.error
    }

    pub fn into_dataset(self) -> Dataset<S> {
        self.dataset
    }

    pub fn into_parts(self) -> (Dataset<S>, Error) {
        (self.dataset, self.error)
    }
}

impl<S: Store> fmt::Debug for CloseError<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CloseError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<S: Store> fmt::Display for CloseError<S> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "error closing dataset: {}", self.error)
    }
}

impl<S: Store> error::Error for CloseError<S> {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.error)
    }
}
