#![deny(missing_docs)]

//! This crate defines error & result types for the PIOL crates.
//! It also contains a variety of useful macros for error handling.

mod ext;

// Aliased so thiserror does not emit the nightly-only `provide` method; same type.
use std::backtrace::Backtrace as StdBacktrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::{fmt, io};

pub use ext::*;

/// A string that can be used as an error message.
#[derive(Debug)]
pub struct ErrString(Cow<'static, str>);

impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    fn from(msg: T) -> Self {
        Self(msg.into())
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The top-level error type for PIOL.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum PiolError {
    /// An index is out of bounds.
    #[error("index {0} out of bounds from {1} to {2}\nBacktrace:\n{3}")]
    OutOfBounds(usize, usize, usize, StdBacktrace),
    /// A rule for the logical key is already present in the rule set.
    #[error("{0}\nBacktrace:\n{1}")]
    DuplicateKey(ErrString, StdBacktrace),
    /// A rule's byte location or numeric kind is inconsistent with the trace header layout.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidLayout(ErrString, StdBacktrace),
    /// Bytes could not be interpreted under the SEG-Y layout.
    #[error("{0}\nBacktrace:\n{1}")]
    FormatError(ErrString, StdBacktrace),
    /// A value cannot be represented by the on-disk numeric kind.
    #[error("{0}\nBacktrace:\n{1}")]
    NumericOverflow(ErrString, StdBacktrace),
    /// An invalid argument was provided.
    #[error("{0}\nBacktrace:\n{1}")]
    InvalidArgument(ErrString, StdBacktrace),
    /// The communication layer failed. Always fatal for the job.
    #[error("{0}\nBacktrace:\n{1}")]
    CommError(ErrString, StdBacktrace),
    /// One or more rows of a batched codec call failed; the other rows were processed.
    #[error("{} row(s) failed, first failure at row {}: {}", .0.len(), first_row(.0), first_message(.0))]
    RowErrors(Vec<(usize, PiolError)>),
    /// A wrapper for other errors, carrying additional context.
    #[error("{0}: {1}")]
    Context(ErrString, #[source] Box<PiolError>),
    /// A wrapper for IO errors.
    #[error(transparent)]
    IOError(#[from] io::Error),
}

fn first_row(failures: &[(usize, PiolError)]) -> usize {
    failures.first().map(|(row, _)| *row).unwrap_or_default()
}

fn first_message(failures: &[(usize, PiolError)]) -> String {
    failures
        .first()
        .map(|(_, err)| err.message().to_string())
        .unwrap_or_default()
}

impl PiolError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        PiolError::Context(msg.into(), Box::new(self))
    }

    /// The message of the error without the captured backtrace.
    pub fn message(&self) -> Cow<'_, str> {
        match self {
            PiolError::DuplicateKey(msg, _)
            | PiolError::InvalidLayout(msg, _)
            | PiolError::FormatError(msg, _)
            | PiolError::NumericOverflow(msg, _)
            | PiolError::InvalidArgument(msg, _)
            | PiolError::CommError(msg, _) => Cow::Borrowed(&**msg),
            PiolError::OutOfBounds(idx, start, stop, _) => {
                Cow::Owned(format!("index {idx} out of bounds from {start} to {stop}"))
            }
            PiolError::RowErrors(failures) => Cow::Owned(format!(
                "{} row(s) failed, first failure at row {}",
                failures.len(),
                first_row(failures)
            )),
            PiolError::Context(msg, inner) => Cow::Owned(format!("{msg}: {}", inner.message())),
            PiolError::IOError(err) => Cow::Owned(err.to_string()),
        }
    }

    /// The innermost error, skipping over any [`PiolError::Context`] wrappers.
    pub fn root_cause(&self) -> &PiolError {
        match self {
            PiolError::Context(_, inner) => inner.root_cause(),
            other => other,
        }
    }

    /// Row failures of a batched codec call, if this is one.
    pub fn row_failures(&self) -> Option<&[(usize, PiolError)]> {
        match self.root_cause() {
            PiolError::RowErrors(failures) => Some(failures),
            _ => None,
        }
    }
}

impl Debug for PiolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<PiolError> for io::Error {
    fn from(value: PiolError) -> Self {
        match value {
            PiolError::IOError(err) => err,
            other => io::Error::other(other),
        }
    }
}

/// A type alias for Results that return PiolErrors as their error type.
pub type PiolResult<T> = Result<T, PiolError>;

/// A convenient macro for creating a PiolError.
#[macro_export]
macro_rules! piol_err {
    (OutOfBounds: $idx:expr, $start:expr, $stop:expr) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::PiolError::OutOfBounds($idx, $start, $stop, Backtrace::capture())
        )
    }};
    (Context: $msg:literal, $err:expr) => {{
        $crate::__private::must_use(
            $crate::PiolError::Context($msg.into(), Box::new($err))
        )
    }};
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::__private::must_use(
            $crate::PiolError::$variant(format!($fmt, $($arg),*).into(), Backtrace::capture())
        )
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::piol_err!(InvalidArgument: $fmt, $($arg),*)
    };
}

/// A convenience macro for returning a PiolError.
#[macro_export]
macro_rules! piol_bail {
    ($($tt:tt)+) => {
        return Err($crate::piol_err!($($tt)+))
    };
}

#[doc(hidden)]
pub mod __private {
    #[doc(hidden)]
    #[inline]
    #[cold]
    #[must_use]
    pub const fn must_use(error: crate::PiolError) -> crate::PiolError {
        error
    }
}
