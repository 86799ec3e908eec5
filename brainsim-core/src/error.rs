use std::fmt::Display;
use std::path::PathBuf;

use crate::backend::LoadError;
use crate::kernel::LaunchCapability;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An invalid dimension index was queried on a shape.
    #[error("index {index} is greater than max index {max_index}")]
    OutOfRange { index: usize, max_index: usize },

    /// Terminal outcome of a kernel load with no further fallback.
    #[error(transparent)]
    KernelLoad(#[from] KernelLoadFailure),

    #[error("Message: {0}")]
    Msg(String),

    #[error("{inner}\n{backtrace}")]
    WithBacktrace {
        inner: Box<Self>,
        backtrace: Box<std::backtrace::Backtrace>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new error based on a printable error message.
    pub fn msg<M: Display>(msg: M) -> Self {
        Self::Msg(msg.to_string()).bt()
    }

    pub fn bt(self) -> Self {
        let backtrace = std::backtrace::Backtrace::capture();
        match backtrace.status() {
            std::backtrace::BacktraceStatus::Disabled
            | std::backtrace::BacktraceStatus::Unsupported => self,
            _ => Self::WithBacktrace {
                inner: Box::new(self),
                backtrace: Box::new(backtrace),
            },
        }
    }
}

#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::Error::Msg(format!($msg)).bt())
    };
    ($err:expr $(,)?) => {
        return Err($crate::Error::Msg(format!($err)).bt())
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($fmt, $($arg)*)).bt())
    };
}

/// The surfaced, terminal error of a kernel load.
///
/// Carries the full request context so that a packaging defect (wrong module
/// shipped, wrong entry point) can be diagnosed from the error alone. Cloneable
/// so that every requester of a failed key observes the same failure.
#[derive(thiserror::Error, Debug, Clone)]
#[error(
    "cannot load kernel '{kernel_name}' (entry '{entry_point}') from {} on device {ordinal}, requested {requested:?}: {cause}",
    .module_path.display()
)]
pub struct KernelLoadFailure {
    pub ordinal: usize,
    pub module_path: PathBuf,
    pub kernel_name: String,
    pub entry_point: String,
    pub requested: LaunchCapability,
    pub cause: LoadError,
}
