use std::fmt;

use crate::dtype::DType;
use crate::shape::Shape;

/// Every failure the primitive cache and its backends can report.
///
/// Variants fall into three kinds (see [`ErrorKind`]): configuration errors
/// are detected before any backend call, planning errors come from a backend
/// refusing a descriptor combination, and execution errors come from binding
/// or running an already planned primitive.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Signed axis outside `[-rank, rank)`.
    #[error("axis {axis} out of range for tensor of rank {rank}")]
    AxisOutOfRange { axis: i64, rank: usize },

    #[error("dimension out of range: dim {dim} for tensor with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    #[error("rank mismatch: expected rank {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Two concat inputs disagree on a dimension other than the concat axis.
    #[error("concat input {input}: dim {dim} is {got}, expected {expected}")]
    ConcatDimMismatch {
        input: usize,
        dim: usize,
        expected: usize,
        got: usize,
    },

    #[error("{op}: at least one input is required")]
    EmptyInputs { op: &'static str },

    /// Temperature that cannot be turned into a finite scale factor.
    #[error("unsupported softmax temperature {0}")]
    UnsupportedTemperature(f32),

    /// The backend rejected a primitive request.
    #[error("cannot plan {primitive}: {reason}")]
    Planning { primitive: String, reason: String },

    /// A tensor bound for one call does not fit the planned primitive.
    #[error("bad binding for argument {arg}: {reason}")]
    Binding { arg: String, reason: String },

    /// The backend failed while running a planned primitive.
    #[error("executing {primitive} failed: {reason}")]
    Execution { primitive: String, reason: String },

    #[error("{0}")]
    Msg(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Planning,
    Execution,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Planning => "planning",
            ErrorKind::Execution => "execution",
            ErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

impl Error {
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    pub fn planning(primitive: impl fmt::Display, reason: impl Into<String>) -> Self {
        Error::Planning {
            primitive: primitive.to_string(),
            reason: reason.into(),
        }
    }

    pub fn binding(arg: impl fmt::Display, reason: impl Into<String>) -> Self {
        Error::Binding {
            arg: arg.to_string(),
            reason: reason.into(),
        }
    }

    pub fn execution(primitive: impl fmt::Display, reason: impl Into<String>) -> Self {
        Error::Execution {
            primitive: primitive.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AxisOutOfRange { .. }
            | Error::DimOutOfRange { .. }
            | Error::RankMismatch { .. }
            | Error::DTypeMismatch { .. }
            | Error::ShapeMismatch { .. }
            | Error::ConcatDimMismatch { .. }
            | Error::EmptyInputs { .. }
            | Error::UnsupportedTemperature(_) => ErrorKind::Configuration,
            Error::Planning { .. } => ErrorKind::Planning,
            Error::Binding { .. } | Error::Execution { .. } => ErrorKind::Execution,
            Error::Msg(_) => ErrorKind::Other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_planning(&self) -> bool {
        self.kind() == ErrorKind::Planning
    }

    pub fn is_execution(&self) -> bool {
        self.kind() == ErrorKind::Execution
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted [`Error::Msg`].
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert!(Error::AxisOutOfRange { axis: 3, rank: 3 }.is_configuration());
        assert!(Error::UnsupportedTemperature(0.0).is_configuration());
        assert!(Error::planning("softmax_forward", "u8 data").is_planning());
        assert!(Error::binding("dst", "too small").is_execution());
        assert!(Error::execution("concat", "stream lost").is_execution());
        assert_eq!(Error::msg("x").kind(), ErrorKind::Other);
    }

    #[test]
    fn test_messages() {
        let e = Error::AxisOutOfRange { axis: -4, rank: 3 };
        assert_eq!(e.to_string(), "axis -4 out of range for tensor of rank 3");
        let e = Error::planning("softmax_forward", "dtype u8 is not supported");
        assert_eq!(
            e.to_string(),
            "cannot plan softmax_forward: dtype u8 is not supported"
        );
    }

    fn fails() -> Result<()> {
        crate::bail!("broken {}", 42)
    }

    #[test]
    fn test_bail() {
        assert_eq!(fails().unwrap_err().to_string(), "broken 42");
    }
}
