//! Error types for study configuration, work injection and execution.
//!
//! Every [`StudyError`] is fatal for the run that produced it: the study
//! does not retry, and buffers may hold stranded work afterwards.

use std::error::Error;
use std::fmt;

use parstudy_comm::{CodecError, Rank};

use crate::config::Method;

/// Invalid [`StudyConfig`](crate::StudyConfig) values.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// An option that must be positive was zero.
    Zero {
        /// Name of the option.
        option: &'static str,
    },
    /// `min_buffer_size` outside `1..=send_buffer_size`.
    MinBufferSize {
        /// Configured floor.
        min: usize,
        /// Configured `send_buffer_size`.
        max: usize,
    },
    /// `buffer_growth_multiplier` is not finite or below 1.
    GrowthMultiplier {
        /// Configured value.
        value: f64,
    },
    /// `buffer_shrink_multiplier` is outside `(0, 1]`.
    ShrinkMultiplier {
        /// Configured value.
        value: f64,
    },
    /// `method` string did not name a known algorithm.
    UnknownMethod {
        /// The rejected input.
        value: String,
    },
    /// `work_buffer_type` string did not name a known buffer.
    UnknownWorkBufferType {
        /// The rejected input.
        value: String,
    },
    /// `allow_new_work_during_execution` was set with a method other
    /// than SMART.
    NewWorkRequiresSmart {
        /// The configured method.
        method: Method,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero { option } => write!(f, "{option} must be greater than zero"),
            Self::MinBufferSize { min, max } => write!(
                f,
                "min_buffer_size {min} must be in 1..=send_buffer_size ({max})"
            ),
            Self::GrowthMultiplier { value } => write!(
                f,
                "buffer_growth_multiplier must be finite and at least 1, got {value}"
            ),
            Self::ShrinkMultiplier { value } => {
                write!(f, "buffer_shrink_multiplier must be in (0, 1], got {value}")
            }
            Self::UnknownMethod { value } => {
                write!(f, "unknown method '{value}' (expected smart, harm or bs)")
            }
            Self::UnknownWorkBufferType { value } => write!(
                f,
                "unknown work_buffer_type '{value}' (expected lifo or circular)"
            ),
            Self::NewWorkRequiresSmart { method } => write!(
                f,
                "allow_new_work_during_execution is only supported by SMART, not {method}"
            ),
        }
    }
}

impl Error for ConfigError {}

/// Misuse of the work injection API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveWorkError {
    /// New work was moved in while executing, but the study does not
    /// allow new work during execution.
    DuringExecutionDisabled,
    /// Work was moved in outside pre-execution and execution.
    PreExecutionAndExecutionOnly,
    /// Work was moved in outside pre-execution.
    PreExecutionOnly,
    /// Work was moved in during pre-execution from a thread other than 0.
    PreExecutionThread0Only,
    /// Continuing work was moved in while a chunk was executing.
    ContinuingDuringExecutingWork,
}

impl fmt::Display for MoveWorkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuringExecutionDisabled => write!(
                f,
                "moving new work into the buffer during execution requires \
                 allow_new_work_during_execution = true"
            ),
            Self::PreExecutionAndExecutionOnly => write!(
                f,
                "can only move work into the buffer in the pre-execution and execution phase \
                 (between pre_execute() and the end of execute())"
            ),
            Self::PreExecutionOnly => write!(
                f,
                "can only move work into the buffer in the pre-execution phase \
                 (between pre_execute() and execute())"
            ),
            Self::PreExecutionThread0Only => write!(
                f,
                "can only move work into the buffer in the pre-execution phase \
                 (between pre_execute() and execute()) on thread 0"
            ),
            Self::ContinuingDuringExecutingWork => write!(
                f,
                "cannot move continuing work into the buffer while a chunk is executing"
            ),
        }
    }
}

impl Error for MoveWorkError {}

/// Which buffer check failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferCheck {
    /// At the start of [`pre_execute`](crate::ParallelStudy::pre_execute).
    PreExecute,
    /// At the end of [`execute`](crate::ParallelStudy::execute).
    AfterExecution,
}

impl fmt::Display for BufferCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PreExecute => "in pre_execute()",
            Self::AfterExecution => "after execution",
        })
    }
}

/// Errors from running a [`ParallelStudy`](crate::ParallelStudy).
#[derive(Clone, Debug, PartialEq)]
pub enum StudyError {
    /// The configuration failed validation.
    Config(ConfigError),
    /// Work was injected at a time or from a thread that is not allowed.
    MoveWork {
        /// Study name.
        study: String,
        /// The specific misuse.
        error: MoveWorkError,
    },
    /// `execute()` was called without a preceding `pre_execute()`.
    NotPreExecuted {
        /// Study name.
        study: String,
    },
    /// Work or communication buffers held data when they had to be empty.
    BuffersNotEmpty {
        /// Study name.
        study: String,
        /// Where the check ran.
        when: BufferCheck,
    },
    /// Parallel data was sent outside pre-execution and execution.
    NotExecuting {
        /// Study name.
        study: String,
    },
    /// `reserve_buffer()` was called outside pre-execution.
    ReserveOutsidePreExecution {
        /// Study name.
        study: String,
    },
    /// Parallel data was addressed to this rank or a rank that does not exist.
    InvalidDestination {
        /// Study name.
        study: String,
        /// Requested destination.
        dest: Rank,
        /// Communicator size.
        size: usize,
    },
    /// The handler asked for an alternate ending with a method other than SMART.
    AlternateEndingUnsupported {
        /// Study name.
        study: String,
        /// The configured method.
        method: Method,
    },
    /// Received parallel data failed to decode.
    Codec(CodecError),
    /// A handler hook reported its own failure.
    Handler {
        /// Description supplied by the handler.
        reason: String,
    },
}

impl StudyError {
    /// Convenience for handler implementations.
    pub fn handler(reason: impl Into<String>) -> Self {
        Self::Handler {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for StudyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::MoveWork { study, error } => write!(f, "{study}: {error}"),
            Self::NotPreExecuted { study } => {
                write!(f, "{study}: pre_execute() was not called before execute()")
            }
            Self::BuffersNotEmpty { study, when } => {
                write!(f, "{study}: buffers are not empty {when}")
            }
            Self::NotExecuting { study } => {
                write!(f, "{study}: cannot send parallel data when not executing")
            }
            Self::ReserveOutsidePreExecution { study } => write!(
                f,
                "{study}: can only reserve in the work buffer during pre-execution"
            ),
            Self::InvalidDestination { study, dest, size } => write!(
                f,
                "{study}: invalid destination rank {dest} for parallel data (size {size}, self excluded)"
            ),
            Self::AlternateEndingUnsupported { study, method } => write!(
                f,
                "{study}: alternate ending criteria not supported for {method}"
            ),
            Self::Codec(e) => write!(f, "failed to decode parallel data: {e}"),
            Self::Handler { reason } => write!(f, "handler failed: {reason}"),
        }
    }
}

impl Error for StudyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::MoveWork { error, .. } => Some(error),
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for StudyError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<CodecError> for StudyError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}
