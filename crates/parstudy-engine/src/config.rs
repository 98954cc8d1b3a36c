//! Study configuration and validation.
//!
//! [`StudyConfig`] carries every tunable of a [`ParallelStudy`](crate::ParallelStudy).
//! [`validate()`](StudyConfig::validate) is run by the study constructor,
//! so an invalid configuration never reaches the execution loop.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

// ── Method ─────────────────────────────────────────────────────────

/// Termination-detection algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Method {
    /// Chunked execution with a two-phase non-blocking started/completed
    /// sum. Supports new work during execution.
    #[default]
    Smart,
    /// Execute everything buffered, then exchange completed counts with
    /// point-to-point messages.
    Harm,
    /// Alternate a global settle phase with an execute-all phase and a
    /// barrier.
    Bs,
}

impl Method {
    /// Lower-case name as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Smart => "smart",
            Self::Harm => "harm",
            Self::Bs => "bs",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smart" => Ok(Self::Smart),
            "harm" => Ok(Self::Harm),
            "bs" => Ok(Self::Bs),
            _ => Err(ConfigError::UnknownMethod {
                value: s.to_string(),
            }),
        }
    }
}

// ── WorkBufferType ─────────────────────────────────────────────────

/// Which buffer discipline backs the local work buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WorkBufferType {
    /// Newest work first.
    Lifo,
    /// Oldest work first.
    #[default]
    Circular,
}

impl fmt::Display for WorkBufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lifo => "lifo",
            Self::Circular => "circular",
        })
    }
}

impl FromStr for WorkBufferType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lifo" => Ok(Self::Lifo),
            "circular" => Ok(Self::Circular),
            _ => Err(ConfigError::UnknownWorkBufferType {
                value: s.to_string(),
            }),
        }
    }
}

// ── StudyConfig ────────────────────────────────────────────────────

/// Complete configuration for a [`ParallelStudy`](crate::ParallelStudy).
#[derive(Clone, Debug)]
pub struct StudyConfig {
    /// Prefix for every diagnostic. Default: `"ParallelStudy"`.
    pub name: String,
    /// Termination-detection algorithm. Default: [`Method::Smart`].
    pub method: Method,
    /// Work buffer discipline. Default: [`WorkBufferType::Circular`].
    pub work_buffer_type: WorkBufferType,
    /// Maximum objects per outgoing batch, per destination. Default: 100.
    pub send_buffer_size: usize,
    /// Floor for adaptive batch shrinking. `None` means
    /// `send_buffer_size`. Default: `None`.
    pub min_buffer_size: Option<usize>,
    /// Work items executed per SMART iteration. Default: 100.
    pub chunk_size: usize,
    /// Idle iterations between send-buffer flushes. Default: 10.
    pub clicks_per_communication: u32,
    /// Idle iterations between termination checks (SMART). Default: 10.
    pub clicks_per_root_communication: u32,
    /// Receive calls per network probe. Default: 1.
    pub clicks_per_receive: u32,
    /// Batch size growth factor after a threshold-triggered send. Default: 2.0.
    pub buffer_growth_multiplier: f64,
    /// Batch size shrink factor after a forced flush. Default: 0.5.
    pub buffer_shrink_multiplier: f64,
    /// Whether executing work may add new work. SMART only. Default: true.
    pub allow_new_work_during_execution: bool,
    /// Worker threads that execute each chunk. Default: 1.
    pub threads: usize,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            name: "ParallelStudy".to_string(),
            method: Method::Smart,
            work_buffer_type: WorkBufferType::Circular,
            send_buffer_size: 100,
            min_buffer_size: None,
            chunk_size: 100,
            clicks_per_communication: 10,
            clicks_per_root_communication: 10,
            clicks_per_receive: 1,
            buffer_growth_multiplier: 2.0,
            buffer_shrink_multiplier: 0.5,
            allow_new_work_during_execution: true,
            threads: 1,
        }
    }
}

impl StudyConfig {
    /// The effective adaptive floor: `min_buffer_size` or, if unset,
    /// `send_buffer_size`.
    pub fn effective_min_buffer_size(&self) -> usize {
        self.min_buffer_size.unwrap_or(self.send_buffer_size)
    }

    /// Check every option against its documented range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("send_buffer_size", self.send_buffer_size),
            ("chunk_size", self.chunk_size),
            (
                "clicks_per_root_communication",
                self.clicks_per_root_communication as usize,
            ),
            ("clicks_per_receive", self.clicks_per_receive as usize),
            ("threads", self.threads),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { option: name });
            }
        }
        if let Some(min) = self.min_buffer_size {
            if min == 0 || min > self.send_buffer_size {
                return Err(ConfigError::MinBufferSize {
                    min,
                    max: self.send_buffer_size,
                });
            }
        }
        let growth = self.buffer_growth_multiplier;
        if !growth.is_finite() || growth < 1.0 {
            return Err(ConfigError::GrowthMultiplier { value: growth });
        }
        let shrink = self.buffer_shrink_multiplier;
        if !(shrink > 0.0 && shrink <= 1.0) {
            return Err(ConfigError::ShrinkMultiplier { value: shrink });
        }
        if self.allow_new_work_during_execution && self.method != Method::Smart {
            return Err(ConfigError::NewWorkRequiresSmart {
                method: self.method,
            });
        }
        Ok(())
    }
}
