// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error handling for weft operations

use std::fmt;

/// Stable error codes for the failure classes of this layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Ok = 0,
    Invalid = 1,
    TopologyLoad = 2,
    TopologyInconsistent = 3,
    NoMatchingObject = 4,
    Communication = 5,
    NotImplemented = 6,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Ok => write!(f, "OK"),
            Code::Invalid => write!(f, "Invalid"),
            Code::TopologyLoad => write!(f, "Topology load error"),
            Code::TopologyInconsistent => write!(f, "Topology inconsistent"),
            Code::NoMatchingObject => write!(f, "No matching object"),
            Code::Communication => write!(f, "Communication error"),
            Code::NotImplemented => write!(f, "Not implemented"),
        }
    }
}

/// Main error type for weft operations
///
/// Load and classification failures are degraded states for the caller
/// (the fabric is treated as having no exploitable locality), and a
/// `NoMatchingObject` failure degrades a single member to coarse grouping.
/// None of these may be turned into an early return that unbalances a
/// collective call.
#[derive(thiserror::Error, Debug)]
pub enum WeftError {
    #[error("topology load failed: {0}")]
    TopologyLoad(String),

    #[error("inconsistent topology: {0}")]
    TopologyInconsistent(String),

    #[error("no matching hierarchy object: {0}")]
    NoMatchingObject(String),

    #[error("invalid operation: {0}")]
    Invalid(String),

    #[error("communication error: {0}")]
    Communication(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl WeftError {
    /// Get the error code
    pub fn code(&self) -> Code {
        match self {
            WeftError::TopologyLoad(_) => Code::TopologyLoad,
            WeftError::TopologyInconsistent(_) => Code::TopologyInconsistent,
            WeftError::NoMatchingObject(_) => Code::NoMatchingObject,
            WeftError::Invalid(_) => Code::Invalid,
            WeftError::Communication(_) => Code::Communication,
            WeftError::NotImplemented(_) => Code::NotImplemented,
        }
    }
}

/// Type alias for Results using WeftError
pub type WeftResult<T> = Result<T, WeftError>;
