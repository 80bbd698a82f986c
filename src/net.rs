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

//! Communication substrate boundary
//!
//! This layer consumes, but does not implement, a generic communication
//! substrate. The [`Communicator`] trait captures the primitives the
//! grouping code needs: fixed-width all-reduce, split-by-(color, key),
//! barrier, and the bootstrap partition-id query.

pub mod comm_operations;
pub mod communicator;
pub mod local;

#[cfg(feature = "mpi")]
pub mod mpi;

pub use comm_operations::ReduceOp;
pub use communicator::Communicator;

/// Communication backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommType {
    Local,
    #[cfg(feature = "mpi")]
    Mpi,
}
