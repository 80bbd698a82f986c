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

//! Communicator trait and related types
//!
//! This module defines the base Communicator trait that all communication
//! backends must implement. A communicator is also the handle for a process
//! group: splitting produces new communicators, and an intermediate group is
//! released by dropping its handle.

use std::sync::Arc;

use crate::error::WeftResult;

use super::{CommType, ReduceOp};

/// Communicator trait - the substrate interface consumed by the grouping layer
///
/// All collective methods are blocking and must be called by every rank of
/// the group. A rank that never makes the call is a usage error that hangs
/// the group; it is a documented precondition, not a runtime-checked
/// failure.
pub trait Communicator: Send + Sync {
    fn get_rank(&self) -> i32;
    fn get_world_size(&self) -> i32;
    fn get_comm_type(&self) -> CommType;

    /// Coarse node identifier shared by all ranks co-located on the same
    /// physical host (the bootstrap partition-id query).
    fn get_node_id(&self) -> i32;

    fn barrier(&self) -> WeftResult<()>;

    /// Element-wise all-reduce over `u32` values
    ///
    /// # Arguments
    /// * `send` - Local contribution
    /// * `recv` - Receives the reduced values; must have the same length as
    ///   `send` on every rank
    /// * `op` - Reduction operation
    fn allreduce_u32(&self, send: &[u32], recv: &mut [u32], op: ReduceOp) -> WeftResult<()>;

    /// Byte-wise all-reduce over fixed-size buffers
    ///
    /// Backends are only required to support the bitwise operations for
    /// byte buffers.
    fn allreduce_bytes(&self, send: &[u8], recv: &mut [u8], op: ReduceOp) -> WeftResult<()>;

    /// All-reduce of a single `i32` value
    fn allreduce_i32(&self, value: i32, op: ReduceOp) -> WeftResult<i32>;

    /// Split the group by color, ordering members of each new group by
    /// `(key, rank)`
    ///
    /// Every rank of the group must call this. Ranks passing `None` do not
    /// join any new group and receive `Ok(None)`.
    fn split(&self, color: Option<i32>, key: i32) -> WeftResult<Option<Arc<dyn Communicator>>>;
}
