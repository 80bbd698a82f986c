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

//! MPI communicator backend (rsmpi 0.8)
//!
//! The coarse node identifier is derived once at startup by all-gathering
//! processor names over the world communicator: a rank's node id is the
//! lowest world rank reporting the same processor name.

use std::sync::Arc;

use mpi::collective::SystemOperation;
use mpi::environment::Universe;
use mpi::topology::{Color, SimpleCommunicator};
use mpi::traits::*;

use crate::error::{WeftError, WeftResult};

use super::{CommType, Communicator, ReduceOp};

const PROCESSOR_NAME_BYTES: usize = 64;

/// Communicator backed by an MPI library
pub struct MpiCommunicator {
    comm: SimpleCommunicator,
    node_id: i32,
    // keeps MPI_Finalize (universe drop) after the communicator handles
    _universe: Arc<Universe>,
}

// The concurrency model of this layer is one active caller per process;
// MPI handles are never used from two threads at once.
unsafe impl Send for MpiCommunicator {}
unsafe impl Sync for MpiCommunicator {}

/// Convert a ReduceOp to the MPI operation
fn get_mpi_op(reduce_op: ReduceOp) -> SystemOperation {
    match reduce_op {
        ReduceOp::Sum => SystemOperation::sum(),
        ReduceOp::Min => SystemOperation::min(),
        ReduceOp::Max => SystemOperation::max(),
        ReduceOp::Prod => SystemOperation::product(),
        ReduceOp::Land => SystemOperation::logical_and(),
        ReduceOp::Lor => SystemOperation::logical_or(),
        ReduceOp::Band => SystemOperation::bitwise_and(),
        ReduceOp::Bor => SystemOperation::bitwise_or(),
    }
}

fn derive_node_id(comm: &SimpleCommunicator) -> WeftResult<i32> {
    let name = mpi::environment::processor_name()
        .map_err(|e| WeftError::Communication(format!("processor name query failed: {:?}", e)))?;
    let mut local = [0u8; PROCESSOR_NAME_BYTES];
    let bytes = name.as_bytes();
    let n = bytes.len().min(PROCESSOR_NAME_BYTES);
    local[..n].copy_from_slice(&bytes[..n]);

    let size = comm.size() as usize;
    let mut all = vec![0u8; PROCESSOR_NAME_BYTES * size];
    comm.all_gather_into(&local[..], &mut all[..]);

    let me = comm.rank() as usize;
    let mine = &all[me * PROCESSOR_NAME_BYTES..(me + 1) * PROCESSOR_NAME_BYTES];
    let id = all
        .chunks(PROCESSOR_NAME_BYTES)
        .position(|c| c == mine)
        .unwrap_or(me);
    Ok(id as i32)
}

impl MpiCommunicator {
    /// Initialize MPI and wrap the world communicator
    pub fn make() -> WeftResult<Arc<dyn Communicator>> {
        let universe = mpi::initialize()
            .ok_or_else(|| WeftError::Communication("MPI is already initialized".to_string()))?;
        let universe = Arc::new(universe);
        let world = universe.world();
        let node_id = derive_node_id(&world)?;
        Ok(Arc::new(MpiCommunicator {
            comm: world,
            node_id,
            _universe: universe,
        }))
    }
}

impl Communicator for MpiCommunicator {
    fn get_rank(&self) -> i32 {
        self.comm.rank()
    }

    fn get_world_size(&self) -> i32 {
        self.comm.size()
    }

    fn get_comm_type(&self) -> CommType {
        CommType::Mpi
    }

    fn get_node_id(&self) -> i32 {
        self.node_id
    }

    fn barrier(&self) -> WeftResult<()> {
        self.comm.barrier();
        Ok(())
    }

    fn allreduce_u32(&self, send: &[u32], recv: &mut [u32], op: ReduceOp) -> WeftResult<()> {
        if send.len() != recv.len() {
            return Err(WeftError::Invalid(
                "allreduce send/recv length mismatch".to_string(),
            ));
        }
        self.comm.all_reduce_into(send, recv, get_mpi_op(op));
        Ok(())
    }

    fn allreduce_bytes(&self, send: &[u8], recv: &mut [u8], op: ReduceOp) -> WeftResult<()> {
        if send.len() != recv.len() {
            return Err(WeftError::Invalid(
                "allreduce send/recv length mismatch".to_string(),
            ));
        }
        if !matches!(op, ReduceOp::Band | ReduceOp::Bor) {
            return Err(WeftError::NotImplemented(format!(
                "{:?} is not supported for byte buffers",
                op
            )));
        }
        self.comm.all_reduce_into(send, recv, get_mpi_op(op));
        Ok(())
    }

    fn allreduce_i32(&self, value: i32, op: ReduceOp) -> WeftResult<i32> {
        let send = [value];
        let mut recv = [0i32];
        self.comm.all_reduce_into(&send[..], &mut recv[..], get_mpi_op(op));
        Ok(recv[0])
    }

    fn split(&self, color: Option<i32>, key: i32) -> WeftResult<Option<Arc<dyn Communicator>>> {
        let mpi_color = match color {
            Some(c) if c >= 0 => Color::with_value(c),
            Some(c) => {
                return Err(WeftError::Invalid(format!(
                    "split color must be non-negative, got {}",
                    c
                )))
            }
            None => Color::undefined(),
        };
        match self.comm.split_by_color_with_key(mpi_color, key) {
            Some(sub) => Ok(Some(Arc::new(MpiCommunicator {
                comm: sub,
                node_id: self.node_id,
                _universe: Arc::clone(&self._universe),
            }))),
            None => Ok(None),
        }
    }
}
