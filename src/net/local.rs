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

//! In-process communicator backend
//!
//! Ranks are OS threads sharing one rendezvous structure. Every collective
//! is built on a single exchange primitive: each rank deposits its
//! contribution for the current round, the last arrival publishes the full
//! set, and every rank folds the published contributions locally. Because
//! all reductions used by this crate are commutative and associative, the
//! fold result is identical on every rank regardless of arrival order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{WeftError, WeftResult};

use super::{CommType, Communicator, ReduceOp};

struct Slot {
    payloads: Vec<Vec<u8>>,
    arrived: usize,
    read: usize,
    done: Option<Arc<RoundData>>,
}

impl Slot {
    fn new(size: usize) -> Self {
        Slot {
            payloads: vec![Vec::new(); size],
            arrived: 0,
            read: 0,
            done: None,
        }
    }
}

struct RoundData {
    payloads: Vec<Vec<u8>>,
    // lazily built per-color rendezvous state for split rounds; the first
    // member of a color creates it, the rest attach to the same instance
    subgroups: Mutex<HashMap<i32, Arc<Shared>>>,
}

struct Shared {
    size: usize,
    rounds: Mutex<HashMap<u64, Slot>>,
    cv: Condvar,
}

impl Shared {
    fn new(size: usize) -> Self {
        Shared {
            size,
            rounds: Mutex::new(HashMap::new()),
            cv: Condvar::new(),
        }
    }
}

/// Communicator over threads of a single process
///
/// Construct one handle per rank with [`LocalComm::group`] and hand each
/// handle to its own thread. Collective calls block until every rank of the
/// group has made the matching call.
pub struct LocalComm {
    rank: i32,
    node_id: i32,
    generation: AtomicU64,
    shared: Arc<Shared>,
}

impl LocalComm {
    /// Create a group of `node_ids.len()` ranks; rank `i` reports
    /// `node_ids[i]` as its coarse node identifier.
    pub fn group(node_ids: &[i32]) -> Vec<LocalComm> {
        let shared = Arc::new(Shared::new(node_ids.len()));
        node_ids
            .iter()
            .enumerate()
            .map(|(rank, &node_id)| LocalComm {
                rank: rank as i32,
                node_id,
                generation: AtomicU64::new(0),
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Single-rank communicator, for non-distributed use
    pub fn solo(node_id: i32) -> LocalComm {
        Self::group(&[node_id]).pop().unwrap()
    }

    /// One collective round: deposit `payload`, wait for all ranks, return
    /// every rank's contribution.
    fn exchange(&self, payload: Vec<u8>) -> Arc<RoundData> {
        let gen = self.generation.fetch_add(1, Ordering::Relaxed);
        let mut rounds = self.shared.rounds.lock().unwrap();
        let slot = rounds
            .entry(gen)
            .or_insert_with(|| Slot::new(self.shared.size));
        slot.payloads[self.rank as usize] = payload;
        slot.arrived += 1;
        if slot.arrived == self.shared.size {
            let payloads = std::mem::take(&mut slot.payloads);
            slot.done = Some(Arc::new(RoundData {
                payloads,
                subgroups: Mutex::new(HashMap::new()),
            }));
            self.shared.cv.notify_all();
        }
        loop {
            if let Some(slot) = rounds.get_mut(&gen) {
                if let Some(done) = slot.done.clone() {
                    slot.read += 1;
                    if slot.read == self.shared.size {
                        rounds.remove(&gen);
                    }
                    return done;
                }
            }
            rounds = self.shared.cv.wait(rounds).unwrap();
        }
    }

    fn check_uniform_len(&self, round: &RoundData, expected: usize) -> WeftResult<()> {
        if round.payloads.iter().any(|p| p.len() != expected) {
            return Err(WeftError::Communication(
                "mismatched contribution sizes in collective call".to_string(),
            ));
        }
        Ok(())
    }
}

fn reduce_u32(op: ReduceOp, acc: u32, x: u32) -> u32 {
    match op {
        ReduceOp::Sum => acc.wrapping_add(x),
        ReduceOp::Min => acc.min(x),
        ReduceOp::Max => acc.max(x),
        ReduceOp::Prod => acc.wrapping_mul(x),
        ReduceOp::Land => (acc != 0 && x != 0) as u32,
        ReduceOp::Lor => (acc != 0 || x != 0) as u32,
        ReduceOp::Band => acc & x,
        ReduceOp::Bor => acc | x,
    }
}

fn reduce_i32(op: ReduceOp, acc: i32, x: i32) -> i32 {
    match op {
        ReduceOp::Sum => acc.wrapping_add(x),
        ReduceOp::Min => acc.min(x),
        ReduceOp::Max => acc.max(x),
        ReduceOp::Prod => acc.wrapping_mul(x),
        ReduceOp::Land => (acc != 0 && x != 0) as i32,
        ReduceOp::Lor => (acc != 0 || x != 0) as i32,
        ReduceOp::Band => acc & x,
        ReduceOp::Bor => acc | x,
    }
}

fn u32_at(payload: &[u8], index: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&payload[index * 4..index * 4 + 4]);
    u32::from_le_bytes(bytes)
}

impl Communicator for LocalComm {
    fn get_rank(&self) -> i32 {
        self.rank
    }

    fn get_world_size(&self) -> i32 {
        self.shared.size as i32
    }

    fn get_comm_type(&self) -> CommType {
        CommType::Local
    }

    fn get_node_id(&self) -> i32 {
        self.node_id
    }

    fn barrier(&self) -> WeftResult<()> {
        self.exchange(Vec::new());
        Ok(())
    }

    fn allreduce_u32(&self, send: &[u32], recv: &mut [u32], op: ReduceOp) -> WeftResult<()> {
        if send.len() != recv.len() {
            return Err(WeftError::Invalid(
                "allreduce send/recv length mismatch".to_string(),
            ));
        }
        let mut payload = Vec::with_capacity(send.len() * 4);
        for v in send {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let round = self.exchange(payload);
        self.check_uniform_len(&round, send.len() * 4)?;
        for (i, out) in recv.iter_mut().enumerate() {
            let mut acc = u32_at(&round.payloads[0], i);
            for p in &round.payloads[1..] {
                acc = reduce_u32(op, acc, u32_at(p, i));
            }
            *out = acc;
        }
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
        let round = self.exchange(send.to_vec());
        self.check_uniform_len(&round, send.len())?;
        for (i, out) in recv.iter_mut().enumerate() {
            let mut acc = round.payloads[0][i];
            for p in &round.payloads[1..] {
                acc = match op {
                    ReduceOp::Band => acc & p[i],
                    _ => acc | p[i],
                };
            }
            *out = acc;
        }
        Ok(())
    }

    fn allreduce_i32(&self, value: i32, op: ReduceOp) -> WeftResult<i32> {
        let round = self.exchange(value.to_le_bytes().to_vec());
        self.check_uniform_len(&round, 4)?;
        let mut acc = u32_at(&round.payloads[0], 0) as i32;
        for p in &round.payloads[1..] {
            acc = reduce_i32(op, acc, u32_at(p, 0) as i32);
        }
        Ok(acc)
    }

    fn split(&self, color: Option<i32>, key: i32) -> WeftResult<Option<Arc<dyn Communicator>>> {
        // encode [has_color, color, key, node_id]; every rank exchanges,
        // including ranks that do not join any new group
        let mut payload = Vec::with_capacity(13);
        payload.push(color.is_some() as u8);
        payload.extend_from_slice(&color.unwrap_or(0).to_le_bytes());
        payload.extend_from_slice(&key.to_le_bytes());
        payload.extend_from_slice(&self.node_id.to_le_bytes());
        let round = self.exchange(payload);
        self.check_uniform_len(&round, 13)?;

        let my_color = match color {
            Some(c) => c,
            None => return Ok(None),
        };

        struct Member {
            rank: i32,
            key: i32,
            node_id: i32,
        }
        let mut members = Vec::new();
        for (rank, p) in round.payloads.iter().enumerate() {
            if p[0] == 0 {
                continue;
            }
            let c = i32::from_le_bytes(p[1..5].try_into().unwrap());
            if c != my_color {
                continue;
            }
            members.push(Member {
                rank: rank as i32,
                key: i32::from_le_bytes(p[5..9].try_into().unwrap()),
                node_id: i32::from_le_bytes(p[9..13].try_into().unwrap()),
            });
        }
        members.sort_by_key(|m| (m.key, m.rank));
        let new_rank = members
            .iter()
            .position(|m| m.rank == self.rank)
            .ok_or_else(|| WeftError::Communication("split member list is inconsistent".into()))?;
        debug_assert_eq!(members[new_rank].node_id, self.node_id);

        let shared = {
            let mut subgroups = round.subgroups.lock().unwrap();
            Arc::clone(
                subgroups
                    .entry(my_color)
                    .or_insert_with(|| Arc::new(Shared::new(members.len()))),
            )
        };
        Ok(Some(Arc::new(LocalComm {
            rank: new_rank as i32,
            node_id: self.node_id,
            generation: AtomicU64::new(0),
            shared,
        })))
    }
}
