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

//! Weft context and configuration
//!
//! The context carries the communicator and the two read-only topology
//! snapshots through every component, instead of ambient process-wide
//! state, so tests can substitute synthetic topologies. It is constructed
//! once at startup and lives for the process lifetime; the snapshots are
//! immutable after attachment and need no locking for concurrent reads.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::warn;

use crate::error::WeftResult;
use crate::fabric::{parse_topology, FabricSource, FabricTopology, NetworkAttributes};
use crate::hw::{CpuSet, HwTopology};
use crate::net::{CommType, Communicator};

/// The entry point to weft operations
pub struct WeftContext {
    config: RwLock<HashMap<String, String>>,
    communicator: Option<Arc<dyn Communicator>>,
    fabric: Option<Arc<FabricTopology>>,
    network: Option<Arc<NetworkAttributes>>,
    hw: Option<Arc<HwTopology>>,
    bindset: Option<CpuSet>,
}

impl WeftContext {
    pub fn new() -> WeftContext {
        WeftContext {
            config: RwLock::new(HashMap::new()),
            communicator: None,
            fabric: None,
            network: None,
            hw: None,
            bindset: None,
        }
    }

    /// Initializes a non-distributed context
    pub fn init() -> Arc<WeftContext> {
        Arc::new(WeftContext::new())
    }

    /// Initializes a distributed context with a communicator
    pub fn init_distributed(communicator: Arc<dyn Communicator>) -> Arc<WeftContext> {
        let mut ctx = WeftContext::new();
        ctx.set_communicator(communicator);
        Arc::new(ctx)
    }

    pub fn set_communicator(&mut self, communicator: Arc<dyn Communicator>) {
        self.communicator = Some(communicator);
    }

    /// Attach a pre-built fabric snapshot and classify it
    pub fn set_fabric(&mut self, fabric: Arc<FabricTopology>) {
        self.network = Some(Arc::new(parse_topology(&fabric)));
        self.fabric = Some(fabric);
    }

    /// Load the fabric topology from an external service and classify it.
    ///
    /// On load failure the context is left in the documented degraded
    /// state (classification INVALID, no exploitable fabric locality) and
    /// the error is returned for reporting.
    pub fn load_fabric(&mut self, source: &dyn FabricSource) -> WeftResult<()> {
        match FabricTopology::load(source) {
            Ok(fabric) => {
                self.set_fabric(Arc::new(fabric));
                Ok(())
            }
            Err(err) => {
                warn!("fabric topology unavailable: {}", err);
                self.fabric = None;
                self.network = Some(Arc::new(NetworkAttributes::Invalid));
                Err(err)
            }
        }
    }

    /// Attach the local hardware snapshot and this process's binding set
    pub fn set_hw_topology(&mut self, hw: Arc<HwTopology>, bindset: CpuSet) {
        self.hw = Some(hw);
        self.bindset = Some(bindset);
    }

    pub fn get_communicator(&self) -> Option<Arc<dyn Communicator>> {
        self.communicator.clone()
    }

    pub fn get_fabric(&self) -> Option<Arc<FabricTopology>> {
        self.fabric.clone()
    }

    pub fn get_network(&self) -> Option<Arc<NetworkAttributes>> {
        self.network.clone()
    }

    pub fn get_hw_topology(&self) -> Option<Arc<HwTopology>> {
        self.hw.clone()
    }

    pub fn get_bindset(&self) -> Option<&CpuSet> {
        self.bindset.as_ref()
    }

    pub fn is_distributed(&self) -> bool {
        self.communicator.is_some()
    }

    /// Adds a configuration entry
    pub fn add_config(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut config = self.config.write().unwrap();
        config.insert(key.into(), value.into());
    }

    /// Returns a configuration entry, or `default` when absent
    pub fn get_config(&self, key: &str, default: &str) -> String {
        let config = self.config.read().unwrap();
        config
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Returns the local rank
    pub fn get_rank(&self) -> i32 {
        self.communicator.as_ref().map_or(0, |c| c.get_rank())
    }

    /// Returns the world size
    pub fn get_world_size(&self) -> i32 {
        self.communicator.as_ref().map_or(1, |c| c.get_world_size())
    }

    /// Get communication type
    pub fn get_comm_type(&self) -> CommType {
        self.communicator
            .as_ref()
            .map_or(CommType::Local, |c| c.get_comm_type())
    }

    /// Performs a barrier operation over the context's group
    pub fn barrier(&self) -> WeftResult<()> {
        if let Some(ref comm) = self.communicator {
            comm.barrier()?;
        }
        Ok(())
    }
}

impl Default for WeftContext {
    fn default() -> Self {
        Self::new()
    }
}
