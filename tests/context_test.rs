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

//! Integration tests for WeftContext

use std::sync::Arc;

use weft::error::{WeftError, WeftResult};
use weft::fabric::{FabricSource, FabricTopology, NetworkType, NodeKind};
use weft::hw::{CpuSet, HwTopology, OsDevKind};
use weft::net::local::LocalComm;
use weft::net::CommType;
use weft::WeftContext;

#[test]
fn test_local_context_defaults() {
    let ctx = WeftContext::init();

    assert!(!ctx.is_distributed());
    assert_eq!(ctx.get_rank(), 0);
    assert_eq!(ctx.get_world_size(), 1);
    assert_eq!(ctx.get_comm_type(), CommType::Local);
    assert!(ctx.get_network().is_none());
    assert!(ctx.barrier().is_ok());

    println!("✓ local WeftContext initialized successfully");
}

#[test]
fn test_context_config() {
    let ctx = WeftContext::init();

    ctx.add_config("fabric_service", "netman.example:8080");
    assert_eq!(
        ctx.get_config("fabric_service", "none"),
        "netman.example:8080"
    );
    assert_eq!(ctx.get_config("missing_key", "default"), "default");
}

#[test]
fn test_distributed_context() {
    let ctx = WeftContext::init_distributed(Arc::new(LocalComm::solo(7)));

    assert!(ctx.is_distributed());
    assert_eq!(ctx.get_rank(), 0);
    assert_eq!(ctx.get_world_size(), 1);
    assert!(ctx.barrier().is_ok());
    assert_eq!(ctx.get_communicator().unwrap().get_node_id(), 7);
}

struct StaticFabric;

impl FabricSource for StaticFabric {
    fn nodes(&self) -> WeftResult<Vec<(NodeKind, String)>> {
        Ok(vec![
            (NodeKind::Host, "mlx5_0".to_string()),
            (NodeKind::Host, "mlx5_1".to_string()),
            (NodeKind::Switch, "sw0".to_string()),
        ])
    }

    fn links(&self) -> WeftResult<Vec<(usize, usize)>> {
        Ok(vec![(0, 2), (1, 2)])
    }
}

struct DownService;

impl FabricSource for DownService {
    fn nodes(&self) -> WeftResult<Vec<(NodeKind, String)>> {
        Err(WeftError::TopologyLoad("service down".to_string()))
    }

    fn links(&self) -> WeftResult<Vec<(usize, usize)>> {
        Ok(Vec::new())
    }
}

#[test]
fn test_load_fabric_and_classify() {
    let mut ctx = WeftContext::new();
    ctx.load_fabric(&StaticFabric).unwrap();

    let network = ctx.get_network().unwrap();
    assert_eq!(network.network_type(), NetworkType::FatTree);
    assert_eq!(network.node_level(2), Some(1));
    assert!(ctx.get_fabric().is_some());
}

#[test]
fn test_load_fabric_failure_degrades_to_invalid() {
    let mut ctx = WeftContext::new();
    let err = ctx.load_fabric(&DownService).unwrap_err();

    assert_eq!(err.code(), weft::Code::TopologyLoad);
    // the context stays usable in the documented degraded state
    let network = ctx.get_network().unwrap();
    assert_eq!(network.network_type(), NetworkType::Invalid);
    assert!(ctx.get_fabric().is_none());
}

#[test]
fn test_end_point_resolution() {
    let fabric = FabricTopology::load(&StaticFabric).unwrap();

    // the local view has the adapter matching host 1's physical address
    let mut b = HwTopology::builder(CpuSet::from_range(0..4));
    b.add_os_device(0, OsDevKind::OpenFabrics, "mlx5_1", CpuSet::from_range(0..4));
    let hw = b.build();

    let end_point = fabric.end_point_for(&hw).unwrap();
    assert_eq!(end_point.id, 1);
    assert_eq!(fabric.host_index(end_point.id), Some(1));

    // no fabric adapter at all: no end point
    let bare = HwTopology::builder(CpuSet::from_range(0..4)).build();
    assert!(fabric.end_point_for(&bare).is_none());
}
