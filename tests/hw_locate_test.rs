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

//! Tests for the local hardware hierarchy and the locator

use weft::error::Code;
use weft::hw::locate::{
    device_color_value, os_device_color, pci_device_color, processor_color,
};
use weft::hw::{CpuSet, HwTopology, ObjectType, OsDevKind};

/// Two packages of 8 hardware threads each; one NUMA node and one L3 per
/// package; a gpu local to package 0, an ib adapter and a PCI device local
/// to package 1.
fn sample_topology() -> HwTopology {
    let mut b = HwTopology::builder(CpuSet::from_range(0..16));
    let pkg0 = b.add(0, ObjectType::Package, CpuSet::from_range(0..8));
    let pkg1 = b.add(0, ObjectType::Package, CpuSet::from_range(8..16));
    let numa0 = b.add(pkg0, ObjectType::NumaNode, CpuSet::from_range(0..8));
    let numa1 = b.add(pkg1, ObjectType::NumaNode, CpuSet::from_range(8..16));
    let l3_0 = b.add(numa0, ObjectType::L3Cache, CpuSet::from_range(0..8));
    let l3_1 = b.add(numa1, ObjectType::L3Cache, CpuSet::from_range(8..16));
    for core in 0..4 {
        b.add(l3_0, ObjectType::Core, CpuSet::from_range(core * 2..core * 2 + 2));
    }
    for core in 4..8 {
        b.add(l3_1, ObjectType::Core, CpuSet::from_range(core * 2..core * 2 + 2));
    }
    b.add_os_device(pkg0, OsDevKind::Coproc, "cuda0", CpuSet::from_range(0..8));
    b.add_os_device(pkg1, OsDevKind::OpenFabrics, "mlx5_0", CpuSet::from_range(8..16));
    b.add_pci_device(pkg1, "0000:81:00.0", CpuSet::from_range(8..16));
    b.build()
}

#[test]
fn test_covering_object_descends_to_most_specific() {
    let hw = sample_topology();

    let core = hw.covering_object(&CpuSet::from_range(0..2)).unwrap();
    assert_eq!(core.object_type, ObjectType::Core);
    assert_eq!(core.logical_index, 0);

    let l3 = hw.covering_object(&CpuSet::from_range(0..8)).unwrap();
    assert_eq!(l3.object_type, ObjectType::L3Cache);

    let machine = hw.covering_object(&CpuSet::from_range(0..16)).unwrap();
    assert_eq!(machine.object_type, ObjectType::Machine);

    assert!(hw.covering_object(&CpuSet::from_range(0..32)).is_none());
    assert!(hw.covering_object(&CpuSet::new()).is_none());
}

#[test]
fn test_object_enumeration() {
    let hw = sample_topology();
    assert_eq!(hw.objects_by_type(ObjectType::NumaNode).len(), 2);
    assert_eq!(hw.objects_by_type(ObjectType::Core).len(), 8);
    assert_eq!(hw.objects_by_type(ObjectType::OsDevice).len(), 2);
    assert_eq!(hw.os_devices(OsDevKind::Coproc).len(), 1);
    // logical indices are assigned per type, in insertion order
    let cores = hw.objects_by_type(ObjectType::Core);
    assert_eq!(cores[5].logical_index, 5);
    assert_eq!(hw.object(cores[5].id).logical_index, 5);
}

#[test]
fn test_processor_color_by_ancestor() {
    let hw = sample_topology();
    let bindset = CpuSet::from_range(8..10);

    assert_eq!(processor_color(&hw, &bindset, ObjectType::NumaNode).unwrap(), 1);
    assert_eq!(processor_color(&hw, &bindset, ObjectType::Package).unwrap(), 1);
    assert_eq!(processor_color(&hw, &bindset, ObjectType::L3Cache).unwrap(), 1);
    // the covering object itself can be the target
    assert_eq!(processor_color(&hw, &bindset, ObjectType::Core).unwrap(), 4);
}

#[test]
fn test_processor_color_no_matching_ancestor() {
    let hw = sample_topology();
    let err = processor_color(&hw, &CpuSet::from_range(0..2), ObjectType::L4Cache).unwrap_err();
    assert_eq!(err.code(), Code::NoMatchingObject);
}

#[test]
fn test_device_scan_selects_covered_device() {
    let hw = sample_topology();

    // package-wide binding on package 0 covers the gpu locality set
    let color = os_device_color(&hw, &CpuSet::from_range(0..8), OsDevKind::Coproc, None).unwrap();
    assert_eq!(color, device_color_value(OsDevKind::Coproc, 0));

    // distinct sub-kinds at the same logical index must not alias
    assert_ne!(
        device_color_value(OsDevKind::Coproc, 0),
        device_color_value(OsDevKind::OpenFabrics, 0)
    );
}

#[test]
fn test_device_scan_misses_remote_device() {
    let hw = sample_topology();
    // bound to package 1: the only gpu hangs off package 0
    let err =
        os_device_color(&hw, &CpuSet::from_range(8..16), OsDevKind::Coproc, None).unwrap_err();
    assert_eq!(err.code(), Code::NoMatchingObject);
}

#[test]
fn test_os_device_by_name_and_index() {
    let hw = sample_topology();
    let bindset = CpuSet::from_range(8..16);

    // ib adapter resolved by name; colored by its non-I/O ancestor
    let color =
        os_device_color(&hw, &bindset, OsDevKind::OpenFabrics, Some("mlx5_0")).unwrap();
    assert_eq!(color, 1);

    // accelerators may be addressed by logical index
    let by_index =
        os_device_color(&hw, &CpuSet::from_range(0..8), OsDevKind::Coproc, Some("0")).unwrap();
    assert_eq!(by_index, 0);

    let err = os_device_color(&hw, &bindset, OsDevKind::OpenFabrics, Some("mlx5_9")).unwrap_err();
    assert_eq!(err.code(), Code::NoMatchingObject);
}

#[test]
fn test_named_device_outside_binding_subtree() {
    let hw = sample_topology();
    // process bound to package 0, adapter local to package 1
    let err = os_device_color(
        &hw,
        &CpuSet::from_range(0..8),
        OsDevKind::OpenFabrics,
        Some("mlx5_0"),
    )
    .unwrap_err();
    assert_eq!(err.code(), Code::NoMatchingObject);
}

#[test]
fn test_pci_device_color() {
    let hw = sample_topology();

    let color = pci_device_color(&hw, &CpuSet::from_range(8..16), "0000:81:00.0").unwrap();
    assert_eq!(color, 1);

    let err = pci_device_color(&hw, &CpuSet::from_range(8..16), "0000:00:00.0").unwrap_err();
    assert_eq!(err.code(), Code::NoMatchingObject);
}

#[test]
fn test_object_type_names() {
    assert_eq!("numa".parse::<ObjectType>(), Ok(ObjectType::NumaNode));
    assert_eq!("socket".parse::<ObjectType>(), Ok(ObjectType::Package));
    assert_eq!("package".parse::<ObjectType>(), Ok(ObjectType::Package));
    assert_eq!("pu".parse::<ObjectType>(), Ok(ObjectType::HwThread));
    assert_eq!("l3cache".parse::<ObjectType>(), Ok(ObjectType::L3Cache));
    assert_eq!("l2icache".parse::<ObjectType>(), Ok(ObjectType::L2ICache));
    assert!("tile".parse::<ObjectType>().is_err());
}

#[test]
fn test_cpuset_cover_semantics() {
    let wide = CpuSet::from_range(0..64);
    let narrow = CpuSet::from_range(60..64);
    assert!(wide.covers(&narrow));
    assert!(!narrow.covers(&wide));
    assert!(wide.covers(&wide));

    let mut merged = CpuSet::single(2);
    merged.union_with(&CpuSet::single(130));
    assert!(merged.contains(2));
    assert!(merged.contains(130));
    assert!(!merged.contains(64));
}
