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

//! Local hardware hierarchy
//!
//! A read-only snapshot of the per-process hardware tree: machine, packages,
//! NUMA nodes, cache levels, cores, hardware threads, and attached PCI/OS
//! devices. The snapshot is obtained from the hardware-topology service at
//! process start and never mutated; failure to obtain one degrades the
//! locator to "no match", it never aborts the caller.

pub mod locate;

use std::str::FromStr;

/// Hierarchy object types, outermost first.
///
/// The discriminants are the stable wire codes used by the agreement
/// protocol; `u32::MAX` ([`OBJECT_TYPE_UNSET`]) is the "unset" sentinel
/// chosen so a bitwise-AND reduction over it is neutral.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Machine = 0,
    Package = 1,
    NumaNode = 2,
    L5Cache = 3,
    L4Cache = 4,
    L3Cache = 5,
    L3ICache = 6,
    L2Cache = 7,
    L2ICache = 8,
    L1Cache = 9,
    L1ICache = 10,
    Core = 11,
    HwThread = 12,
    PciDevice = 13,
    OsDevice = 14,
}

/// All-bits-set sentinel for "no object type requested"
pub const OBJECT_TYPE_UNSET: u32 = u32::MAX;

impl ObjectType {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<ObjectType> {
        match code {
            0 => Some(ObjectType::Machine),
            1 => Some(ObjectType::Package),
            2 => Some(ObjectType::NumaNode),
            3 => Some(ObjectType::L5Cache),
            4 => Some(ObjectType::L4Cache),
            5 => Some(ObjectType::L3Cache),
            6 => Some(ObjectType::L3ICache),
            7 => Some(ObjectType::L2Cache),
            8 => Some(ObjectType::L2ICache),
            9 => Some(ObjectType::L1Cache),
            10 => Some(ObjectType::L1ICache),
            11 => Some(ObjectType::Core),
            12 => Some(ObjectType::HwThread),
            13 => Some(ObjectType::PciDevice),
            14 => Some(ObjectType::OsDevice),
            _ => None,
        }
    }

    /// I/O objects carry no processor coverage of their own
    pub fn is_io(self) -> bool {
        matches!(self, ObjectType::PciDevice | ObjectType::OsDevice)
    }
}

impl FromStr for ObjectType {
    type Err = ();

    /// Processor object names accepted in attribute requests
    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "machine" => Ok(ObjectType::Machine),
            "socket" | "package" => Ok(ObjectType::Package),
            "numa" => Ok(ObjectType::NumaNode),
            "core" => Ok(ObjectType::Core),
            "hwthread" | "pu" => Ok(ObjectType::HwThread),
            "l1dcache" | "l1ucache" | "l1cache" => Ok(ObjectType::L1Cache),
            "l1icache" => Ok(ObjectType::L1ICache),
            "l2dcache" | "l2ucache" | "l2cache" => Ok(ObjectType::L2Cache),
            "l2icache" => Ok(ObjectType::L2ICache),
            "l3dcache" | "l3ucache" | "l3cache" => Ok(ObjectType::L3Cache),
            "l3icache" => Ok(ObjectType::L3ICache),
            "l4dcache" | "l4ucache" | "l4cache" => Ok(ObjectType::L4Cache),
            "l5dcache" | "l5ucache" | "l5cache" => Ok(ObjectType::L5Cache),
            _ => Err(()),
        }
    }
}

/// OS device sub-kinds understood by the device search
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsDevKind {
    /// Accelerator co-processor (gpu)
    Coproc = 1,
    /// Network fabric adapter (ib)
    OpenFabrics = 2,
}

/// All-bits-set sentinel for "no device sub-kind requested"
pub const OSDEV_KIND_UNSET: u32 = u32::MAX;

impl OsDevKind {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<OsDevKind> {
        match code {
            1 => Some(OsDevKind::Coproc),
            2 => Some(OsDevKind::OpenFabrics),
            _ => None,
        }
    }
}

/// Processor binding set, one bit per hardware thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuSet {
    words: Vec<u64>,
}

impl CpuSet {
    pub fn new() -> CpuSet {
        CpuSet::default()
    }

    pub fn single(pu: u32) -> CpuSet {
        let mut set = CpuSet::new();
        set.set(pu);
        set
    }

    pub fn from_range(range: std::ops::Range<u32>) -> CpuSet {
        let mut set = CpuSet::new();
        for pu in range {
            set.set(pu);
        }
        set
    }

    pub fn set(&mut self, pu: u32) {
        let word = (pu / 64) as usize;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (pu % 64);
    }

    pub fn contains(&self, pu: u32) -> bool {
        let word = (pu / 64) as usize;
        self.words.get(word).map_or(false, |w| w & (1 << (pu % 64)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// True when `self` is a superset of `other`
    pub fn covers(&self, other: &CpuSet) -> bool {
        other.words.iter().enumerate().all(|(i, &w)| {
            let own = self.words.get(i).copied().unwrap_or(0);
            own & w == w
        })
    }

    pub fn union_with(&mut self, other: &CpuSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (i, &w) in other.words.iter().enumerate() {
            self.words[i] |= w;
        }
    }
}

pub type ObjId = usize;

/// One node of the hardware hierarchy tree
#[derive(Debug, Clone)]
pub struct HwObject {
    pub id: ObjId,
    pub parent: Option<ObjId>,
    pub children: Vec<ObjId>,
    pub object_type: ObjectType,
    /// Unique among objects of the same type, in insertion order
    pub logical_index: u32,
    /// Coverage for processor objects; locality set for device objects
    pub cpuset: CpuSet,
    pub os_dev_kind: Option<OsDevKind>,
    /// Externally supplied identifier: PCI bus id or OS device name
    pub device_id: Option<String>,
}

/// Immutable snapshot of the local hardware hierarchy
pub struct HwTopology {
    objects: Vec<HwObject>,
}

impl HwTopology {
    /// Start building a snapshot; the machine object becomes the root with
    /// the given coverage.
    pub fn builder(machine_cpuset: CpuSet) -> HwTopologyBuilder {
        HwTopologyBuilder::new(machine_cpuset)
    }

    pub fn root(&self) -> &HwObject {
        &self.objects[0]
    }

    pub fn object(&self, id: ObjId) -> &HwObject {
        &self.objects[id]
    }

    pub fn objects_by_type(&self, object_type: ObjectType) -> Vec<&HwObject> {
        self.objects
            .iter()
            .filter(|o| o.object_type == object_type)
            .collect()
    }

    /// The most specific processor object whose coverage contains `set`.
    ///
    /// Descends from the root as long as some non-I/O child still covers
    /// the whole set; deterministic because children are scanned in
    /// insertion order.
    pub fn covering_object(&self, set: &CpuSet) -> Option<&HwObject> {
        if set.is_empty() {
            return None;
        }
        let mut current = self.root();
        if !current.cpuset.covers(set) {
            return None;
        }
        loop {
            let next = current
                .children
                .iter()
                .map(|&c| &self.objects[c])
                .find(|c| !c.object_type.is_io() && c.cpuset.covers(set));
            match next {
                Some(child) => current = child,
                None => return Some(current),
            }
        }
    }

    /// Nearest ancestor of `obj` with the given type
    pub fn ancestor_by_type(&self, obj: ObjId, object_type: ObjectType) -> Option<&HwObject> {
        let mut current = self.objects[obj].parent;
        while let Some(id) = current {
            let candidate = &self.objects[id];
            if candidate.object_type == object_type {
                return Some(candidate);
            }
            current = candidate.parent;
        }
        None
    }

    /// Nearest non-I/O ancestor of a device object
    pub fn non_io_ancestor(&self, obj: ObjId) -> Option<&HwObject> {
        let mut current = self.objects[obj].parent;
        while let Some(id) = current {
            let candidate = &self.objects[id];
            if !candidate.object_type.is_io() && !candidate.cpuset.is_empty() {
                return Some(candidate);
            }
            current = candidate.parent;
        }
        None
    }

    /// True when `obj` lies in the subtree rooted at `root`
    pub fn is_in_subtree(&self, root: ObjId, obj: ObjId) -> bool {
        let mut current = Some(obj);
        while let Some(id) = current {
            if id == root {
                return true;
            }
            current = self.objects[id].parent;
        }
        false
    }

    /// All OS device objects of the given sub-kind, with their locality sets
    pub fn os_devices(&self, kind: OsDevKind) -> Vec<&HwObject> {
        self.objects
            .iter()
            .filter(|o| o.object_type == ObjectType::OsDevice && o.os_dev_kind == Some(kind))
            .collect()
    }

    /// Resolve an OS device by name, falling back to its decimal logical
    /// index (accelerators are commonly addressed by index).
    pub fn os_device_by_id(&self, kind: OsDevKind, id: &str) -> Option<&HwObject> {
        let devices = self.os_devices(kind);
        if let Some(dev) = devices
            .iter()
            .find(|d| d.device_id.as_deref() == Some(id))
            .copied()
        {
            return Some(dev);
        }
        let index: u32 = id.parse().ok()?;
        devices.into_iter().find(|d| d.logical_index == index)
    }

    /// Resolve a PCI device by bus id string
    pub fn pci_device_by_id(&self, busid: &str) -> Option<&HwObject> {
        self.objects
            .iter()
            .find(|o| o.object_type == ObjectType::PciDevice && o.device_id.as_deref() == Some(busid))
    }
}

/// Builder for synthetic or service-fed snapshots.
///
/// Parents must be added before their children; passing an unknown parent
/// id is a programming error and panics.
pub struct HwTopologyBuilder {
    objects: Vec<HwObject>,
}

impl HwTopologyBuilder {
    fn new(machine_cpuset: CpuSet) -> HwTopologyBuilder {
        HwTopologyBuilder {
            objects: vec![HwObject {
                id: 0,
                parent: None,
                children: Vec::new(),
                object_type: ObjectType::Machine,
                logical_index: 0,
                cpuset: machine_cpuset,
                os_dev_kind: None,
                device_id: None,
            }],
        }
    }

    fn next_logical_index(&self, object_type: ObjectType) -> u32 {
        self.objects
            .iter()
            .filter(|o| o.object_type == object_type)
            .count() as u32
    }

    fn push(
        &mut self,
        parent: ObjId,
        object_type: ObjectType,
        cpuset: CpuSet,
        os_dev_kind: Option<OsDevKind>,
        device_id: Option<String>,
    ) -> ObjId {
        assert!(parent < self.objects.len(), "unknown parent object {}", parent);
        let id = self.objects.len();
        let logical_index = self.next_logical_index(object_type);
        self.objects.push(HwObject {
            id,
            parent: Some(parent),
            children: Vec::new(),
            object_type,
            logical_index,
            cpuset,
            os_dev_kind,
            device_id,
        });
        self.objects[parent].children.push(id);
        id
    }

    /// Add a processor object under `parent`
    pub fn add(&mut self, parent: ObjId, object_type: ObjectType, cpuset: CpuSet) -> ObjId {
        assert!(
            !object_type.is_io(),
            "use add_os_device/add_pci_device for I/O objects"
        );
        self.push(parent, object_type, cpuset, None, None)
    }

    /// Add an OS device with its name and locality set
    pub fn add_os_device(
        &mut self,
        parent: ObjId,
        kind: OsDevKind,
        name: &str,
        cpuset: CpuSet,
    ) -> ObjId {
        self.push(
            parent,
            ObjectType::OsDevice,
            cpuset,
            Some(kind),
            Some(name.to_string()),
        )
    }

    /// Add a PCI device with its bus id and locality set
    pub fn add_pci_device(&mut self, parent: ObjId, busid: &str, cpuset: CpuSet) -> ObjId {
        self.push(
            parent,
            ObjectType::PciDevice,
            cpuset,
            None,
            Some(busid.to_string()),
        )
    }

    pub fn build(self) -> HwTopology {
        HwTopology {
            objects: self.objects,
        }
    }
}
