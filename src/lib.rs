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

//! Weft: topology discovery and topology-aware process grouping
//!
//! Weft is the topology layer of a distributed message-passing runtime. It
//! classifies the interconnection fabric (fat-tree, torus, or unrecognized)
//! and assigns per-node depth levels, resolves each process's position in
//! its local hardware hierarchy, and partitions a group of cooperating
//! processes into sub-groups sharing a locality property through a
//! collective agreement protocol that reaches the identical decision on
//! every rank.

pub mod ctx;
pub mod error;
pub mod fabric;
pub mod group;
pub mod hw;
pub mod net;
pub mod util;

// Re-export commonly used types
pub use crate::ctx::WeftContext;
pub use crate::error::{Code, WeftError, WeftResult};
pub use crate::fabric::{FabricTopology, NetworkAttributes, NetworkType};
pub use crate::group::{split_group, SplitCategory};

/// The main entry point and version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
