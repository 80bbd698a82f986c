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

//! Topology-aware group partitioning
//!
//! A collective split of a process group into sub-groups sharing a locality
//! property: the agreement protocol reconciles every rank's locally derived
//! hint into one fabric-wide decision, and the splitter applies the agreed
//! color to partition the group.

pub mod agreement;
pub mod split;

pub use agreement::{agree, AgreedDecision, GroupingHint};
pub use split::split_group;

/// Whether a member takes part in the split or is excluded from every
/// output group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitCategory {
    Participate,
    Exclude,
}
