// Copyright 2022 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![cfg_attr(not(test), no_std)]

// Data structures shared by the NPU region table, the invocation sequencer
// and the driver bindings. Nothing in here knows about a particular driver.

use core::fmt;
use core::ops::Range;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

/// Length of the base-pointer arrays handed to the accelerator driver.
/// Every compiled model addresses regions 0..MAX_REGIONS.
pub const MAX_REGIONS: usize = 8;

/// Required alignment (in bytes) of every bound region base address.
pub const REGION_ALIGNMENT: usize = 32;

/// Region index the compiler uses for the weights blob by convention.
/// Nothing below depends on it; artifacts always name their weight region.
pub const WEIGHTS_REGION: RegionIndex = 0;

const_assert!(REGION_ALIGNMENT.is_power_of_two());
const_assert!(WEIGHTS_REGION < MAX_REGIONS);

/// Index into the accelerator's base-pointer table.
pub type RegionIndex = usize;

/// Status returned by the accelerator driver; 0 is success, anything else
/// is driver-defined.
pub type DriverStatus = i32;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RegionKind {
    /// Read-only constant data supplied with the artifact.
    Weights,
    /// Read-write scratch, zeroed at model load.
    Working,
    /// Same as Working but placed in faster (closer) memory.
    FastWorking,
}
impl RegionKind {
    pub fn is_writable(&self) -> bool { !matches!(self, RegionKind::Weights) }
}
impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RegionKind::Weights => write!(f, "weights"),
            RegionKind::Working => write!(f, "working"),
            RegionKind::FastWorking => write!(f, "fast-working"),
        }
    }
}

/// A non-weight region as declared by the compiled artifact. A size of 0
/// declares the region absent.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RegionDecl {
    pub index: RegionIndex,
    pub kind: RegionKind,
    pub size: usize,
}
impl RegionDecl {
    pub const fn working(index: RegionIndex, size: usize) -> Self {
        Self {
            index,
            kind: RegionKind::Working,
            size,
        }
    }

    pub const fn fast_working(index: RegionIndex, size: usize) -> Self {
        Self {
            index,
            kind: RegionKind::FastWorking,
            size,
        }
    }
}

/// Where one tensor lives: |length| bytes at |offset| within |region|.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TensorDescriptor {
    pub region: RegionIndex,
    pub offset: usize,
    pub length: usize,
}
impl TensorDescriptor {
    pub const fn new(region: RegionIndex, offset: usize, length: usize) -> Self {
        Self {
            region,
            offset,
            length,
        }
    }

    /// One past the last byte of the tensor, or None on overflow.
    pub fn end(&self) -> Option<usize> { self.offset.checked_add(self.length) }

    /// Byte range of the tensor within its region. Callers must have
    /// checked end() first.
    pub fn range(&self) -> Range<usize> { self.offset..self.offset + self.length }

    /// Returns true if the tensor fits a region of |region_size| bytes.
    pub fn fits(&self, region_size: usize) -> bool {
        self.end().map_or(false, |end| end <= region_size)
    }
}
impl fmt::Display for TensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "r{}[{:#x}+{}]", self.region, self.offset, self.length)
    }
}

bitflags::bitflags! {
    /// Privilege flags passed to driver initialization.
    #[derive(Default)]
    pub struct InitFlags: u32 {
        const SECURE     = 0b00000001;
        const PRIVILEGED = 0b00000010;
    }
}

/// Base address & size tables handed to the driver, one slot per region
/// index. Absent regions are (0, 0).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct BoundRegions {
    pub base_addr: [u64; MAX_REGIONS],
    pub base_size: [usize; MAX_REGIONS],
}
impl BoundRegions {
    pub const fn new() -> Self {
        Self {
            base_addr: [0; MAX_REGIONS],
            base_size: [0; MAX_REGIONS],
        }
    }

    /// Records |base| and |size| for |region|. A null base or zero size
    /// leaves the slot unbound.
    pub fn bind(&mut self, region: RegionIndex, base: u64, size: usize) {
        if base == 0 || size == 0 {
            self.base_addr[region] = 0;
            self.base_size[region] = 0;
        } else {
            self.base_addr[region] = base;
            self.base_size[region] = size;
        }
    }

    pub fn slot(&self, region: RegionIndex) -> (u64, usize) {
        (self.base_addr[region], self.base_size[region])
    }

    pub fn is_bound(&self, region: RegionIndex) -> bool { self.base_size[region] != 0 }

    /// Number of slots; always MAX_REGIONS.
    pub const fn len(&self) -> usize { MAX_REGIONS }

    pub fn bound_count(&self) -> usize { self.base_size.iter().filter(|s| **s != 0).count() }
}
impl Default for BoundRegions {
    fn default() -> Self { Self::new() }
}

pub fn round_up(a: usize, b: usize) -> usize {
    if (a % b) == 0 {
        a
    } else {
        usize::checked_add(a, b).unwrap() - (a % b)
    }
}

pub fn is_aligned(addr: usize, align: usize) -> bool { (addr & (align - 1)) == 0 }
