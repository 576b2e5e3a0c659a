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

//! Owned, zero-initialized region storage aligned for the accelerator.

use alloc::vec;
use alloc::vec::Vec;
use core::mem::{align_of, size_of};
use core::slice;
use npu_shared::{round_up, REGION_ALIGNMENT};
use static_assertions::const_assert_eq;

// Storage is allocated in units of Block so the allocation inherits its
// alignment; the buffer length need not be a multiple of the block size.
#[derive(Clone, Copy)]
#[repr(C, align(32))]
struct Block([u8; REGION_ALIGNMENT]);

const_assert_eq!(align_of::<Block>(), REGION_ALIGNMENT);
const_assert_eq!(size_of::<Block>(), REGION_ALIGNMENT);

pub struct RegionBuffer {
    blocks: Vec<Block>,
    len: usize,
}

impl RegionBuffer {
    /// Allocates |len| zeroed bytes.
    pub fn zeroed(len: usize) -> Self {
        let nblocks = round_up(len, REGION_ALIGNMENT) / REGION_ALIGNMENT;
        Self {
            blocks: vec![Block([0; REGION_ALIGNMENT]); nblocks],
            len,
        }
    }

    pub fn len(&self) -> usize { self.len }

    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn as_ptr(&self) -> *const u8 { self.blocks.as_ptr().cast::<u8>() }

    pub fn as_mut_ptr(&mut self) -> *mut u8 { self.blocks.as_mut_ptr().cast::<u8>() }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: blocks holds at least len initialized bytes.
        unsafe { slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: blocks holds at least len initialized bytes.
        unsafe { slice::from_raw_parts_mut(self.as_mut_ptr(), self.len) }
    }

    /// Zeroes the whole buffer, including the tail padding.
    pub fn clear(&mut self) { self.blocks.fill(Block([0; REGION_ALIGNMENT])); }
}

impl core::fmt::Debug for RegionBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "RegionBuffer({} @ {:#x})", self.len, self.as_ptr() as usize)
    }
}
