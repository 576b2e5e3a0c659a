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

//! Contracts between the NPU invocation core and its collaborators: the
//! accelerator driver, the platform register accessor and the compiled
//! model artifact.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod artifact;
pub mod error;
pub mod manifest;

pub use artifact::CompiledModel;
pub use error::{status_of, InvokeError, ModelError};
pub use manifest::{ModelManifest, ScratchLayout, TensorLayout};

use npu_shared::{BoundRegions, DriverStatus, InitFlags};

/// Accelerator driver as seen by the invocation sequencer.
///
/// One implementor instance corresponds to one driver handle. The
/// sequencer guarantees deinit() is called exactly once after every init()
/// that returned 0, and never otherwise.
pub trait NpuDriver {
    /// Brings up the device whose registers live at |regs_base|.
    fn init(&mut self, regs_base: usize, config: &InvokeConfig) -> DriverStatus;

    /// Selects which base pointers get cache flush/invalidate treatment
    /// around the next invocation. Drivers without cache control ignore it.
    fn set_cache_mask(&mut self, _mask: CacheMask) {}

    /// Runs |command_stream| against |regions| and blocks until the
    /// accelerator finishes.
    fn invoke(&mut self, command_stream: &[u8], regions: &BoundRegions) -> DriverStatus;

    /// Releases the device.
    fn deinit(&mut self);
}

/// Supplies the accelerator's memory-mapped register base address.
pub trait RegisterAccessor {
    fn regs_base(&self) -> usize;
}
impl<F: Fn() -> usize> RegisterAccessor for F {
    fn regs_base(&self) -> usize { self() }
}

/// Per-region cache maintenance masks; bit N applies to region N.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CacheMask {
    pub flush: u8,
    pub invalidate: u8,
}

/// Device configuration applied on every invocation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InvokeConfig {
    /// Address of the fast memory area handed to driver init (0 if none).
    pub fast_memory: usize,
    /// Size of the fast memory area in bytes.
    pub fast_memory_size: usize,
    pub flags: InitFlags,
    /// Applied after init when present; the driver default otherwise.
    pub cache_mask: Option<CacheMask>,
}
impl InvokeConfig {
    pub fn is_secure(&self) -> bool { self.flags.contains(InitFlags::SECURE) }
    pub fn is_privileged(&self) -> bool { self.flags.contains(InitFlags::PRIVILEGED) }
}
impl Default for InvokeConfig {
    // Bare-metal deployment: non-secure, privileged, no fast memory.
    fn default() -> Self {
        Self {
            fast_memory: 0,
            fast_memory_size: 0,
            flags: InitFlags::PRIVILEGED,
            cache_mask: None,
        }
    }
}
