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

// fake-npu-driver is a stand-in for the accelerator driver. It records
// every call it receives and returns canned statuses; an optional hook runs
// in place of the hardware when a command stream is submitted.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::slice;
use npu_interface::{CacheMask, InvokeConfig, NpuDriver};
use npu_shared::{BoundRegions, DriverStatus, InitFlags, RegionIndex};

/// Register base a test platform hands out.
pub const FAKE_REGS_BASE: usize = 0x4004_0000;

pub fn fake_regs_base() -> usize { FAKE_REGS_BASE }

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DriverCall {
    Init {
        regs_base: usize,
        fast_memory: usize,
        fast_memory_size: usize,
        flags: InitFlags,
    },
    SetCacheMask(CacheMask),
    Invoke {
        command_stream: (usize, usize), // (address, length)
        regions: BoundRegions,
    },
    Deinit,
}

type InvokeHook = Box<dyn FnMut(&[u8], &BoundRegions) -> DriverStatus + Send>;

pub struct FakeNpuDriver {
    calls: Vec<DriverCall>,
    init_status: DriverStatus,
    invoke_status: DriverStatus,
    on_invoke: Option<InvokeHook>,
    open: bool,
}

impl FakeNpuDriver {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            init_status: 0,
            invoke_status: 0,
            on_invoke: None,
            open: false,
        }
    }

    /// Makes init() return |status|.
    pub fn with_init_status(mut self, status: DriverStatus) -> Self {
        self.init_status = status;
        self
    }

    /// Makes invoke() return |status| when no hook is installed.
    pub fn with_invoke_status(mut self, status: DriverStatus) -> Self {
        self.invoke_status = status;
        self
    }

    /// Runs |hook| on every invoke(); its return value is the status.
    pub fn with_invoke_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&[u8], &BoundRegions) -> DriverStatus + Send + 'static,
    {
        self.on_invoke = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> &[DriverCall] { &self.calls }

    pub fn clear_calls(&mut self) { self.calls.clear(); }

    pub fn init_count(&self) -> usize { self.count(|c| matches!(c, DriverCall::Init { .. })) }

    pub fn invoke_count(&self) -> usize { self.count(|c| matches!(c, DriverCall::Invoke { .. })) }

    pub fn deinit_count(&self) -> usize { self.count(|c| matches!(c, DriverCall::Deinit)) }

    /// True between a successful init() and the following deinit().
    pub fn is_open(&self) -> bool { self.open }

    /// The tables passed to the most recent invoke(), if any.
    pub fn last_bound(&self) -> Option<BoundRegions> {
        self.calls.iter().rev().find_map(|c| match c {
            DriverCall::Invoke { regions, .. } => Some(*regions),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&DriverCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(*c)).count()
    }
}

impl Default for FakeNpuDriver {
    fn default() -> Self { Self::new() }
}

impl NpuDriver for FakeNpuDriver {
    fn init(&mut self, regs_base: usize, config: &InvokeConfig) -> DriverStatus {
        self.calls.push(DriverCall::Init {
            regs_base,
            fast_memory: config.fast_memory,
            fast_memory_size: config.fast_memory_size,
            flags: config.flags,
        });
        self.open = self.init_status == 0;
        self.init_status
    }

    fn set_cache_mask(&mut self, mask: CacheMask) {
        assert!(self.open, "cache mask set on a closed device");
        self.calls.push(DriverCall::SetCacheMask(mask));
    }

    fn invoke(&mut self, command_stream: &[u8], regions: &BoundRegions) -> DriverStatus {
        assert!(self.open, "invoke on a closed device");
        self.calls.push(DriverCall::Invoke {
            command_stream: (command_stream.as_ptr() as usize, command_stream.len()),
            regions: *regions,
        });
        match self.on_invoke.as_mut() {
            Some(hook) => hook(command_stream, regions),
            None => self.invoke_status,
        }
    }

    fn deinit(&mut self) {
        assert!(self.open, "deinit without a successful init");
        self.calls.push(DriverCall::Deinit);
        self.open = false;
    }
}

/// Returns the bytes bound at |region|, as the accelerator would see them.
///
/// # Safety
///
/// |regions| must have come from a live bind whose storage is not otherwise
/// borrowed for the lifetime of the returned slice; this holds inside an
/// invoke hook.
pub unsafe fn bound_region_mut<'r>(regions: &'r BoundRegions, region: RegionIndex) -> Option<&'r mut [u8]> {
    let (base, size) = regions.slot(region);
    if base == 0 || size == 0 {
        return None;
    }
    Some(slice::from_raw_parts_mut(base as usize as *mut u8, size))
}
