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

#![no_std]

//! ethosu-npu-driver binds the Arm Ethos-U core driver. The C library and
//! the platform's `ethosu_get_regs_base` are supplied at link time.

extern crate alloc;

use alloc::boxed::Box;
use core::ffi::{c_int, c_void};
use core::mem::{align_of, size_of};
use core::ptr;
use log::{error, info, trace};
use npu_interface::{CacheMask, InvokeConfig, NpuDriver};
use npu_shared::{BoundRegions, DriverStatus, MAX_REGIONS};
use static_assertions::const_assert;

/// Bytes reserved for `struct ethosu_driver`.
/// NB: must be at least sizeof(struct ethosu_driver) for the linked driver
///     version; the driver is zero-initialized like `= {0}` in C.
pub const DRIVER_STORAGE_SIZE: usize = 512;

#[repr(C, align(8))]
struct DriverStorage([u8; DRIVER_STORAGE_SIZE]);

const_assert!(align_of::<DriverStorage>() >= align_of::<u64>());
const_assert!(size_of::<DriverStorage>() == DRIVER_STORAGE_SIZE);

extern "C" {
    fn ethosu_init(
        drv: *mut c_void,
        base_address: *mut c_void,
        fast_memory: *const c_void,
        fast_memory_size: usize,
        secure_enable: u32,
        privilege_enable: u32,
    ) -> c_int;
    fn ethosu_set_basep_cache_mask(drv: *mut c_void, flush_mask: u8, invalidate_mask: u8);
    fn ethosu_invoke_v3(
        drv: *mut c_void,
        custom_data_ptr: *const c_void,
        custom_data_size: c_int,
        base_addr: *mut u64,
        base_addr_size: *const usize,
        num_base_addr: c_int,
        user_arg: *mut c_void,
    ) -> c_int;
    fn ethosu_deinit(drv: *mut c_void);

    fn ethosu_get_regs_base() -> *mut c_void;
}

/// Platform register base of the NPU.
pub fn regs_base() -> usize { unsafe { ethosu_get_regs_base() as usize } }

/// One Ethos-U driver handle.
///
/// ethosu_init links the handle into the C driver's device list; the boxed
/// storage must not move between init and deinit.
pub struct EthosuDriver {
    drv: Box<DriverStorage>,
}

impl EthosuDriver {
    pub fn new() -> Self {
        Self {
            drv: Box::new(DriverStorage([0; DRIVER_STORAGE_SIZE])),
        }
    }

    fn handle(&mut self) -> *mut c_void { self.drv.0.as_mut_ptr().cast::<c_void>() }

    pub fn debug_state(&self) {
        info!(target: "ETHOSU", "drv @ {:#x} ({} bytes)", self.drv.0.as_ptr() as usize, DRIVER_STORAGE_SIZE);
    }
}

impl Default for EthosuDriver {
    fn default() -> Self { Self::new() }
}

impl NpuDriver for EthosuDriver {
    fn init(&mut self, regs_base: usize, config: &InvokeConfig) -> DriverStatus {
        unsafe {
            ethosu_init(
                self.handle(),
                regs_base as *mut c_void,
                config.fast_memory as *const c_void,
                config.fast_memory_size,
                config.is_secure() as u32,
                config.is_privileged() as u32,
            )
        }
    }

    fn set_cache_mask(&mut self, mask: CacheMask) {
        unsafe { ethosu_set_basep_cache_mask(self.handle(), mask.flush, mask.invalidate) }
    }

    fn invoke(&mut self, command_stream: &[u8], regions: &BoundRegions) -> DriverStatus {
        let size = match c_int::try_from(command_stream.len()) {
            Ok(size) => size,
            Err(_) => {
                error!("Command stream too large: {} bytes", command_stream.len());
                return -1;
            }
        };
        // NB: the driver takes base_addr as mutable; hand it a copy.
        let mut base_addr = regions.base_addr;
        trace!("ethosu_invoke_v3 {:#x} {}", command_stream.as_ptr() as usize, size);
        unsafe {
            ethosu_invoke_v3(
                self.handle(),
                command_stream.as_ptr().cast::<c_void>(),
                size,
                base_addr.as_mut_ptr(),
                regions.base_size.as_ptr(),
                MAX_REGIONS as c_int,
                ptr::null_mut(),
            )
        }
    }

    fn deinit(&mut self) { unsafe { ethosu_deinit(self.handle()) } }
}
