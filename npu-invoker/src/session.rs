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

//! RAII wrapper for one open accelerator device.

use log::trace;
use npu_interface::{InvokeConfig, InvokeError, NpuDriver};
use npu_shared::BoundRegions;

/// Exists only between a successful driver init and the matching deinit;
/// dropping it releases the device.
pub(crate) struct DeviceSession<'d, D: NpuDriver> {
    driver: &'d mut D,
}

impl<'d, D: NpuDriver> DeviceSession<'d, D> {
    /// Initializes the device at |regs_base|. On failure the driver status
    /// is returned and nothing needs releasing.
    pub fn open(driver: &'d mut D, regs_base: usize, config: &InvokeConfig) -> Result<Self, InvokeError> {
        trace!("INIT {:#x} {:?}", regs_base, config.flags);
        match driver.init(regs_base, config) {
            0 => {}
            status => return Err(InvokeError::DeviceInit(status)),
        }
        let session = Self { driver };
        if let Some(mask) = config.cache_mask {
            trace!("CACHE flush {:#010b} invalidate {:#010b}", mask.flush, mask.invalidate);
            session.driver.set_cache_mask(mask);
        }
        Ok(session)
    }

    /// Submits |command_stream| and blocks until the driver returns.
    pub fn submit(&mut self, command_stream: &[u8], regions: &BoundRegions) -> Result<(), InvokeError> {
        trace!("SUBMIT {} bytes, {} regions", command_stream.len(), regions.bound_count());
        match self.driver.invoke(command_stream, regions) {
            0 => Ok(()),
            status => Err(InvokeError::Submit(status)),
        }
    }
}

impl<D: NpuDriver> Drop for DeviceSession<'_, D> {
    fn drop(&mut self) {
        trace!("DEINIT");
        self.driver.deinit();
    }
}
