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

// End-to-end invocations against the fake driver.

use assert_hex::assert_eq_hex;
use fake_npu_driver::*;
use npu_interface::{CompiledModel, InvokeError};
use npu_invoker::{InvokeState, ModelContext};
use npu_shared::*;

fn setup() { let _ = env_logger::builder().is_test(true).try_init(); }

#[repr(C, align(32))]
struct Weights([u8; 512]);
static WEIGHTS: Weights = Weights([0xa5; 512]);
static COMMAND_STREAM: [u8; 64] = [0x01; 64];

const REGIONS: &[RegionDecl] = &[RegionDecl::working(1, 1024), RegionDecl::fast_working(2, 0)];
const INPUT: TensorDescriptor = TensorDescriptor::new(1, 0, 16);
const OUTPUT: TensorDescriptor = TensorDescriptor::new(1, 512, 16);

fn model() -> CompiledModel<'static> {
    CompiledModel {
        name: "echo",
        command_stream: &COMMAND_STREAM,
        weights: &WEIGHTS.0,
        weight_region: WEIGHTS_REGION,
        regions: REGIONS,
        inputs: &[INPUT],
        outputs: &[OUTPUT],
        variables: &[],
    }
}

#[test]
fn binds_declared_regions_only() {
    setup();
    let weights_base = WEIGHTS.0.as_ptr() as u64;
    let driver = FakeNpuDriver::new().with_invoke_hook(move |cmd, regions| {
        assert_eq!(cmd.len(), 64);
        assert_eq_hex!(regions.base_addr[0], weights_base);
        assert_eq!(regions.base_size[0], 512);
        assert_ne!(regions.base_addr[1], 0);
        assert_eq!(regions.base_size[1], 1024);
        for region in 2..MAX_REGIONS {
            assert_eq!(regions.slot(region), (0, 0));
        }
        0
    });
    let mut ctx = ModelContext::new(&model(), driver, fake_regs_base).unwrap();
    assert_eq!(ctx.invoke(), 0);

    let base = ctx.regions().base(1).unwrap().as_ptr() as usize;
    assert!(is_aligned(base, REGION_ALIGNMENT));
    let bound = ctx.driver().last_bound().unwrap();
    assert_eq_hex!(bound.base_addr[1], base as u64);
    assert_eq!(ctx.driver().calls().len(), 3);
    assert_eq!(ctx.driver().deinit_count(), 1);
    assert_eq!(ctx.state(), InvokeState::Idle);
}

#[test]
fn accelerator_writes_are_visible_after_invoke() {
    setup();
    // Stands in for a model that copies its input to its output.
    let driver = FakeNpuDriver::new().with_invoke_hook(|_, regions| {
        // SAFETY: called by the driver while the bound table is live.
        let region = unsafe { bound_region_mut(regions, INPUT.region) }.unwrap();
        region.copy_within(INPUT.range(), OUTPUT.offset);
        0
    });
    let mut ctx = ModelContext::new(&model(), driver, fake_regs_base).unwrap();

    let pattern: Vec<u8> = (0..16).map(|i| i * 3 + 1).collect();
    ctx.input_mut(0).unwrap().copy_from_slice(&pattern);
    assert_eq!(ctx.output(0).unwrap(), &[0; 16]);

    assert_eq!(ctx.invoke(), 0);
    assert_eq!(ctx.output(0).unwrap(), &pattern[..]);
    assert_eq!(ctx.input(0).unwrap(), &pattern[..]);
}

#[test]
fn working_storage_persists_between_invocations() {
    setup();
    // Accumulates into the first output byte on every run.
    let driver = FakeNpuDriver::new().with_invoke_hook(|_, regions| {
        // SAFETY: called by the driver while the bound table is live.
        let region = unsafe { bound_region_mut(regions, OUTPUT.region) }.unwrap();
        region[OUTPUT.offset] += 1;
        0
    });
    let mut ctx = ModelContext::new(&model(), driver, fake_regs_base).unwrap();
    for _ in 0..4 {
        assert_eq!(ctx.invoke(), 0);
    }
    assert_eq!(ctx.output(0).unwrap()[0], 4);

    ctx.regions_mut().clear_working();
    assert_eq!(ctx.output(0).unwrap()[0], 0);
}

#[test]
fn failed_submit_reports_driver_status() {
    setup();
    let driver = FakeNpuDriver::new().with_invoke_hook(|_, _| -1);
    let mut ctx = ModelContext::new(&model(), driver, fake_regs_base).unwrap();
    assert_eq!(ctx.try_invoke(), Err(InvokeError::Submit(-1)));
    assert_eq!(ctx.driver().deinit_count(), 1);
    assert!(!ctx.driver().is_open());
    ctx.debug_state();
}
