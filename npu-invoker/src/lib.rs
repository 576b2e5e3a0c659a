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

// Invocation sequencer: one ModelContext per compiled model. Each invoke()
// binds the model's regions, opens the device, submits the command stream
// and releases the device again, in that order and on every path.

extern crate alloc;

mod session;

use alloc::string::String;
use alloc::vec::Vec;
use log::{error, info, trace};
use npu_interface::*;
use npu_region_table::RegionTable;
use npu_shared::{DriverStatus, TensorDescriptor};
use session::DeviceSession;

/// Where a context is in the invocation sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvokeState {
    Idle,
    Bound,
    DeviceOpen,
    Submitted,
    Completed,
    Failed,
}

/// Statistics on non-happy-path events.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Statistics {
    pub invocations: u32,
    pub init_failures: u32,
    pub submit_failures: u32,
}

struct TensorTable {
    inputs: Vec<TensorDescriptor>,
    outputs: Vec<TensorDescriptor>,
    variables: Vec<TensorDescriptor>,
}
impl TensorTable {
    fn iter(&self) -> impl Iterator<Item = (&'static str, &TensorDescriptor)> + '_ {
        self.inputs
            .iter()
            .map(|d| ("input", d))
            .chain(self.outputs.iter().map(|d| ("output", d)))
            .chain(self.variables.iter().map(|d| ("variable", d)))
    }
}

fn bump(counter: &mut u32) { *counter = counter.saturating_add(1); }

fn advance(name: &str, state: &mut InvokeState, next: InvokeState) {
    trace!("{}: {:?} -> {:?}", name, *state, next);
    *state = next;
}

pub struct ModelContext<'a, D: NpuDriver, R: RegisterAccessor> {
    name: String,
    command_stream: &'a [u8],
    regions: RegionTable<'a>,
    tensors: TensorTable,
    driver: D,
    registers: R,
    config: InvokeConfig,
    state: InvokeState,
    last_result: Option<Result<(), InvokeError>>,
    statistics: Statistics,
}

impl<'a, D: NpuDriver, R: RegisterAccessor> ModelContext<'a, D, R> {
    /// Loads |model|: allocates its working regions and checks every tensor
    /// descriptor against them. Nothing touches the device until invoke().
    pub fn new(model: &CompiledModel<'a>, driver: D, registers: R) -> Result<Self, ModelError> {
        let regions = RegionTable::new(model.weights, model.weight_region, model.regions)
            .map_err(|e| {
                error!("{}: LoadModel failed: {:?}", model.name, e);
                e
            })?;
        let tensors = TensorTable {
            inputs: model.inputs.to_vec(),
            outputs: model.outputs.to_vec(),
            variables: model.variables.to_vec(),
        };
        Self::assemble(model.name.into(), model.command_stream, regions, tensors, driver, registers)
    }

    /// Loads a model described by a serialized manifest plus its raw blobs.
    pub fn from_manifest(
        manifest: &ModelManifest,
        command_stream: &'a [u8],
        weights: &'a [u8],
        driver: D,
        registers: R,
    ) -> Result<Self, ModelError> {
        let load = || -> Result<_, ModelError> {
            let regions = RegionTable::from_manifest(weights, manifest)?;
            let tensors = TensorTable {
                inputs: manifest.input_descriptors()?,
                outputs: manifest.output_descriptors()?,
                variables: manifest.variable_descriptors()?,
            };
            Ok((regions, tensors))
        };
        let (regions, tensors) = load().map_err(|e| {
            error!("{}: LoadModel failed: {:?}", &manifest.name, e);
            e
        })?;
        Self::assemble(manifest.name.clone(), command_stream, regions, tensors, driver, registers)
    }

    fn assemble(
        name: String,
        command_stream: &'a [u8],
        regions: RegionTable<'a>,
        tensors: TensorTable,
        driver: D,
        registers: R,
    ) -> Result<Self, ModelError> {
        for (role, desc) in tensors.iter() {
            if let Err(e) = regions.check_descriptor(desc) {
                error!("{}: {} {} rejected: {:?}", &name, role, desc, e);
                return Err(e);
            }
        }
        trace!("{}: loaded, {} byte command stream", &name, command_stream.len());
        Ok(Self {
            name,
            command_stream,
            regions,
            tensors,
            driver,
            registers,
            config: InvokeConfig::default(),
            state: InvokeState::Idle,
            last_result: None,
            statistics: Statistics::default(),
        })
    }

    /// Replaces the device configuration used by subsequent invocations.
    pub fn with_config(mut self, config: InvokeConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the model once. Returns 0 on success, otherwise the driver's
    /// status unchanged. Outputs are only meaningful after a 0 return.
    pub fn invoke(&mut self) -> DriverStatus { status_of(self.try_invoke()) }

    pub fn try_invoke(&mut self) -> Result<(), InvokeError> {
        bump(&mut self.statistics.invocations);

        let bound = self.regions.bind();
        advance(&self.name, &mut self.state, InvokeState::Bound);

        let regs_base = self.registers.regs_base();
        let result = match DeviceSession::open(&mut self.driver, regs_base, &self.config) {
            Ok(mut session) => {
                advance(&self.name, &mut self.state, InvokeState::DeviceOpen);
                advance(&self.name, &mut self.state, InvokeState::Submitted);
                let result = session.submit(self.command_stream, &bound);
                let outcome = if result.is_ok() {
                    InvokeState::Completed
                } else {
                    InvokeState::Failed
                };
                advance(&self.name, &mut self.state, outcome);
                result
                // NB: session drops here, releasing the device
            }
            Err(e) => {
                advance(&self.name, &mut self.state, InvokeState::Failed);
                Err(e)
            }
        };

        match result {
            Ok(()) => {}
            Err(e @ InvokeError::DeviceInit(_)) => {
                error!("{}: {}", &self.name, e);
                bump(&mut self.statistics.init_failures);
            }
            Err(e @ InvokeError::Submit(_)) => {
                error!("{}: {}", &self.name, e);
                bump(&mut self.statistics.submit_failures);
            }
        }
        advance(&self.name, &mut self.state, InvokeState::Idle);
        self.last_result = Some(result);
        result
    }

    fn pick(list: &[TensorDescriptor], index: usize) -> Result<TensorDescriptor, ModelError> {
        list.get(index).copied().ok_or(ModelError::NoSuchTensor)
    }

    pub fn input(&self, index: usize) -> Result<&[u8], ModelError> {
        self.regions.tensor(&Self::pick(&self.tensors.inputs, index)?)
    }

    pub fn input_mut(&mut self, index: usize) -> Result<&mut [u8], ModelError> {
        let desc = Self::pick(&self.tensors.inputs, index)?;
        self.regions.tensor_mut(&desc)
    }

    pub fn output(&self, index: usize) -> Result<&[u8], ModelError> {
        self.regions.tensor(&Self::pick(&self.tensors.outputs, index)?)
    }

    pub fn variable(&self, index: usize) -> Result<&[u8], ModelError> {
        self.regions.tensor(&Self::pick(&self.tensors.variables, index)?)
    }

    pub fn variable_mut(&mut self, index: usize) -> Result<&mut [u8], ModelError> {
        let desc = Self::pick(&self.tensors.variables, index)?;
        self.regions.tensor_mut(&desc)
    }

    pub fn inputs(&self) -> &[TensorDescriptor] { &self.tensors.inputs }
    pub fn outputs(&self) -> &[TensorDescriptor] { &self.tensors.outputs }
    pub fn variables(&self) -> &[TensorDescriptor] { &self.tensors.variables }

    pub fn regions(&self) -> &RegionTable<'a> { &self.regions }
    pub fn regions_mut(&mut self) -> &mut RegionTable<'a> { &mut self.regions }

    pub fn driver(&self) -> &D { &self.driver }
    pub fn driver_mut(&mut self) -> &mut D { &mut self.driver }

    pub fn config(&self) -> &InvokeConfig { &self.config }
    pub fn state(&self) -> InvokeState { self.state }
    pub fn statistics(&self) -> &Statistics { &self.statistics }
    pub fn name(&self) -> &str { &self.name }

    /// Result of the most recent invocation, if any.
    pub fn last_result(&self) -> Option<Result<(), InvokeError>> { self.last_result }

    pub fn debug_state(&self) {
        info!(target: "", "Model {}: {:?}", &self.name, self.state);
        info!(target: "", "Command stream: {} bytes", self.command_stream.len());
        info!(target: "", "Config: {:?}", self.config);
        info!(target: "", "Regions:");
        self.regions.debug_state();
        info!(target: "", "Tensors:");
        for (role, desc) in self.tensors.iter() {
            info!(target: "", "  {:<8} {}", role, desc);
        }
        match self.last_result {
            Some(result) => info!(target: "", "Last result: {:?}", result),
            None => info!(target: "", "Not yet invoked."),
        }
        info!(target: "", "{:?}", self.statistics);
    }
}
