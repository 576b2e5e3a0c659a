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

use core::fmt;
use npu_shared::{RegionDecl, RegionIndex, TensorDescriptor};

/// Everything the offline compiler emits for one model, in a form that can
/// live in a `static`. Nothing here is validated until a context is built
/// from it.
///
/// ```ignore
/// static KWS: CompiledModel<'static> = CompiledModel {
///     name: "kws",
///     command_stream: &KWS_CMD_DATA,
///     weights: &KWS_WEIGHTS.0,
///     weight_region: 0,
///     regions: &[RegionDecl::working(1, 496), RegionDecl::fast_working(2, 20752)],
///     inputs: &[TensorDescriptor::new(1, 0, 490)],
///     outputs: &[TensorDescriptor::new(1, 0, 12)],
///     variables: &[],
/// };
/// ```
#[derive(Clone, Copy)]
pub struct CompiledModel<'a> {
    pub name: &'a str,
    pub command_stream: &'a [u8],
    pub weights: &'a [u8],
    pub weight_region: RegionIndex,
    pub regions: &'a [RegionDecl],
    pub inputs: &'a [TensorDescriptor],
    pub outputs: &'a [TensorDescriptor],
    pub variables: &'a [TensorDescriptor],
}

// NB: the byte blobs are large; show their lengths only.
impl fmt::Debug for CompiledModel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CompiledModel")
            .field("name", &self.name)
            .field("command_stream", &self.command_stream.len())
            .field("weights", &self.weights.len())
            .field("weight_region", &self.weight_region)
            .field("regions", &self.regions)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("variables", &self.variables)
            .finish()
    }
}
