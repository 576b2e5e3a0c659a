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

// Serialized description of a compiled model's memory layout.
//
// The manifest carries what the offline compiler reports per tensor (shape,
// element size, region, offset) plus its scratch areas; region sizes are
// derived from it rather than stored. The command stream and weights travel
// separately as raw blobs.

use crate::error::ModelError;
use alloc::string::String;
use alloc::vec::Vec;
use log::trace;
use npu_shared::{RegionDecl, RegionIndex, RegionKind, TensorDescriptor, MAX_REGIONS};
use serde::{Deserialize, Serialize};

/// Placement of one tensor as reported by the compiler.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TensorLayout {
    pub shape: Vec<u32>,
    pub elem_size: u32,
    pub region: RegionIndex,
    pub offset: usize,
}
impl TensorLayout {
    /// Tensor size in bytes, or None on overflow.
    pub fn byte_len(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(self.elem_size as usize, |acc, dim| acc.checked_mul(*dim as usize))
    }

    pub fn descriptor(&self) -> Result<TensorDescriptor, ModelError> {
        let length = self.byte_len().ok_or(ModelError::TensorOutOfBounds)?;
        Ok(TensorDescriptor::new(self.region, self.offset, length))
    }
}

/// A compiler scratch area: |size| bytes from the start of |region|.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ScratchLayout {
    pub region: RegionIndex,
    pub size: usize,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub name: String,
    pub weight_region: RegionIndex,
    pub scratch: Option<ScratchLayout>,
    pub scratch_fast: Option<ScratchLayout>,
    pub inputs: Vec<TensorLayout>,
    pub outputs: Vec<TensorLayout>,
    pub variables: Vec<TensorLayout>,
}

impl ModelManifest {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ModelError> {
        Ok(postcard::from_bytes::<ModelManifest>(bytes)?)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, ModelError> {
        postcard::to_allocvec(self).or(Err(ModelError::SerializeFailed))
    }

    fn tensors(&self) -> impl Iterator<Item = &TensorLayout> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .chain(self.variables.iter())
    }

    /// Bytes required by each region: the furthest tensor end or scratch
    /// size placed in it. The weights region is always 0 since it is bound
    /// to the weights blob rather than allocated.
    pub fn region_sizes(&self) -> Result<[usize; MAX_REGIONS], ModelError> {
        if self.weight_region >= MAX_REGIONS {
            return Err(ModelError::RegionIndexOutOfRange);
        }
        let mut sizes = [0usize; MAX_REGIONS];
        for tensor in self.tensors() {
            let desc = tensor.descriptor()?;
            let end = desc.end().ok_or(ModelError::TensorOutOfBounds)?;
            let cap = sizes
                .get_mut(desc.region)
                .ok_or(ModelError::RegionIndexOutOfRange)?;
            *cap = (*cap).max(end);
        }
        for scratch in self.scratch.iter().chain(self.scratch_fast.iter()) {
            if scratch.size == 0 {
                continue;
            }
            let cap = sizes
                .get_mut(scratch.region)
                .ok_or(ModelError::RegionIndexOutOfRange)?;
            *cap = (*cap).max(scratch.size);
        }
        sizes[self.weight_region] = 0;
        trace!("{}: region sizes {:?}", self.name, sizes);
        Ok(sizes)
    }

    /// Declarations for every region that needs storage. The fast scratch
    /// region becomes FastWorking; every other allocated region Working.
    pub fn region_decls(&self) -> Result<Vec<RegionDecl>, ModelError> {
        let fast_region = self
            .scratch_fast
            .filter(|scratch| scratch.size != 0)
            .map(|scratch| scratch.region);
        Ok(self
            .region_sizes()?
            .iter()
            .enumerate()
            .filter(|(_, size)| **size != 0)
            .map(|(index, size)| RegionDecl {
                index,
                kind: if Some(index) == fast_region {
                    RegionKind::FastWorking
                } else {
                    RegionKind::Working
                },
                size: *size,
            })
            .collect())
    }

    pub fn input_descriptors(&self) -> Result<Vec<TensorDescriptor>, ModelError> {
        self.inputs.iter().map(TensorLayout::descriptor).collect()
    }

    pub fn output_descriptors(&self) -> Result<Vec<TensorDescriptor>, ModelError> {
        self.outputs.iter().map(TensorLayout::descriptor).collect()
    }

    pub fn variable_descriptors(&self) -> Result<Vec<TensorDescriptor>, ModelError> {
        self.variables.iter().map(TensorLayout::descriptor).collect()
    }
}
