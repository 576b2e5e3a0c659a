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
use npu_shared::DriverStatus;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Failure of one invocation. Both variants carry the driver's status
/// unmodified.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvokeError {
    /// Driver init returned non-zero; nothing was submitted.
    DeviceInit(DriverStatus),
    /// The command stream was submitted and the driver reported failure.
    Submit(DriverStatus),
}
impl InvokeError {
    /// The driver status that caused the failure.
    pub fn status(&self) -> DriverStatus {
        match *self {
            InvokeError::DeviceInit(status) | InvokeError::Submit(status) => status,
        }
    }
}
impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InvokeError::DeviceInit(status) => write!(f, "device init failed ({})", status),
            InvokeError::Submit(status) => write!(f, "submission failed ({})", status),
        }
    }
}

/// Collapses an invocation result to the integer presented to callers:
/// 0 on success, otherwise the driver status verbatim.
impl From<InvokeError> for DriverStatus {
    fn from(err: InvokeError) -> DriverStatus { err.status() }
}

pub fn status_of(result: Result<(), InvokeError>) -> DriverStatus {
    result.map_or_else(DriverStatus::from, |_| 0)
}

/// Defects in a compiled artifact, found when the model is loaded.
///
/// Values are negative and well away from the driver's own codes so an
/// exported entry point can return either without ambiguity.
#[repr(i32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, IntoPrimitive, TryFromPrimitive)]
pub enum ModelError {
    RegionIndexOutOfRange = -256,
    DuplicateRegion,
    WeightsRegionConflict,
    MisalignedWeights,
    TensorRegionAbsent,
    TensorOutOfBounds,
    ReadOnlyRegion,
    NoSuchTensor,
    DeserializeFailed,
    SerializeFailed,
    RegionTooLarge,
}

impl From<postcard::Error> for ModelError {
    fn from(_err: postcard::Error) -> ModelError { ModelError::DeserializeFailed }
}
