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

//! Exported entry points for statically linked models.
//!
//! Each model gets one lazily loaded [`ModelContext`] behind a spin lock
//! and a zero-argument C function that runs it:
//!
//! ```ignore
//! npu_model!(kws,
//!     model = KWS,
//!     driver = EthosuDriver = EthosuDriver::new(),
//!     regs = ethosu_npu_driver::regs_base);
//!
//! // extern "C" fn kws_invoke() -> i32
//! // fn kws_context() -> Result<&'static StaticContext<EthosuDriver>, ModelError>
//! ```

#![cfg_attr(not(test), no_std)]

#[doc(hidden)]
pub use paste;
#[doc(hidden)]
pub use spin;

#[cfg(feature = "ethosu_support")]
pub use ethosu_npu_driver;
pub use npu_interface;
pub use npu_invoker;

use log::error;
use npu_interface::{CompiledModel, ModelError, NpuDriver};
use npu_invoker::ModelContext;
use npu_shared::DriverStatus;
use spin::{Mutex, Once};

/// Register accessor used by exported models.
pub type RegsFn = fn() -> usize;

/// A model context shared through a static.
pub type StaticContext<D> = Mutex<ModelContext<'static, D, RegsFn>>;

/// Loads |model| into |cell| on first use; later calls return the stored
/// context. A failed load leaves |cell| empty so the next call retries.
pub fn load_static<D, F>(
    cell: &'static Once<StaticContext<D>>,
    model: &CompiledModel<'static>,
    driver: F,
    regs: RegsFn,
) -> Result<&'static StaticContext<D>, ModelError>
where
    D: NpuDriver,
    F: FnOnce() -> D,
{
    cell.try_call_once(|| ModelContext::new(model, driver(), regs).map(Mutex::new))
}

/// Runs a statically held model; the status convention of the exported
/// `<model>_invoke` functions.
pub fn invoke_static<D: NpuDriver>(context: Result<&StaticContext<D>, ModelError>) -> DriverStatus {
    match context {
        Ok(context) => context.lock().invoke(),
        Err(e) => {
            error!("Model unavailable: {:?}", e);
            e.into()
        }
    }
}

/// Declares a statically held model and its exported entry points.
///
/// `npu_model!(foo, model = FOO, driver = T = expr, regs = path)` defines
/// `foo_context()` for out-of-band tensor exchange and
/// `extern "C" fn foo_invoke() -> i32`. The driver expression is evaluated
/// once, on first use.
#[macro_export]
macro_rules! npu_model {
    ($prefix:ident,
     model = $model:expr,
     driver = $driver_ty:ty = $driver:expr,
     regs = $regs:path $(,)?) => {
        $crate::paste::paste! {
            static [<$prefix:upper _CONTEXT>]: $crate::spin::Once<$crate::StaticContext<$driver_ty>> =
                $crate::spin::Once::new();

            pub fn [<$prefix _context>]() -> Result<
                &'static $crate::StaticContext<$driver_ty>,
                $crate::npu_interface::ModelError,
            > {
                $crate::load_static(&[<$prefix:upper _CONTEXT>], &$model, || $driver, $regs)
            }

            #[no_mangle]
            pub extern "C" fn [<$prefix _invoke>]() -> i32 {
                $crate::invoke_static([<$prefix _context>]())
            }
        }
    };
}

/// `npu_model!` bound to the Ethos-U driver and platform register base.
#[cfg(feature = "ethosu_support")]
#[macro_export]
macro_rules! ethosu_model {
    ($prefix:ident, model = $model:expr $(,)?) => {
        $crate::npu_model!($prefix,
            model = $model,
            driver = $crate::ethosu_npu_driver::EthosuDriver =
                $crate::ethosu_npu_driver::EthosuDriver::new(),
            regs = $crate::ethosu_npu_driver::regs_base);
    };
}
