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

//! The region table maps an accelerator region index to the memory backing
//! it. Weights alias the artifact's constant blob; every other declared
//! region is owned storage, zeroed when the table is built and never
//! resized afterwards.
//!
//! Lookups never fail: an index that is out of range, undeclared, or
//! declared with size 0 resolves to (null, 0). Inconsistent declarations
//! are rejected once, by [`RegionTable::new`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod buffer;

pub use buffer::RegionBuffer;

use core::ptr::NonNull;
use log::{error, info, trace};
use npu_interface::{ModelError, ModelManifest};
use npu_shared::*;

enum Region<'a> {
    Weights(&'a [u8]),
    Owned { kind: RegionKind, buffer: RegionBuffer },
}
impl Region<'_> {
    fn kind(&self) -> RegionKind {
        match self {
            Region::Weights(_) => RegionKind::Weights,
            Region::Owned { kind, .. } => *kind,
        }
    }

    fn len(&self) -> usize {
        match self {
            Region::Weights(weights) => weights.len(),
            Region::Owned { buffer, .. } => buffer.len(),
        }
    }

    fn as_slice(&self) -> &[u8] {
        match self {
            Region::Weights(weights) => weights,
            Region::Owned { buffer, .. } => buffer.as_slice(),
        }
    }
}

pub struct RegionTable<'a> {
    // Present (size > 0) regions only; absent slots are None.
    regions: [Option<Region<'a>>; MAX_REGIONS],
}

impl<'a> RegionTable<'a> {
    /// Builds the table for one model: |weights| is bound at
    /// |weight_region| and storage is allocated for every entry of |decls|
    /// with a non-zero size.
    pub fn new(
        weights: &'a [u8],
        weight_region: RegionIndex,
        decls: &[RegionDecl],
    ) -> Result<Self, ModelError> {
        if weight_region >= MAX_REGIONS {
            error!("Weights region {} out of range", weight_region);
            return Err(ModelError::RegionIndexOutOfRange);
        }
        if !weights.is_empty() && !is_aligned(weights.as_ptr() as usize, REGION_ALIGNMENT) {
            error!("Weights @ {:#x} not {}-byte aligned", weights.as_ptr() as usize, REGION_ALIGNMENT);
            return Err(ModelError::MisalignedWeights);
        }

        // NB: The repeat operand requires a const item.
        const INIT_NONE: Option<Region<'static>> = None;
        let mut regions: [Option<Region<'a>>; MAX_REGIONS] = [INIT_NONE; MAX_REGIONS];
        let mut declared = [false; MAX_REGIONS];

        declared[weight_region] = true;
        if !weights.is_empty() {
            regions[weight_region] = Some(Region::Weights(weights));
        }
        for decl in decls {
            if decl.index >= MAX_REGIONS {
                error!("Region {} out of range", decl.index);
                return Err(ModelError::RegionIndexOutOfRange);
            }
            if decl.kind == RegionKind::Weights || decl.index == weight_region {
                error!("Region {} ({}) conflicts with weights", decl.index, decl.kind);
                return Err(ModelError::WeightsRegionConflict);
            }
            if declared[decl.index] {
                error!("Region {} declared twice", decl.index);
                return Err(ModelError::DuplicateRegion);
            }
            declared[decl.index] = true;
            if decl.size.checked_add(REGION_ALIGNMENT - 1).is_none() {
                error!("Region {} size {:#x} too large", decl.index, decl.size);
                return Err(ModelError::RegionTooLarge);
            }
            if decl.size != 0 {
                regions[decl.index] = Some(Region::Owned {
                    kind: decl.kind,
                    buffer: RegionBuffer::zeroed(decl.size),
                });
            }
        }
        Ok(Self { regions })
    }

    /// Builds the table from the region sizes a manifest implies.
    pub fn from_manifest(weights: &'a [u8], manifest: &ModelManifest) -> Result<Self, ModelError> {
        Self::new(weights, manifest.weight_region, &manifest.region_decls()?)
    }

    fn get(&self, region: RegionIndex) -> Option<&Region<'a>> {
        self.regions.get(region).and_then(Option::as_ref)
    }

    /// Base address of |region|, or None (null) if the region is absent.
    pub fn base(&self, region: RegionIndex) -> Option<NonNull<u8>> {
        self.get(region)
            .and_then(|r| NonNull::new(r.as_slice().as_ptr() as *mut u8))
    }

    /// Size of |region| in bytes; 0 if the region is absent.
    pub fn size(&self, region: RegionIndex) -> usize { self.get(region).map_or(0, Region::len) }

    pub fn kind(&self, region: RegionIndex) -> Option<RegionKind> {
        self.get(region).map(Region::kind)
    }

    /// Present regions as (index, kind, size), in index order.
    pub fn present(&self) -> impl Iterator<Item = (RegionIndex, RegionKind, usize)> + '_ {
        self.regions
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|r| (index, r.kind(), r.len())))
    }

    /// Fills the driver's base/size tables, one slot per region index.
    /// Owned regions are bound through a mutable pointer: the accelerator
    /// writes them while the returned table is in use.
    pub fn bind(&mut self) -> BoundRegions {
        let mut bound = BoundRegions::new();
        for (index, slot) in self.regions.iter_mut().enumerate() {
            let (base, size) = match slot {
                Some(Region::Weights(weights)) => (weights.as_ptr() as usize, weights.len()),
                Some(Region::Owned { buffer, .. }) => (buffer.as_mut_ptr() as usize, buffer.len()),
                None => continue,
            };
            bound.bind(index, base as u64, size);
        }
        for index in 0..MAX_REGIONS {
            trace!("BIND r{} {:#x} {}", index, bound.base_addr[index], bound.base_size[index]);
        }
        bound
    }

    /// Read-only view of |region|'s bytes.
    pub fn region(&self, region: RegionIndex) -> Option<&[u8]> { self.get(region).map(Region::as_slice) }

    /// Writable view of an owned region; None for weights or absent regions.
    pub fn region_mut(&mut self, region: RegionIndex) -> Option<&mut [u8]> {
        match self.regions.get_mut(region)?.as_mut()? {
            Region::Owned { buffer, .. } => Some(buffer.as_mut_slice()),
            Region::Weights(_) => None,
        }
    }

    /// Verifies |desc| names a present region and fits inside it.
    pub fn check_descriptor(&self, desc: &TensorDescriptor) -> Result<(), ModelError> {
        let region = self.get(desc.region).ok_or(ModelError::TensorRegionAbsent)?;
        if !desc.fits(region.len()) {
            return Err(ModelError::TensorOutOfBounds);
        }
        Ok(())
    }

    pub fn tensor(&self, desc: &TensorDescriptor) -> Result<&[u8], ModelError> {
        self.check_descriptor(desc)?;
        let region = self.get(desc.region).ok_or(ModelError::TensorRegionAbsent)?;
        Ok(&region.as_slice()[desc.range()])
    }

    pub fn tensor_mut(&mut self, desc: &TensorDescriptor) -> Result<&mut [u8], ModelError> {
        self.check_descriptor(desc)?;
        let bytes = self.region_mut(desc.region).ok_or(ModelError::ReadOnlyRegion)?;
        Ok(&mut bytes[desc.range()])
    }

    /// Re-zeroes every owned region.
    pub fn clear_working(&mut self) {
        for slot in self.regions.iter_mut().flatten() {
            if let Region::Owned { buffer, .. } = slot {
                buffer.clear();
            }
        }
    }

    pub fn debug_state(&self) {
        for (index, kind, size) in self.present() {
            let base = self.base(index).map_or(0, |p| p.as_ptr() as usize);
            info!(target: "", "  r{} {:<12} {:>8} @ {:#x}", index, kind, size, base);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_hex::assert_eq_hex;

    #[repr(C, align(32))]
    struct Weights([u8; 512]);
    static WEIGHTS: Weights = Weights([0x5a; 512]);

    fn addr(p: Option<NonNull<u8>>) -> usize { p.map_or(0, |p| p.as_ptr() as usize) }

    fn table() -> RegionTable<'static> {
        RegionTable::new(
            &WEIGHTS.0,
            0,
            &[RegionDecl::working(1, 1024), RegionDecl::fast_working(2, 0)],
        )
        .unwrap()
    }

    #[test]
    fn declared_regions_resolve() {
        let table = table();
        assert_eq_hex!(addr(table.base(0)), WEIGHTS.0.as_ptr() as usize);
        assert_eq!(table.size(0), 512);
        assert_eq!(table.kind(0), Some(RegionKind::Weights));

        assert!(table.base(1).is_some());
        assert!(is_aligned(addr(table.base(1)), REGION_ALIGNMENT));
        assert_eq!(table.size(1), 1024);
        assert_eq!(table.kind(1), Some(RegionKind::Working));
        assert!(table.region(1).unwrap().iter().all(|b| *b == 0));
    }

    #[test]
    fn absent_regions_are_null() {
        let table = table();
        // 2 is declared with size 0; the rest are undeclared.
        for region in 2..MAX_REGIONS {
            assert!(table.base(region).is_none());
            assert_eq!(table.size(region), 0);
            assert_eq!(table.kind(region), None);
        }
        assert!(table.base(MAX_REGIONS).is_none());
        assert_eq!(table.size(MAX_REGIONS), 0);
        assert!(table.base(usize::MAX).is_none());
    }

    #[test]
    fn lookups_are_stable() {
        let table = table();
        assert_eq!(table.base(1), table.base(1));
        assert_eq!(table.size(1), table.size(1));
    }

    #[test]
    fn bind_matches_lookups() {
        let mut table = table();
        let bound = table.bind();
        for region in 0..MAX_REGIONS {
            let (base, size) = bound.slot(region);
            assert_eq_hex!(base as usize, addr(table.base(region)));
            assert_eq!(size, table.size(region));
        }
        assert_eq!(bound.bound_count(), 2);
    }

    #[test]
    fn weights_need_not_be_region_zero() {
        let mut table = RegionTable::new(&WEIGHTS.0, 3, &[RegionDecl::working(0, 64)]).unwrap();
        assert_eq!(table.kind(3), Some(RegionKind::Weights));
        assert_eq!(table.kind(0), Some(RegionKind::Working));
        let bound = table.bind();
        assert_eq!(bound.slot(3), (WEIGHTS.0.as_ptr() as u64, 512));
        assert_eq!(bound.base_size[0], 64);
    }

    #[test]
    fn empty_weights_are_absent() {
        let table = RegionTable::new(&[], 0, &[RegionDecl::working(1, 32)]).unwrap();
        assert!(table.base(0).is_none());
        assert_eq!(table.size(0), 0);
    }

    #[test]
    fn rejects_bad_declarations() {
        assert_eq!(
            RegionTable::new(&WEIGHTS.0, MAX_REGIONS, &[]).err(),
            Some(ModelError::RegionIndexOutOfRange)
        );
        assert_eq!(
            RegionTable::new(&WEIGHTS.0, 0, &[RegionDecl::working(8, 16)]).err(),
            Some(ModelError::RegionIndexOutOfRange)
        );
        assert_eq!(
            RegionTable::new(&WEIGHTS.0, 0, &[RegionDecl::working(0, 16)]).err(),
            Some(ModelError::WeightsRegionConflict)
        );
        assert_eq!(
            RegionTable::new(
                &WEIGHTS.0,
                0,
                &[RegionDecl {
                    index: 4,
                    kind: RegionKind::Weights,
                    size: 16
                }]
            )
            .err(),
            Some(ModelError::WeightsRegionConflict)
        );
        assert_eq!(
            RegionTable::new(
                &WEIGHTS.0,
                0,
                &[RegionDecl::working(1, 16), RegionDecl::fast_working(1, 0)]
            )
            .err(),
            Some(ModelError::DuplicateRegion)
        );
    }

    #[test]
    fn rejects_unallocatable_sizes() {
        for size in [usize::MAX, usize::MAX - (REGION_ALIGNMENT - 2)] {
            assert_eq!(
                RegionTable::new(&WEIGHTS.0, 0, &[RegionDecl::working(1, size)]).err(),
                Some(ModelError::RegionTooLarge)
            );
        }
    }

    #[test]
    fn rejects_misaligned_weights() {
        assert_eq!(
            RegionTable::new(&WEIGHTS.0[1..], 0, &[]).err(),
            Some(ModelError::MisalignedWeights)
        );
    }

    #[test]
    fn tensor_access() {
        let mut table = table();
        let input = TensorDescriptor::new(1, 100, 16);
        table.tensor_mut(&input).unwrap().copy_from_slice(&[7; 16]);
        assert_eq!(table.tensor(&input).unwrap(), &[7; 16]);
        assert_eq!(table.region(1).unwrap()[99], 0);
        assert_eq!(table.region(1).unwrap()[100], 7);
        assert_eq!(table.region(1).unwrap()[116], 0);

        assert_eq!(table.tensor(&TensorDescriptor::new(0, 500, 12)).unwrap(), &[0x5a; 12]);
        assert_eq!(
            table.tensor_mut(&TensorDescriptor::new(0, 0, 1)).err(),
            Some(ModelError::ReadOnlyRegion)
        );
        assert_eq!(
            table.check_descriptor(&TensorDescriptor::new(1, 1000, 25)),
            Err(ModelError::TensorOutOfBounds)
        );
        assert_eq!(
            table.check_descriptor(&TensorDescriptor::new(2, 0, 1)),
            Err(ModelError::TensorRegionAbsent)
        );
        assert!(table.check_descriptor(&TensorDescriptor::new(1, 1000, 24)).is_ok());
    }

    #[test]
    fn clear_working_rezeroes_owned_regions() {
        let mut table = table();
        table.region_mut(1).unwrap().fill(0xff);
        assert!(table.region_mut(0).is_none());
        table.clear_working();
        assert!(table.region(1).unwrap().iter().all(|b| *b == 0));
        assert!(table.region(0).unwrap().iter().all(|b| *b == 0x5a));
    }

    #[test]
    fn present_lists_backed_regions() {
        let table = table();
        let present: alloc::vec::Vec<_> = table.present().collect();
        assert_eq!(
            present,
            [(0, RegionKind::Weights, 512), (1, RegionKind::Working, 1024)]
        );
    }

    #[test]
    fn manifest_sizing() {
        use npu_interface::{ScratchLayout, TensorLayout};
        let manifest = ModelManifest {
            name: "ic".into(),
            weight_region: 0,
            scratch: Some(ScratchLayout {
                region: 1,
                size: 75072,
            }),
            scratch_fast: None,
            inputs: alloc::vec![TensorLayout {
                shape: alloc::vec![1, 32, 32, 3],
                elem_size: 1,
                region: 1,
                offset: 0,
            }],
            outputs: alloc::vec![],
            variables: alloc::vec![],
        };
        let table = RegionTable::from_manifest(&WEIGHTS.0, &manifest).unwrap();
        assert_eq!(table.size(1), 75072);
        assert_eq!(table.kind(1), Some(RegionKind::Working));
        assert_eq!(table.size(0), 512);
    }
}
