//! Adaptive per-chunk voxel storage.
//!
//! A chunk starts as a single uniform fill, escalates to an 8-bit palette once
//! a second voxel type appears, and escalates to a dense array when the
//! palette runs out of addressable entries. Escalation only moves forward;
//! [`VoxelStorage::fill`] is the one way back to a uniform fill.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Compact identifier stored in every voxel cell. `0` is empty space.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Voxel(pub u16);

impl Voxel {
    /// The empty (air) voxel.
    pub const EMPTY: Voxel = Voxel(0);

    /// Returns `true` for the empty voxel.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Number of entries an 8-bit palette index can address.
pub const PALETTE_CAPACITY: usize = 256;

/// Palette slot reserved for the empty voxel.
const EMPTY_SLOT: u8 = 0;

/// Which representation a [`VoxelStorage`] currently uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum StorageKind {
    /// Whole chunk is one voxel; no allocation.
    Uniform,
    /// One byte per cell indexing a palette of up to 256 entries.
    Palette8,
    /// One [`Voxel`] per cell.
    Array,
}

/// A palette slot and the number of cells currently pointing at it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaletteEntry {
    /// Voxel this slot resolves to.
    pub voxel: Voxel,
    /// Cells referencing this slot. Zero means the slot is reclaimable.
    pub uses: u32,
}

#[derive(Clone, Debug)]
enum Repr {
    Uniform(Voxel),
    Palette {
        indices: Box<[u8]>,
        entries: Vec<PaletteEntry>,
    },
    Array(Box<[Voxel]>),
}

/// Voxel container for one chunk, always in the most compact form that has
/// been sufficient so far.
///
/// Indices are linear cell indices in `0..len()`. Reads past the end return
/// [`Voxel::EMPTY`] and writes past the end are ignored.
#[derive(Debug)]
pub struct VoxelStorage {
    volume: usize,
    repr: Repr,
}

impl VoxelStorage {
    /// Creates storage for `volume` cells, uniformly empty.
    pub fn new(volume: usize) -> Self {
        Self::filled(volume, Voxel::EMPTY)
    }

    /// Creates storage for `volume` cells, uniformly filled with `voxel`.
    pub fn filled(volume: usize, voxel: Voxel) -> Self {
        Self {
            volume,
            repr: Repr::Uniform(voxel),
        }
    }

    /// Number of cells addressed by this storage.
    pub fn len(&self) -> usize {
        self.volume
    }

    /// Returns `true` if the storage addresses no cells.
    pub fn is_empty(&self) -> bool {
        self.volume == 0
    }

    /// Current representation.
    pub fn kind(&self) -> StorageKind {
        match self.repr {
            Repr::Uniform(_) => StorageKind::Uniform,
            Repr::Palette { .. } => StorageKind::Palette8,
            Repr::Array(_) => StorageKind::Array,
        }
    }

    /// Returns the fill voxel if the storage is uniform.
    pub fn uniform_voxel(&self) -> Option<Voxel> {
        match self.repr {
            Repr::Uniform(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the voxel at `index`, or [`Voxel::EMPTY`] when out of range.
    pub fn get(&self, index: usize) -> Voxel {
        if index >= self.volume {
            return Voxel::EMPTY;
        }
        match &self.repr {
            Repr::Uniform(v) => *v,
            Repr::Palette { indices, entries } => {
                let slot = indices[index] as usize;
                match entries.get(slot) {
                    Some(entry) => entry.voxel,
                    None => {
                        tracing::warn!(
                            "palette index {slot} at cell {index} exceeds {} entries, reading empty",
                            entries.len()
                        );
                        Voxel::EMPTY
                    }
                }
            }
            Repr::Array(cells) => cells[index],
        }
    }

    /// Writes `voxel` at `index`. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, voxel: Voxel) {
        if index >= self.volume {
            tracing::debug!("VoxelStorage::set out of range: {index} >= {}", self.volume);
            return;
        }

        if let Repr::Uniform(fill) = self.repr {
            if fill == voxel {
                return;
            }
            self.escalate();
        }

        if let Repr::Palette { indices, entries } = &mut self.repr {
            match palette_set(indices, entries, index, voxel) {
                PaletteWrite::Done => return,
                PaletteWrite::Full => self.escalate(),
            }
        }

        if let Repr::Array(cells) = &mut self.repr {
            cells[index] = voxel;
        }
    }

    /// Resets every cell to `voxel`, releasing any allocation.
    pub fn fill(&mut self, voxel: Voxel) {
        self.repr = Repr::Uniform(voxel);
    }

    /// Distinct voxels currently present, sorted ascending.
    ///
    /// Palette storage answers from live entries; array storage scans.
    pub fn distinct_voxels(&self) -> Vec<Voxel> {
        let mut out: Vec<Voxel> = match &self.repr {
            Repr::Uniform(v) => return vec![*v],
            Repr::Palette { entries, .. } => {
                let mut seen = FxHashSet::default();
                entries
                    .iter()
                    .filter(|e| e.uses > 0 && seen.insert(e.voxel))
                    .map(|e| e.voxel)
                    .collect()
            }
            Repr::Array(cells) => cells
                .iter()
                .copied()
                .collect::<FxHashSet<_>>()
                .into_iter()
                .collect(),
        };
        out.sort_unstable();
        out
    }

    /// Number of palette slots, including reclaimable ones. Zero when not palettized.
    pub fn palette_len(&self) -> usize {
        match &self.repr {
            Repr::Palette { entries, .. } => entries.len(),
            _ => 0,
        }
    }

    /// Approximate heap memory owned by this storage, in bytes.
    pub fn heap_bytes(&self) -> usize {
        match &self.repr {
            Repr::Uniform(_) => 0,
            Repr::Palette { indices, entries } => {
                indices.len() + entries.capacity() * std::mem::size_of::<PaletteEntry>()
            }
            Repr::Array(cells) => std::mem::size_of_val(&cells[..]),
        }
    }

    /// Moves to the next representation tier, preserving every cell.
    fn escalate(&mut self) {
        let next = match &self.repr {
            Repr::Uniform(fill) => {
                let mut entries = vec![PaletteEntry {
                    voxel: Voxel::EMPTY,
                    uses: 0,
                }];
                let seed = if fill.is_empty() {
                    entries[0].uses = self.volume as u32;
                    EMPTY_SLOT
                } else {
                    entries.push(PaletteEntry {
                        voxel: *fill,
                        uses: self.volume as u32,
                    });
                    1
                };
                tracing::trace!("storage escalated: uniform -> palette8");
                Repr::Palette {
                    indices: vec![seed; self.volume].into_boxed_slice(),
                    entries,
                }
            }
            Repr::Palette { indices, entries } => {
                tracing::trace!("storage escalated: palette8 -> array");
                Repr::Array(
                    indices
                        .iter()
                        .map(|&slot| {
                            entries
                                .get(slot as usize)
                                .map_or(Voxel::EMPTY, |e| e.voxel)
                        })
                        .collect(),
                )
            }
            Repr::Array(_) => return,
        };
        self.repr = next;
    }
}

enum PaletteWrite {
    Done,
    Full,
}

/// Palette write: reuse the voxel's live slot, else a reclaimable slot, else
/// append. Slots whose use count drops to zero stay in place for later reuse.
fn palette_set(
    indices: &mut [u8],
    entries: &mut Vec<PaletteEntry>,
    index: usize,
    voxel: Voxel,
) -> PaletteWrite {
    let old = indices[index] as usize;
    if entries.get(old).is_some_and(|e| e.voxel == voxel) {
        return PaletteWrite::Done;
    }
    if let Some(entry) = entries.get_mut(old) {
        entry.uses = entry.uses.saturating_sub(1);
    }

    let slot = if voxel.is_empty() {
        EMPTY_SLOT as usize
    } else if let Some(i) = find_slot(entries, |e| e.voxel == voxel && e.uses > 0) {
        i
    } else if let Some(i) = find_slot(entries, |e| e.uses == 0) {
        i
    } else if entries.len() < PALETTE_CAPACITY {
        entries.push(PaletteEntry { voxel, uses: 0 });
        entries.len() - 1
    } else {
        if let Some(entry) = entries.get_mut(old) {
            entry.uses += 1;
        }
        return PaletteWrite::Full;
    };

    let entry = &mut entries[slot];
    entry.voxel = voxel;
    entry.uses += 1;
    indices[index] = slot as u8;
    PaletteWrite::Done
}

/// First non-reserved slot matching `pred`.
fn find_slot(entries: &[PaletteEntry], pred: impl Fn(&PaletteEntry) -> bool) -> Option<usize> {
    entries
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, e)| pred(e))
        .map(|(i, _)| i)
}

impl Clone for VoxelStorage {
    fn clone(&self) -> Self {
        Self {
            volume: self.volume,
            repr: self.repr.clone(),
        }
    }

    /// Deep copy that reuses this storage's buffers when the representations match.
    fn clone_from(&mut self, source: &Self) {
        self.volume = source.volume;
        match (&mut self.repr, &source.repr) {
            (
                Repr::Palette { indices, entries },
                Repr::Palette {
                    indices: src_indices,
                    entries: src_entries,
                },
            ) if indices.len() == src_indices.len() => {
                indices.copy_from_slice(src_indices);
                entries.clone_from(src_entries);
            }
            (Repr::Array(cells), Repr::Array(src)) if cells.len() == src.len() => {
                cells.copy_from_slice(src);
            }
            (repr, src) => *repr = src.clone(),
        }
    }
}

impl Default for VoxelStorage {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOLUME: usize = 16 * 16 * 16;

    #[test]
    fn test_new_storage_is_uniform_empty() {
        let storage = VoxelStorage::new(VOLUME);
        assert_eq!(storage.kind(), StorageKind::Uniform);
        assert_eq!(storage.get(0), Voxel::EMPTY);
        assert_eq!(storage.get(VOLUME - 1), Voxel::EMPTY);
        assert_eq!(storage.heap_bytes(), 0);
    }

    #[test]
    fn test_set_then_get_roundtrip_across_tiers() {
        let mut storage = VoxelStorage::new(VOLUME);
        // Enough distinct voxels to pass through every tier.
        for i in 0..VOLUME {
            let v = Voxel((i % 300) as u16 + 1);
            storage.set(i, v);
            assert_eq!(storage.get(i), v, "readback mismatch at {i}");
        }
        assert_eq!(storage.kind(), StorageKind::Array);
        for i in 0..VOLUME {
            assert_eq!(storage.get(i), Voxel((i % 300) as u16 + 1));
        }
    }

    #[test]
    fn test_uniform_set_same_value_is_noop() {
        let mut storage = VoxelStorage::filled(VOLUME, Voxel(3));
        storage.set(10, Voxel(3));
        assert_eq!(storage.kind(), StorageKind::Uniform);
    }

    #[test]
    fn test_uniform_non_empty_seeds_palette_entry_one() {
        let mut storage = VoxelStorage::filled(VOLUME, Voxel(7));
        storage.set(5, Voxel(9));
        assert_eq!(storage.kind(), StorageKind::Palette8);
        assert_eq!(storage.get(5), Voxel(9));
        assert_eq!(storage.get(4), Voxel(7));
        assert_eq!(storage.distinct_voxels(), vec![Voxel(7), Voxel(9)]);
    }

    #[test]
    fn test_uniform_empty_seeds_reserved_slot() {
        let mut storage = VoxelStorage::new(VOLUME);
        storage.set(0, Voxel(2));
        assert_eq!(storage.kind(), StorageKind::Palette8);
        // Slot 0 is empty, slot 1 holds the new voxel.
        assert_eq!(storage.palette_len(), 2);
        assert_eq!(storage.get(1), Voxel::EMPTY);
    }

    #[test]
    fn test_escalation_is_monotonic() {
        let mut storage = VoxelStorage::new(VOLUME);
        storage.set(0, Voxel(1));
        assert_eq!(storage.kind(), StorageKind::Palette8);

        // Writing every cell back to empty must not return to uniform.
        storage.set(0, Voxel::EMPTY);
        assert_eq!(storage.kind(), StorageKind::Palette8);
        assert_eq!(storage.distinct_voxels(), vec![Voxel::EMPTY]);

        for i in 0..PALETTE_CAPACITY + 1 {
            storage.set(i, Voxel(i as u16 + 1));
        }
        assert_eq!(storage.kind(), StorageKind::Array);
        for i in 0..VOLUME {
            storage.set(i, Voxel(1));
        }
        assert_eq!(storage.kind(), StorageKind::Array);

        storage.fill(Voxel(4));
        assert_eq!(storage.kind(), StorageKind::Uniform);
        assert_eq!(storage.get(100), Voxel(4));
    }

    #[test]
    fn test_set_is_idempotent() {
        let mut once = VoxelStorage::new(VOLUME);
        once.set(12, Voxel(5));
        let mut twice = VoxelStorage::new(VOLUME);
        twice.set(12, Voxel(5));
        twice.set(12, Voxel(5));

        assert_eq!(once.kind(), twice.kind());
        assert_eq!(once.palette_len(), twice.palette_len());
        assert_eq!(once.distinct_voxels(), twice.distinct_voxels());
    }

    #[test]
    fn test_zero_use_entries_are_reclaimed() {
        let mut storage = VoxelStorage::new(VOLUME);
        storage.set(0, Voxel(1));
        storage.set(1, Voxel(2));
        assert_eq!(storage.palette_len(), 3);

        // Voxel 1 leaves; its slot stays but becomes reclaimable.
        storage.set(0, Voxel::EMPTY);
        assert_eq!(storage.palette_len(), 3);
        storage.set(5, Voxel(3));
        assert_eq!(storage.palette_len(), 3, "slot of voxel 1 should be reused");
        assert_eq!(storage.get(5), Voxel(3));
        assert_eq!(storage.get(1), Voxel(2));
    }

    #[test]
    fn test_replacing_unique_cell_reuses_its_slot() {
        let mut storage = VoxelStorage::new(VOLUME);
        storage.set(0, Voxel(1));
        storage.set(0, Voxel(2));
        assert_eq!(storage.palette_len(), 2);
        assert_eq!(storage.get(0), Voxel(2));
    }

    #[test]
    fn test_palette_overflow_escalates_to_array() {
        let mut storage = VoxelStorage::new(VOLUME);
        // 255 non-empty voxels plus the reserved empty slot fill the palette.
        for i in 0..PALETTE_CAPACITY - 1 {
            storage.set(i, Voxel(i as u16 + 1));
        }
        assert_eq!(storage.kind(), StorageKind::Palette8);
        assert_eq!(storage.palette_len(), PALETTE_CAPACITY);

        storage.set(PALETTE_CAPACITY, Voxel(1000));
        assert_eq!(storage.kind(), StorageKind::Array);
        for i in 0..PALETTE_CAPACITY - 1 {
            assert_eq!(storage.get(i), Voxel(i as u16 + 1));
        }
        assert_eq!(storage.get(PALETTE_CAPACITY), Voxel(1000));
        assert_eq!(storage.get(PALETTE_CAPACITY + 1), Voxel::EMPTY);
    }

    #[test]
    fn test_out_of_range_access_is_silent() {
        let mut storage = VoxelStorage::filled(VOLUME, Voxel(2));
        storage.set(VOLUME, Voxel(9));
        assert_eq!(storage.kind(), StorageKind::Uniform);
        assert_eq!(storage.get(VOLUME), Voxel::EMPTY);
        assert_eq!(storage.get(usize::MAX), Voxel::EMPTY);
    }

    #[test]
    fn test_clone_preserves_representation() {
        let mut palette = VoxelStorage::new(VOLUME);
        palette.set(3, Voxel(8));
        let copy = palette.clone();
        assert_eq!(copy.kind(), StorageKind::Palette8);
        assert_eq!(copy.get(3), Voxel(8));

        let uniform = VoxelStorage::filled(VOLUME, Voxel(6));
        let copy = uniform.clone();
        assert_eq!(copy.kind(), StorageKind::Uniform);
        assert_eq!(copy.heap_bytes(), 0);
    }

    #[test]
    fn test_clone_is_deep() {
        let mut original = VoxelStorage::new(VOLUME);
        original.set(3, Voxel(8));
        let copy = original.clone();
        original.set(3, Voxel(9));
        assert_eq!(copy.get(3), Voxel(8));
    }

    #[test]
    fn test_clone_from_reuses_matching_buffers() {
        let mut src = VoxelStorage::new(VOLUME);
        src.set(1, Voxel(4));
        let mut dst = VoxelStorage::new(VOLUME);
        dst.set(2, Voxel(5));

        dst.clone_from(&src);
        assert_eq!(dst.get(1), Voxel(4));
        assert_eq!(dst.get(2), Voxel::EMPTY);

        let uniform = VoxelStorage::filled(VOLUME, Voxel(1));
        dst.clone_from(&uniform);
        assert_eq!(dst.kind(), StorageKind::Uniform);
    }

    #[test]
    fn test_distinct_voxels_array_scan() {
        let mut storage = VoxelStorage::new(VOLUME);
        for i in 0..300 {
            storage.set(i, Voxel(i as u16 % 3 + 1));
        }
        for i in 300..600 {
            storage.set(i, Voxel(i as u16));
        }
        assert_eq!(storage.kind(), StorageKind::Array);
        let distinct = storage.distinct_voxels();
        assert!(distinct.contains(&Voxel::EMPTY));
        assert!(distinct.contains(&Voxel(1)));
        assert!(distinct.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_heap_bytes_by_tier() {
        let mut storage = VoxelStorage::new(VOLUME);
        assert_eq!(storage.heap_bytes(), 0);
        storage.set(0, Voxel(1));
        assert!(storage.heap_bytes() >= VOLUME);
        for i in 0..PALETTE_CAPACITY + 1 {
            storage.set(i, Voxel(i as u16 + 1));
        }
        assert_eq!(storage.heap_bytes(), VOLUME * 2);
    }
}
