//! Cache hierarchy decoding
//!
//! Three encodings are supported:
//! - the deterministic sub-leaf format (Intel leaf 4, AMD leaf 0x8000001D)
//! - Intel legacy one-byte descriptors (leaf 2)
//! - AMD legacy L1/L2/L3 leaves (0x80000005 and 0x80000006)

use tracing::{debug, trace, warn};

use crate::identity::{CacheInfo, CacheLevels, CacheSlot};
use crate::raw::{CpuidRegs, RawSignature};

/// Cache type field of a deterministic sub-leaf
const TYPE_DATA: u32 = 1;
const TYPE_INSTRUCTION: u32 = 2;
const TYPE_UNIFIED: u32 = 3;

/// One decoded deterministic sub-leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeterministicCache {
    pub level: u32,
    pub cache_type: u32,
    pub ways: u32,
    pub partitions: u32,
    pub line_size: u32,
    pub sets: u32,
}

impl DeterministicCache {
    /// Decode a sub-leaf; `None` ends the enumeration (type or level 0)
    pub fn decode(regs: &CpuidRegs) -> Option<Self> {
        let cache_type = regs.eax & 0x1f;
        let level = (regs.eax >> 5) & 0x7;
        if cache_type == 0 || level == 0 {
            return None;
        }
        Some(Self {
            level,
            cache_type,
            ways: ((regs.ebx >> 22) & 0x3ff) + 1,
            partitions: ((regs.ebx >> 12) & 0x3ff) + 1,
            line_size: (regs.ebx & 0xfff) + 1,
            sets: regs.ecx.wrapping_add(1),
        })
    }

    pub fn size_kb(&self) -> u64 {
        u64::from(self.ways)
            * u64::from(self.partitions)
            * u64::from(self.line_size)
            * u64::from(self.sets)
            / 1024
    }

    pub fn slot(&self) -> Option<CacheSlot> {
        match (self.level, self.cache_type) {
            (1, TYPE_DATA) => Some(CacheSlot::L1Data),
            (1, TYPE_INSTRUCTION) => Some(CacheSlot::L1Instruction),
            (2, TYPE_UNIFIED) => Some(CacheSlot::L2),
            (3, TYPE_UNIFIED) => Some(CacheSlot::L3),
            (4, TYPE_UNIFIED) => Some(CacheSlot::L4),
            _ => None,
        }
    }
}

/// Decode a run of deterministic sub-leaves into `caches`.
///
/// Stops at the first terminator or unknown slot. Level/type combinations
/// without a slot are skipped with a warning.
pub fn decode_deterministic(subleaves: &[Option<CpuidRegs>], caches: &mut CacheLevels) {
    for (index, regs) in subleaves.iter().enumerate() {
        let Some(regs) = regs else { break };
        let Some(cache) = DeterministicCache::decode(regs) else { break };

        match cache.slot() {
            Some(slot) => {
                let size = i32::try_from(cache.size_kb()).unwrap_or(i32::MAX);
                trace!(index, ?slot, size_kb = size, "Deterministic cache entry");
                *caches.get_mut(slot) =
                    CacheInfo::new(size, cache.ways as i32, cache.line_size as i32);
            }
            None => {
                warn!(
                    level = cache.level,
                    cache_type = cache.cache_type,
                    "Unknown level/type combination in deterministic cache leaf"
                );
            }
        }
    }
}

/// Legacy leaf-2 descriptor table: (descriptor, slot, size KB, ways, line size)
const DESCRIPTORS: &[(u8, CacheSlot, i32, i32, i32)] = &[
    (0x06, CacheSlot::L1Instruction, 8, 4, 32),
    (0x08, CacheSlot::L1Instruction, 16, 4, 32),
    (0x0A, CacheSlot::L1Data, 8, 2, 32),
    (0x0C, CacheSlot::L1Data, 16, 4, 32),
    (0x22, CacheSlot::L3, 512, 4, 64),
    (0x23, CacheSlot::L3, 1024, 8, 64),
    (0x25, CacheSlot::L3, 2048, 8, 64),
    (0x29, CacheSlot::L3, 4096, 8, 64),
    (0x2C, CacheSlot::L1Data, 32, 8, 64),
    (0x30, CacheSlot::L1Instruction, 32, 8, 64),
    (0x39, CacheSlot::L2, 128, 4, 64),
    (0x3A, CacheSlot::L2, 192, 6, 64),
    (0x3B, CacheSlot::L2, 128, 2, 64),
    (0x3C, CacheSlot::L2, 256, 4, 64),
    (0x3D, CacheSlot::L2, 384, 6, 64),
    (0x3E, CacheSlot::L2, 512, 4, 64),
    (0x41, CacheSlot::L2, 128, 4, 32),
    (0x42, CacheSlot::L2, 256, 4, 32),
    (0x43, CacheSlot::L2, 512, 4, 32),
    (0x44, CacheSlot::L2, 1024, 4, 32),
    (0x45, CacheSlot::L2, 2048, 4, 32),
    (0x46, CacheSlot::L3, 4096, 4, 64),
    (0x47, CacheSlot::L3, 8192, 8, 64),
    (0x4A, CacheSlot::L3, 6144, 12, 64),
    (0x4B, CacheSlot::L3, 8192, 16, 64),
    (0x4C, CacheSlot::L3, 12288, 12, 64),
    (0x4D, CacheSlot::L3, 16384, 16, 64),
    (0x4E, CacheSlot::L2, 6144, 24, 64),
    (0x60, CacheSlot::L1Data, 16, 8, 64),
    (0x66, CacheSlot::L1Data, 8, 4, 64),
    (0x67, CacheSlot::L1Data, 16, 4, 64),
    (0x68, CacheSlot::L1Data, 32, 4, 64),
    (0x70, CacheSlot::L1Instruction, 12, 8, -1),
    (0x71, CacheSlot::L1Instruction, 16, 8, -1),
    (0x72, CacheSlot::L1Instruction, 32, 8, -1),
    (0x73, CacheSlot::L1Instruction, 64, 8, -1),
    (0x78, CacheSlot::L2, 1024, 4, 64),
    (0x79, CacheSlot::L2, 128, 8, 64),
    (0x7A, CacheSlot::L2, 256, 8, 64),
    (0x7B, CacheSlot::L2, 512, 8, 64),
    (0x7C, CacheSlot::L2, 1024, 8, 64),
    (0x7D, CacheSlot::L2, 2048, 8, 64),
    (0x7F, CacheSlot::L2, 512, 2, 64),
    (0x82, CacheSlot::L2, 256, 8, 32),
    (0x83, CacheSlot::L2, 512, 8, 32),
    (0x84, CacheSlot::L2, 1024, 8, 32),
    (0x85, CacheSlot::L2, 2048, 8, 32),
    (0x86, CacheSlot::L2, 512, 4, 64),
    (0x87, CacheSlot::L2, 1024, 8, 64),
];

/// Descriptor bytes present in leaf 2
fn descriptor_bytes(leaf2: &CpuidRegs) -> [bool; 256] {
    let mut present = [false; 256];
    for reg in leaf2.to_array() {
        // Bit 31 set means the register carries no descriptors
        if reg & 0x8000_0000 != 0 {
            continue;
        }
        for byte in reg.to_le_bytes() {
            present[usize::from(byte)] = true;
        }
    }
    present
}

/// Decode Intel leaf-2 descriptors into `caches`
pub fn decode_legacy_descriptors(
    leaf2: &CpuidRegs,
    family: i32,
    model: i32,
    caches: &mut CacheLevels,
) {
    let present = descriptor_bytes(leaf2);

    for (code, slot, size, ways, line) in DESCRIPTORS {
        if present[usize::from(*code)] {
            *caches.get_mut(*slot) = CacheInfo::new(*size, *ways, *line);
        }
    }

    // 4 MB, 16-way, 64-byte lines; L3 only on Xeon MP (family 0xF model 6)
    if present[0x49] {
        let slot = if family == 0xf && model == 0x6 {
            CacheSlot::L3
        } else {
            CacheSlot::L2
        };
        *caches.get_mut(slot) = CacheInfo::new(4096, 16, 64);
    }

    // No L2 when nothing else describes one, otherwise no L3
    if present[0x40] {
        if caches.l2.size_kb == -1 {
            caches.l2.size_kb = 0;
        } else {
            caches.l3.size_kb = 0;
        }
    }
}

/// AMD associativity encoding of leaf 0x80000006
const AMD_ASSOC: [i32; 16] = [0, 1, 2, 0, 4, 0, 8, 0, 16, 0, 32, 48, 64, 92, 128, 255];

/// Decode AMD legacy cache leaves into `caches`
pub fn decode_amd_legacy(raw: &RawSignature, caches: &mut CacheLevels) {
    if let Some(l1) = raw.ext_leaf(0x8000_0005) {
        caches.l1_data = CacheInfo::new(
            (l1.ecx >> 24) as i32,
            ((l1.ecx >> 16) & 0xff) as i32,
            (l1.ecx & 0xff) as i32,
        );
        caches.l1_instruction = CacheInfo::new(
            (l1.edx >> 24) as i32,
            ((l1.edx >> 16) & 0xff) as i32,
            (l1.edx & 0xff) as i32,
        );
    }

    if let Some(l2) = raw.ext_leaf(0x8000_0006) {
        caches.l2 = CacheInfo::new(
            (l2.ecx >> 16) as i32,
            AMD_ASSOC[((l2.ecx >> 12) & 0xf) as usize],
            (l2.ecx & 0xff) as i32,
        );

        let l3_units = l2.edx >> 18;
        caches.l3 = if l3_units > 0 {
            CacheInfo::new(
                (l3_units * 512) as i32,
                AMD_ASSOC[((l2.edx >> 12) & 0xf) as usize],
                (l2.edx & 0xff) as i32,
            )
        } else {
            CacheInfo::new(0, -1, -1)
        };
    }
    debug!(l2_kb = caches.l2.size_kb, l3_kb = caches.l3.size_kb, "AMD legacy cache info");
}
