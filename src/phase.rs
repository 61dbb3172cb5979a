//! Phase identifiers and the static phase table.
//!
//! `PhaseId` is a small opaque tag over roughly 40 distinct microstructure
//! phases. Rather than hand-writing match arms for membership tests and
//! reaction behavior all over the engines, every phase's static properties
//! are collected in one table ([`PHASE_TABLE`]) indexed by id.

use bitflags::bitflags;
use std::sync::OnceLock;

/// Opaque phase tag. `0` is always [`PhaseId::POROSITY`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct PhaseId(pub u8);

bitflags! {
    /// Static membership flags for a phase, consulted by every engine.
    #[derive(Default)]
    pub struct PhaseFlags: u16 {
        /// Member of the porosity-like set {POROSITY, EMPTYP, EMPTYDP, DRIEDP, CRACKP}.
        const POROSITY_LIKE = 0b0000_0001;
        /// Cementitious binder solid (hydration product or unhydrated clinker).
        const BINDER_SOLID  = 0b0000_0010;
        /// Aggregate mineral solid.
        const AGGREGATE     = 0b0000_0100;
        /// Diffusing-species marker phase (sulfate engine bookkeeping tags).
        const DIFFUSING     = 0b0000_1000;
        /// Interfacial transition zone shell.
        const ITZ           = 0b0001_0000;
        /// Reactive with respect to the sulfate-attack diffusion engine.
        const REACTIVE      = 0b0010_0000;
        /// C-S-H-gel-like phase (counts toward gel porosity in the drying probe).
        const GEL_LIKE      = 0b0100_0000;
    }
}

/// Static, per-phase data consulted by the diffusion and FEM engines.
#[derive(Clone, Copy, Debug)]
pub struct PhaseInfo {
    pub name: &'static str,
    pub flags: PhaseFlags,
    /// Stoichiometric reaction threshold (number of walker absorptions before
    /// the voxel transitions), `0` if the phase is not reactive.
    pub threshold: u32,
    /// Product phase produced on threshold crossing, `None` if not reactive.
    pub product: Option<PhaseId>,
    /// Gel porosity fraction used by dryout's effective-porosity accounting
    /// (0.0 for non-gel phases).
    pub gel_porosity: f64,
}

macro_rules! phase_ids {
    ($($name:ident = $id:literal),* $(,)?) => {
        impl PhaseId {
            $(pub const $name: PhaseId = PhaseId($id);)*
        }
    };
}

// Canonical ids for the subset of phases every engine names explicitly.
// Remaining ids (unhydrated clinker, minor hydration products, aggregate
// mineralogies, ...) are opaque as far as this crate is concerned and only
// need an entry in `PHASE_TABLE`.
phase_ids! {
    POROSITY = 0,
    EMPTYP = 1,
    EMPTYDP = 2,
    DRIEDP = 3,
    CRACKP = 4,
    CSH = 5,
    CH = 6,
    C3AH6 = 7,
    AFM = 8,
    AFMC = 9,
    ETTR = 10,
    GYPSUM = 11,
    POZZCSH = 12,
    SLAGCSH = 13,
    BINDER = 14,
    AGG = 15,
    ITZ = 16,
    C3S = 17,
    C2S = 18,
    C3A = 19,
    C4AF = 20,
    CACO3 = 21,
}

const NPHASES: usize = 40;

/// Static table indexed by [`PhaseId`], built once on first access.
pub fn phase_table() -> &'static [PhaseInfo; NPHASES] {
    static TABLE: OnceLock<[PhaseInfo; NPHASES]> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

fn empty_info() -> PhaseInfo {
    PhaseInfo {
        name: "UNUSED",
        flags: PhaseFlags::empty(),
        threshold: 0,
        product: None,
        gel_porosity: 0.0,
    }
}

fn build_table() -> [PhaseInfo; NPHASES] {
    let mut table = [empty_info(); NPHASES];

    table[0] = PhaseInfo { name: "POROSITY", flags: PhaseFlags::POROSITY_LIKE, threshold: 0, product: None, gel_porosity: 0.0 };
    table[1] = PhaseInfo { name: "EMPTYP", flags: PhaseFlags::POROSITY_LIKE, threshold: 0, product: None, gel_porosity: 0.0 };
    table[2] = PhaseInfo { name: "EMPTYDP", flags: PhaseFlags::POROSITY_LIKE, threshold: 0, product: None, gel_porosity: 0.0 };
    table[3] = PhaseInfo { name: "DRIEDP", flags: PhaseFlags::POROSITY_LIKE, threshold: 0, product: None, gel_porosity: 0.0 };
    table[4] = PhaseInfo { name: "CRACKP", flags: PhaseFlags::POROSITY_LIKE, threshold: 0, product: None, gel_porosity: 0.0 };
    table[5] = PhaseInfo { name: "CSH", flags: PhaseFlags::BINDER_SOLID.union(PhaseFlags::GEL_LIKE), threshold: 0, product: None, gel_porosity: 0.38 };
    table[6] = PhaseInfo { name: "CH", flags: PhaseFlags::BINDER_SOLID.union(PhaseFlags::REACTIVE), threshold: 90, product: Some(PhaseId::GYPSUM), gel_porosity: 0.0 };
    table[7] = PhaseInfo { name: "C3AH6", flags: PhaseFlags::BINDER_SOLID.union(PhaseFlags::REACTIVE), threshold: 20, product: Some(PhaseId::AFM), gel_porosity: 0.0 };
    table[8] = PhaseInfo { name: "AFM", flags: PhaseFlags::BINDER_SOLID.union(PhaseFlags::REACTIVE), threshold: 19, product: Some(PhaseId::ETTR), gel_porosity: 0.0 };
    table[9] = PhaseInfo { name: "AFMC", flags: PhaseFlags::BINDER_SOLID.union(PhaseFlags::REACTIVE), threshold: 34, product: Some(PhaseId::ETTR), gel_porosity: 0.0 };
    table[10] = PhaseInfo { name: "ETTR", flags: PhaseFlags::BINDER_SOLID, threshold: 0, product: None, gel_porosity: 0.0 };
    table[11] = PhaseInfo { name: "GYPSUM", flags: PhaseFlags::BINDER_SOLID, threshold: 0, product: None, gel_porosity: 0.0 };
    table[12] = PhaseInfo { name: "POZZCSH", flags: PhaseFlags::BINDER_SOLID.union(PhaseFlags::GEL_LIKE), threshold: 0, product: None, gel_porosity: 0.20 };
    table[13] = PhaseInfo { name: "SLAGCSH", flags: PhaseFlags::BINDER_SOLID.union(PhaseFlags::GEL_LIKE), threshold: 0, product: None, gel_porosity: 0.20 };
    table[14] = PhaseInfo { name: "BINDER", flags: PhaseFlags::BINDER_SOLID, threshold: 0, product: None, gel_porosity: 0.0 };
    table[15] = PhaseInfo { name: "AGG", flags: PhaseFlags::AGGREGATE, threshold: 0, product: None, gel_porosity: 0.0 };
    table[16] = PhaseInfo { name: "ITZ", flags: PhaseFlags::ITZ, threshold: 0, product: None, gel_porosity: 0.0 };
    table[17] = PhaseInfo { name: "C3S", flags: PhaseFlags::BINDER_SOLID, threshold: 0, product: None, gel_porosity: 0.0 };
    table[18] = PhaseInfo { name: "C2S", flags: PhaseFlags::BINDER_SOLID, threshold: 0, product: None, gel_porosity: 0.0 };
    table[19] = PhaseInfo { name: "C3A", flags: PhaseFlags::BINDER_SOLID, threshold: 0, product: None, gel_porosity: 0.0 };
    table[20] = PhaseInfo { name: "C4AF", flags: PhaseFlags::BINDER_SOLID, threshold: 0, product: None, gel_porosity: 0.0 };
    table[21] = PhaseInfo { name: "CACO3", flags: PhaseFlags::BINDER_SOLID, threshold: 0, product: None, gel_porosity: 0.0 };

    for slot in table.iter_mut().skip(22) {
        *slot = PhaseInfo { name: "RESERVED", flags: PhaseFlags::BINDER_SOLID, threshold: 0, product: None, gel_porosity: 0.0 };
    }

    table
}

impl PhaseId {
    #[inline]
    pub fn info(self) -> PhaseInfo {
        phase_table()[self.0 as usize]
    }

    #[inline]
    pub fn is_porosity_like(self) -> bool {
        self.info().flags.contains(PhaseFlags::POROSITY_LIKE)
    }

    #[inline]
    pub fn is_gel_like(self) -> bool {
        self.info().flags.contains(PhaseFlags::GEL_LIKE)
    }

    #[inline]
    pub fn is_reactive(self) -> bool {
        self.info().flags.contains(PhaseFlags::REACTIVE)
    }

    #[inline]
    pub fn is_aggregate(self) -> bool {
        self.info().flags.contains(PhaseFlags::AGGREGATE)
    }

    #[inline]
    pub fn is_itz(self) -> bool {
        self.info().flags.contains(PhaseFlags::ITZ)
    }
}

/// Rewrites a phase id read from an older image version into the current id
/// space. Total (every input id maps to a valid output id) and idempotent:
/// `remap(remap(id, v), v) == remap(id, v)`.
///
/// The table only needs entries for ids that actually moved between
/// versions; anything absent from the table passes through unchanged, which
/// is what makes a second application a no-op.
pub fn remap(id: u8, from_version: &str) -> u8 {
    for &(version, old, new) in REMAP_TABLE {
        if version == from_version && old == id {
            return new;
        }
    }
    id
}

/// `(version, old_id, new_id)` triples for historical image versions.
/// Empty for the current version by construction (nothing needs remapping
/// from itself).
static REMAP_TABLE: &[(&str, u8, u8)] = &[
    // Version "2.0" swapped the legacy GYPSUM/ETTR ordering relative to the
    // ids used from "3.0" onward.
    ("2.0", 22, PhaseId::GYPSUM.0),
    ("2.0", 23, PhaseId::ETTR.0),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remap_is_idempotent() {
        for id in 0u8..NPHASES as u8 {
            for version in ["2.0", "3.0", "current"] {
                let once = remap(id, version);
                let twice = remap(once, version);
                assert_eq!(once, twice);
            }
        }
    }

    #[test]
    fn porosity_like_set_matches_spec() {
        for id in [
            PhaseId::POROSITY,
            PhaseId::EMPTYP,
            PhaseId::EMPTYDP,
            PhaseId::DRIEDP,
            PhaseId::CRACKP,
        ] {
            assert!(id.is_porosity_like(), "{} should be porosity-like", id.info().name);
        }
        assert!(!PhaseId::AGG.is_porosity_like());
    }

    #[test]
    fn reaction_thresholds_match_spec() {
        assert_eq!(PhaseId::CH.info().threshold, 90);
        assert_eq!(PhaseId::C3AH6.info().threshold, 20);
        assert_eq!(PhaseId::AFM.info().threshold, 19);
        assert_eq!(PhaseId::AFMC.info().threshold, 34);
        assert_eq!(PhaseId::CH.info().product, Some(PhaseId::GYPSUM));
        assert_eq!(PhaseId::AFM.info().product, Some(PhaseId::ETTR));
    }
}
