//! Deterministic random number generation.
//!
//! RULE: Nothing in the engine may call any platform RNG.
//! All randomness flows through ComponentRng instances derived
//! from the single seed in EngineConfig.
//!
//! Each component gets its own RNG stream, seeded from
//! (seed XOR mixed component index). Two runs with the same seed over
//! the same snapshot therefore produce identical outputs.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single component.
pub struct ComponentRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl ComponentRng {
    /// Create a component RNG from the engine seed and a stable
    /// component index. The index must never change once assigned.
    pub fn new(seed: u64, component_index: u64) -> Self {
        let derived_seed = seed ^ (component_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a usize in [0, n).
    pub fn next_index_below(&mut self, n: usize) -> usize {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        (self.inner.next_u64() % n as u64) as usize
    }
}

/// All component RNGs for a single run, indexed by stable slot.
pub struct RngBank {
    seed: u64,
}

impl RngBank {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn for_component(&self, slot: ComponentSlot) -> ComponentRng {
        ComponentRng::new(self.seed, slot as u64).with_name(slot.name())
    }
}

/// Stable component slot assignments.
/// NEVER reorder or remove entries, only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum ComponentSlot {
    ChurnClustering = 0,
}

impl ComponentSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChurnClustering => "churn_clustering",
        }
    }
}
