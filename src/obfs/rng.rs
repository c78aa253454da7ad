//! Shared pseudo-random source for disguise framing.
//!
//! One generator is seeded once and shared by every obfuscator built from the
//! same handle. Each wrapped connection draws its own seed from it at wrap
//! time, so per-connection choices never contend on the lock.
//!
//! This is not a cryptographic source. Head lengths and user agents only need
//! to vary across connections.

use std::sync::{Arc, Mutex, OnceLock};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

static GLOBAL_RNG: OnceLock<ObfsRng> = OnceLock::new();

/// Cloneable handle to a shared, once-seeded generator.
#[derive(Debug, Clone)]
pub struct ObfsRng {
    inner: Arc<Mutex<StdRng>>,
}

impl ObfsRng {
    /// The process-wide generator, seeded from OS entropy on first use.
    pub fn global() -> Self {
        GLOBAL_RNG.get_or_init(Self::from_entropy).clone()
    }

    /// A fresh generator seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// A deterministic generator, for reproducible wire output in tests.
    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rng)),
        }
    }

    /// Derive an independent generator for one connection.
    pub fn fork(&self) -> StdRng {
        // Poisoning is ignored: the generator state stays valid.
        let mut rng = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        StdRng::seed_from_u64(rng.next_u64())
    }
}

impl Default for ObfsRng {
    fn default() -> Self {
        Self::global()
    }
}
