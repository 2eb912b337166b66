//! Access to a cryptographically secure random number generator.
//!
//! Every place in this workspace that needs randomness for a safety-relevant
//! purpose (key generation, circuit ID selection, path selection) should go
//! through this module rather than reaching for `rand::thread_rng` directly,
//! so that the "only ever use a CSPRNG" invariant is visible at the call
//! site.

use rand::rngs::OsRng;

/// Return a handle to the process's cryptographically secure RNG.
///
/// `OsRng` draws from the operating system's entropy source on every call;
/// it implements both [`rand_core::RngCore`] and [`rand_core::CryptoRng`], so
/// it can be passed anywhere a `CryptoRng` bound is required (ntor ephemeral
/// keys, circuit IDs, guard selection).
pub fn tor_rng() -> OsRng {
    OsRng
}
