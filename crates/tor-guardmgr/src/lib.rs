//! Persist a guard sample and choose a guard/middle/exit path for a
//! circuit.
//!
//! A reduced stand-in for the teacher's `tor-guardmgr`: [`guard`] models
//! one remembered guard and the bounded, persisted sample of them;
//! [`persist`] loads and atomically stores that sample as JSON; [`pathsel`]
//! draws a guard (preferring a remembered one) and a distinct middle and
//! exit from a [`tor_netdir::Consensus`].

#![warn(missing_docs)]
#![warn(clippy::all)]

mod err;
pub mod guard;
pub mod pathsel;
pub mod persist;

pub use err::Error;
pub use guard::{Guard, GuardSet, GUARD_LIFETIME, MAX_GUARDS};
pub use pathsel::{select_guard, select_middle_and_exit, select_path, Path};
