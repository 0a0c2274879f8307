//! syndic core engine.
//!
//! Implements the manifest synchronization pipeline:
//!
//! 1. [`catalog`] fetches per-app version/download metadata from the
//!    upstream catalog API (bounded retry, per-app schema errors).
//! 2. [`verify`] streams each referenced artifact and computes a
//!    SHA-256 digest incrementally, with a URL-keyed digest cache.
//! 3. [`state`] re-derives the previously published snapshot per
//!    target by reading the target's own last output tree.
//! 4. [`plan`] diffs fresh records against that snapshot and tags each
//!    app with a regeneration reason.
//! 5. [`render`] maps the plan into platform-native manifest text for
//!    each target (AltStore, F-Droid, Homebrew, Winget, AUR) without
//!    touching the network or filesystem.
//! 6. [`publish`] writes each target's output set through a staging
//!    directory and swaps it into place atomically.
//!
//! [`sync`] orchestrates the whole cycle under a global deadline and
//! produces a machine-readable [`sync::SyncSummary`].

pub mod aur_push;
pub mod catalog;
pub mod config;
pub mod plan;
pub mod publish;
pub mod render;
pub mod state;
pub mod sync;
pub mod verify;

/// User agent sent on every catalog and artifact request.
pub const USER_AGENT: &str = concat!("syndic/", env!("CARGO_PKG_VERSION"));
