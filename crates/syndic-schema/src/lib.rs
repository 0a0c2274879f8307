//! Shared data model for syndic.
//!
//! This crate holds the types that flow through every stage of the
//! sync pipeline: validated newtypes (`AppSlug`, `Version`,
//! `Sha256Digest`), the `Platform`/`Arch` enums matching the catalog
//! wire names, and the per-cycle records (`AppRecord`,
//! `VerifiedDownload`).

pub mod arch;
pub mod hash;
pub mod types;

pub use arch::{Arch, Platform};
pub use hash::Sha256Digest;
pub use types::{
    AppRecord, AppSlug, DigestAlgorithm, DownloadKey, RecordError, VerifiedDownload, Version,
};
