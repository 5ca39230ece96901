//! Foundation types for blobkeep.
//!
//! Every other blobkeep crate depends on `blobkeep-types`.
//!
//! # Key Types
//!
//! - [`BlobRef`] -- algorithm-tagged content digest naming a blob
//! - [`SizedRef`] -- a [`BlobRef`] plus the exact size of the stored blob
//! - [`HashAlgorithm`] -- the digest function a ref was computed with

pub mod blob;
pub mod error;

pub use blob::{BlobRef, HashAlgorithm, SizedRef, DIGEST_LEN};
pub use error::TypeError;
