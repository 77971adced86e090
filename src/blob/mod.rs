//! Blob Module
//!
//! Content-addressed storage for immutable byte sequences.
//!
//! ## Responsibilities
//! - Stream input while computing its digest
//! - Stage, then atomically publish at `blobs/<digest>`
//! - Deduplicate by content (publishing known content is a no-op)
//! - Pin digests that in-flight work is about to reference
//!
//! ## Layout
//! ```text
//! {root}/blobs/
//!   ├── sha256-8f2c21...        published blob
//!   ├── sha256-a4e5e1...
//!   └── .partial-Xk3a9q         staging file (never a valid digest name)
//! ```

mod pins;
mod store;

pub use pins::{Pin, PinSet};
pub use store::BlobStore;
