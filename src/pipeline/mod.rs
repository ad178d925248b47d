//! Pure processing stages shared by the providers.
//!
//! ## Data Flow
//!
//! ```text
//! payload ──▶ (recognizer) ──▶ cluster ──▶ render
//! (base64)      (fragments)     (grid)      (markdown)
//!                    └────────▶ notes
//! ```
//!
//! 1. [`payload`]: strip the data-URI header, decode base64, enforce the size limit
//! 2. [`cluster`]: greedy row/column clustering of fragment bounding boxes
//! 3. [`render`]: GFM pipe table (or a "no table" notice) from a grid
//! 4. [`notes`]: numbered footnotes recovered from raw text
//!
//! None of these stages perform I/O; the only suspension points live in
//! [`crate::provider`].

pub mod cluster;
pub mod notes;
pub mod payload;
pub mod render;
