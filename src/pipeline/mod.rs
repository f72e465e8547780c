//! Pipeline stages, one submodule per stage.
//!
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different extraction backend) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! locate ──▶ download ──▶ extract ──▶ normalize ──▶ write ──▶ package
//! (URL)      (PDF file)   (raw rows)  (Dataset)     (CSV)     (zip)
//! ```
//!
//! 1. [`locate`]    — fetch the portal page and discover the Anexo I URL
//! 2. [`download`]  — stream the PDF to disk with bounded retry
//! 3. [`extract`]   — rebuild table rows from the pdfium text layer; runs
//!    in `spawn_blocking` because pdfium is not async-safe
//! 4. [`normalize`] — clean cells, drop header/empty rows, enforce the
//!    schema; the only stage with domain logic
//! 5. [`write`]     — serialize the Dataset to delimited text, atomically
//! 6. [`package`]   — wrap the output in a labelled zip archive

pub mod download;
pub mod extract;
pub mod locate;
pub mod normalize;
pub mod package;
pub mod write;
