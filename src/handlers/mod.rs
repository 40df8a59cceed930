//! HTTP handlers.
//!
//! Each handler takes the shared [`crate::AppState`] plus already-extracted
//! request parts, calls exactly one engine operation, and turns the result
//! into a response.  Routing lives in [`crate::server`].

pub mod bucket;
pub mod object;
