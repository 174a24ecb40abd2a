//! The package artefact: what to fetch, where it is staged, and how it is
//! downloaded.
//!
//! # Sub-modules
//!
//! - [`download`] - Control-plane download trait and implementation.
//! - [`reference`] - Version selection and request naming.
//! - [`staging`] - Staging directory and the artefact cleanup guard.

pub mod download;
pub mod reference;
pub mod staging;
