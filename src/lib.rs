//! Thread media archiver library.
//!
//! Incrementally mirrors a discussion thread's post list and attached media
//! to local storage, optionally converting one media format into another.

pub mod archive;
pub mod archiver;
pub mod config;
pub mod constants;
pub mod media;
pub mod remote;
pub mod thread;
