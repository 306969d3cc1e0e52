//! # s3-part-copy
//!
//! Copies large multipart S3 objects with `UploadPartCopy`, reproducing the
//! part layout of the source object in the destination.
//!
//! Keeping the layout means the destination reports the same parts count and
//! part boundaries as the source, so multipart entity tags computed with the
//! same part size match.
//!
//! The building blocks live in [s3]; [config] creates S3 clients and holds
//! the tunable [config::CopySettings], and [cli] wires them into the
//! `s3-part-copy` binary.

// Public modules

pub mod cli;
pub mod config;
pub mod s3;
// Internal shared modules
mod endpoint;
mod types;
