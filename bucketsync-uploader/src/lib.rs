//! Uploads a local directory tree to an S3-compatible object store.
//!
//! Every regular file below the configured root is read into memory and written with a single
//! `PutObject` call. The object key is the file's path relative to the root, with `/` separators.
//! Files are processed one at a time in depth-first order; see [`uploader::Uploader`] for the
//! error handling rules.
#![warn(missing_debug_implementations)]

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod observability;
pub mod uploader;
pub mod walk;
