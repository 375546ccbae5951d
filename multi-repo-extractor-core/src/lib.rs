#![doc = "multi-repo-extractor-core: core pipeline library for multi-repo-extractor."]

//! This crate holds the repository processing pipeline and everything it is built from:
//! provider listing, working copy synchronization, analyzer invocation, identity
//! verification and result aggregation. CLI parsing and the concrete upload client live
//! in the `multi-repo-extractor` crate.
//!
//! # Usage
//! Construct the stages, hand them to [`pipeline::Pipeline`], then feed its successful
//! repositories to [`upload::upload_all`].

pub mod analyzer;
pub mod contract;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod repository;
pub mod upload;
pub mod verify;
pub mod working_copy;
