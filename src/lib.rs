//! Loan-intake service for microfinance field work.
//!
//! Core pieces: the four-step application wizard (validators + document
//! crop flow + single-flight submission), the multipart upload pipeline that
//! turns a finished draft into stored blobs plus one flat record, and the
//! Sled-backed record store behind the REST surface.
//!
//! This lib exposes the wizard and server internals; the binaries wire them
//! to the network.

pub mod auth;
pub mod blobstore;
pub mod crop;
pub mod error;
pub mod models;
// REST API module: Axum HTTP handlers (auth, CRUD, the loan intake pipeline)
pub mod rest;
pub mod storage;
pub mod validate;
// Client-side application wizard (driven by the CLI, testable headless)
pub mod wizard;
