//! Core types and pure logic for the examdesk diagnostic pipeline.
//!
//! This crate is free of HTTP and database dependencies. Storage is reached
//! through the [`store::ExamStore`] trait; everything else here is pure.

// Native `async fn` in traits; the store trait spells out `Send` futures.
#![allow(async_fn_in_trait)]

pub mod analysis;
pub mod assemble;
pub mod cohort;
pub mod error;
pub mod evaluate;
pub mod identity;
pub mod policy;
pub mod question;
pub mod remediation;
pub mod roster;
pub mod scope;
pub mod session;
pub mod store;
pub mod taxonomy;

pub use error::{Error, Result};
