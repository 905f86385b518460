//! The Aika value-processing engine.
//!
//! Samples flow caller → [`historian::Historian`] → [`tag::TagDefinition`]
//! (validation) → exception filter → snapshot + subscribers → compression
//! filter → [`archive`] queue → backend. Reads either delegate to the
//! backend or pull raw samples and run the [`aggregate`] engine.

pub mod aggregate;
pub mod archive;
pub mod backend;
pub mod filter;
pub mod historian;
pub mod state;
pub mod tag;

pub use aika_lib::{Error, Result};
