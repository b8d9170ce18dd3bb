pub mod archive;
pub mod batch;
pub mod config;
pub mod cycle;
pub mod error;
pub mod inflation;
pub mod io;
pub mod namelist;
pub mod orchestrator;
pub mod paths;
pub mod streams;

pub use error::{CycleError, Result};
