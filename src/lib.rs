//! ffx-mail: forensic extraction of Outlook mail stores from disk images and
//! their normalization into one delivery-time-ordered CSV timeline.

pub mod aggregate;
pub mod common;
pub mod config;
pub mod csv_io;
pub mod error;
pub mod extractor;
pub mod image;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod scanner;
pub mod store;
pub mod volume;

pub use error::{FfxMailError, FfxResult};
pub use pipeline::Session;
