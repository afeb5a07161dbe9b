//! Composite image mixer over a corpus of harvested image posts.
//!
//! Posts carry pictures, and pictures carry crops: the text regions cut out
//! of them. A mix takes one base post and pastes crops from other, randomly
//! sampled, donor posts over its own crop regions, then records which crop
//! went where.

pub mod config;
pub mod cropper;
pub mod db;
pub mod error;
pub mod export;
pub mod filter;
pub mod imaging;
pub mod logging;
pub mod mixer;

#[cfg(test)]
mod testutil;

pub use db::Database;
pub use error::{MixError, MixResult};
pub use mixer::{Mix, MixOutcome, Mixer, PickStrategy, RunSettings};
