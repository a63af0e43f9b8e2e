//! Fetch and load social-media event-detection datasets.
//!
//! ```no_run
//! use socialed_data::DatasetLoader;
//!
//! let loader = DatasetLoader::new(Some("MAVEN"), None)?;
//! let table = loader.load_data()?;
//! println!("{} tweets in {}", table.len(), loader.dataset_language()?);
//! # Ok::<(), socialed_data::DatasetError>(())
//! ```

pub mod config;
pub mod data;
pub mod error;

pub use config::LoaderConfig;
pub use data::clone::{Cloner, GitCloner};
pub use data::loader::DatasetLoader;
pub use data::model::{CellValue, TweetTable, REQUIRED_COLUMNS};
pub use data::registry::{dataset_language, DatasetDescriptor, Language, REGISTRY};
pub use error::{DatasetError, Result};
