//! Data layer: registry, fetching, decoding and the loaded table.
//!
//! Architecture:
//! ```text
//!  dataset name
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ registry  │  name → language
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐      ┌───────┐
//!   │  loader   │ ───► │ clone │  git clone into <root>/<name>/
//!   └──────────┘      └───────┘
//!        │
//!        ▼
//!   ┌──────────┐      ┌────────┐
//!   │   npy     │ ───► │ pickle │  object-dtype payloads
//!   └──────────┘      └────────┘
//!        │
//!        ▼
//!   ┌────────────┐
//!   │ TweetTable │  11 fixed columns
//!   └────────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  export   │  csv / json / parquet
//!   └──────────┘
//! ```

pub mod clone;
pub mod datasets;
pub mod export;
pub mod filter;
pub mod loader;
pub mod model;
pub mod npy;
pub mod pickle;
pub mod registry;
