//! storyline-store: Storage layer for the Storyline clustering engine
//!
//! This crate defines the [`Store`] trait the clustering core persists
//! through, the filters and write batches it speaks, and [`MemoryStore`],
//! an in-memory implementation with JSON snapshot files.
//!
//! # Example
//!
//! ```no_run
//! use storyline_store::{MemoryStore, Store, ArticleFilter};
//!
//! # async fn example() -> storyline_store::StoreResult<()> {
//! let store = MemoryStore::load("storyline.json")?;
//! let unclustered = store
//!     .find_articles(&ArticleFilter::default().clustered(false))
//!     .await?;
//! println!("{} articles awaiting assignment", unclustered.len());
//! store.save("storyline.json")?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, Snapshot};
pub use store::{ArticleFilter, ClusterFilter, Store, WriteBatch, WriteOp};
