pub mod arena;
pub mod catalog;
mod error;
pub mod pool;
pub mod snapshot;

pub use arena::{DEFAULT_PAGE_BYTES, DEFAULT_POOL_BYTES};
pub use error::{Error, Result};
pub use pool::{PageStats, Pool};
