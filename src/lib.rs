pub mod cache;
pub mod constants;
pub mod error;
pub mod io;
pub mod paging;
pub mod policy;
pub mod session;
pub mod shell;
pub mod tlb;
pub mod translation;

// Re-export commonly used items for convenience
pub use cache::{AccessResult, AssociativeCache, CacheSnapshot};
pub use error::{ConfigError, ParseError, Result, SimError};
pub use paging::{PageAccess, PagingSimulator};
pub use policy::{EvictionPolicy, Evictor};
pub use session::{Session, Shared, SimConfig};
pub use tlb::{TlbAccess, TlbSimulator};
pub use translation::{PageIndices, PageWalk};
