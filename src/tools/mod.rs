//! Tools available to pipeline participants
//!
//! # Module Structure
//!
//! - [`registry`] - The [`Tool`] trait and [`ToolRegistry`]
//! - [`retrieval`] - Knowledge retrieval over a run's [`RetrievalScope`]
//! - [`search`] - Web search via daedra, behind the [`Searcher`] trait
//!
//! The retrieval participant executes tools through a registry so its turns
//! can be summarized the same way whatever tool ran:
//!
//! ```ignore
//! let mut registry = ToolRegistry::new();
//! registry.register(Arc::new(RetrievalTool::new(scope)));
//! let result = registry.execute("retrieve_knowledge", json!({"queries": ["attention"]})).await?;
//! ```

/// Tool registry for managing available tools.
pub mod registry;
/// Knowledge retrieval scoped to one run.
pub mod retrieval;
/// Web search using DuckDuckGo.
pub mod search;

pub use registry::{Tool, ToolRegistry};
pub use retrieval::{RetrievalScope, RetrievalTool};
pub use search::{DaedraSearcher, Searcher};
