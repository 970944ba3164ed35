//! Athena: network share discovery and file search
//!
//! Sweeps an address range for hosts answering on the share port, resolves
//! their names, enumerates their shares, walks every share and keeps a
//! searchable index of what it found.
//!
//! # Phases
//!
//! | Phase | Does |
//! |---|---|
//! | `discover_new_hosts` | probe, resolve and enumerate the configured range |
//! | `ping_known_hosts` | refresh `last_seen` of hosts that still answer |
//! | `index_known_hosts` | re-walk every share and replace its file rows |
//! | `post_processing` | rebuild the keyword index from all filenames |
//!
//! Phases run one at a time through [`scheduler::PhaseQueue`]; see
//! [`pipeline::Pipeline`] for the bodies and [`search::SearchService`] for
//! the read side.

pub mod config;
pub mod discovery;
pub mod error;
pub mod indexer;
pub mod pipeline;
pub mod scheduler;
pub mod search;
pub mod smb;

pub use config::AthenaConfig;
pub use error::{AthenaError, Result};
pub use pipeline::Pipeline;
pub use scheduler::{Phase, PhaseExecutor, PhaseQueue, Scheduler};
pub use search::{SearchError, SearchHit, SearchService, Statistics};
