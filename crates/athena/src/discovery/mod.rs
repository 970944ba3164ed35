//! Network discovery building blocks
//!
//! - [`range`]: expand the configured address range
//! - [`probe`]: TCP liveness checks
//! - [`resolve`]: reverse name lookups
//! - [`shares`]: share enumeration
//!
//! Each runs its network work through its own [`WorkPool`].

pub mod pool;
pub mod probe;
pub mod range;
pub mod resolve;
pub mod shares;

pub use pool::WorkPool;
pub use probe::{ProbeSettings, Prober};
pub use range::RangeError;
pub use resolve::{NameService, Resolver, SystemNameService};
pub use shares::ShareEnumerator;
