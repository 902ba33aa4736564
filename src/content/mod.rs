//! App-data content lookup: CID derivation, HTTP fetching and the ordered
//! resolver that ties them together.

pub mod cid;
pub mod fetch;
pub mod resolver;

pub use resolver::{ContentResolver, Resolve, ResolverConfig, Strategy};
