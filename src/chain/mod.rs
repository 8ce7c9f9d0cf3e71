//! Chain access layer
//!
//! Read-only pool/token queries batched through Multicall3, plus the
//! contract interfaces shared with the transaction path.

pub mod abi;
mod reader;

pub use reader::{PoolInfo, PoolReader};
