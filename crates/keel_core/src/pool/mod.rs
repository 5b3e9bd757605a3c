// mod.rs - Pooled array storage
//
// Entity sets never allocate their backing arrays directly: they rent
// vectors from these pools when they grow and hand the old ones back.

mod array_pool;

pub use array_pool::{ArrayPool, ArrayPools, PoolStats};
