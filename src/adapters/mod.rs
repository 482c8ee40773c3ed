pub mod matcher;
pub mod memory;
pub mod seed;

pub use memory::{MemoryCollection, MemoryStore};
pub use seed::{Seed, SeedReport};
