pub mod partitioner;
pub mod pool;

pub use partitioner::{PartitionConfig, Partitioner, WorkUnit};
pub use pool::{BlurOutcome, WorkerPool, WorkerPools};
