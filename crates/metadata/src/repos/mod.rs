//! Repository traits for metadata operations.

pub mod records;
pub mod stats;
pub mod sweeps;
pub mod tombstones;

pub use records::RecordRepo;
pub use stats::StatsRepo;
pub use sweeps::SweepRepo;
pub use tombstones::TombstoneRepo;
