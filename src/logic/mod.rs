pub mod allocator;
pub mod harvest_numbering;
pub mod lifecycle;
pub mod lineage;
pub mod query;

pub use allocator::SequenceAllocator;
pub use harvest_numbering::next_harvest_number;
pub use lifecycle::FloweringLifecycle;
pub use lineage::LineageService;
pub use query::LineageQueryService;
