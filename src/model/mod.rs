pub mod breeding;
pub mod common;
pub mod flowering;
pub mod harvest;
pub mod identifier;
pub mod plant;
pub mod seed_batch;
pub mod seedling;
pub mod summary;

pub use breeding::*;
pub use common::*;
pub use flowering::*;
pub use harvest::*;
pub use identifier::*;
pub use plant::*;
pub use seed_batch::*;
pub use seedling::*;
pub use summary::*;
