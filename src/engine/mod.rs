//! Engine module containing the item lifecycle, allocation and the
//! orchestrating engine

pub mod allocator;
pub mod core;
pub mod items;
pub mod lifecycle;

pub use allocator::Allocator;
pub use self::core::*;
pub use items::*;
pub use lifecycle::*;
