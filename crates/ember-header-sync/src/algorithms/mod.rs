//! Pure algorithms over the domain types.

pub mod segments;

pub use segments::split_into_segments;
