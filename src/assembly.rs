//! Element-wise assembly of sparse systems over spline bases.
pub mod global;
pub mod local;
pub mod system;
