pub mod behavior;
pub mod constants;
pub mod cursor;
pub mod entity;
pub mod interpolation;
pub(crate) mod lenient;
pub mod registry;
pub mod scheduler;
