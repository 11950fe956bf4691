//! Input generation: complexity, seeds, the generator registry and the binder.

pub mod binder;
pub mod complexity;
pub mod defaults;
pub mod registry;
pub mod seed;
