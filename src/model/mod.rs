//! Data model: values, types, signatures and the implementation boundary.

pub mod implementation;
pub mod signature;
pub mod types;
pub mod value;
