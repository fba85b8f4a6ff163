//! Built-in checks that ship with the engine rather than being compiled
//! from template declarations.

pub mod identity;

pub use identity::{identity_conversions, ConversionMethod, IdentityConversion, IDENTITY_CONVERSION};
