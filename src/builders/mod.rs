//! Builders to construct registries from configuration.

pub mod registry_builder;

pub use registry_builder::RegistryBuilder;
