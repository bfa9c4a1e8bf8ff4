//! Plugin registries: the operation pool and the invariant pool, plus the
//! call contexts handed to each plugin.

pub mod invariant;
pub mod operation;

pub use invariant::{CheckContext, Invariant, InvariantPool};
pub use operation::{Operation, OperationPool, PoolView, StepContext};

/// Registration failures shared by both pools.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("'{0}' is already registered")]
    Duplicate(String),

    #[error("Names must not be empty")]
    EmptyName,
}

fn validate_name<'a>(
    name: &str,
    mut taken: impl Iterator<Item = &'a str>,
) -> Result<(), RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    if taken.any(|existing| existing == name) {
        return Err(RegistryError::Duplicate(name.to_string()));
    }
    Ok(())
}
