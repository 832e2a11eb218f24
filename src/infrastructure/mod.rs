pub mod diesel_store;
pub mod memory;
pub mod models;

use crate::domain::errors::DomainError;
use crate::domain::ports::{Store, UnitOfWork};

pub use diesel_store::{DieselUnitOfWork, PgStore};
pub use memory::{InMemoryUnitOfWork, MemoryState};

/// Storage backend selected at startup. Handlers stay non-generic by
/// dispatching through this enum.
pub enum Storage {
    Postgres(DieselUnitOfWork),
    Memory(InMemoryUnitOfWork),
}

impl UnitOfWork for Storage {
    fn transaction<T, F>(&self, f: F) -> Result<T, DomainError>
    where
        F: FnOnce(&mut dyn Store) -> Result<T, DomainError>,
    {
        match self {
            Storage::Postgres(uow) => uow.transaction(f),
            Storage::Memory(uow) => uow.transaction(f),
        }
    }
}
