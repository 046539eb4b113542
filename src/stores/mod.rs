//! Persistence collaborators for the recommendation engine.
//!
//! The engine is pure computation over snapshots; everything it reads or
//! writes goes through these three traits. Production wiring uses the
//! Postgres implementations, tests use the in-memory ones (or mockall
//! mocks where a failure path needs forcing).

use crate::{
    error::AppResult,
    models::{Program, QualificationStatus, UserProfile},
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCatalog, MemoryProfileStore, MemoryStatusStore};
pub use postgres::{PgCatalog, PgProfileStore, PgStatusStore};

/// Read-only access to the program catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// All active programs, each with its requirement list attached
    async fn list_active_programs(&self) -> AppResult<Vec<Program>>;

    /// A single program by id, or None if absent
    async fn get_program(&self, program_id: i64) -> AppResult<Option<Program>>;
}

/// Read-only access to user profiles
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// A user with nested qualifications, interests, and test scores
    async fn get_user(&self, user_id: i64) -> AppResult<Option<UserProfile>>;
}

/// Read/write access to persisted qualification statuses
///
/// `upsert_status` must be last-writer-wins on (user_id, program_id):
/// concurrent re-checks for the same pair are each complete recomputations,
/// so no merging is ever needed.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait StatusStore: Send + Sync {
    async fn get_status(
        &self,
        user_id: i64,
        program_id: i64,
    ) -> AppResult<Option<QualificationStatus>>;

    async fn upsert_status(&self, status: &QualificationStatus) -> AppResult<()>;

    async fn list_statuses(&self, user_id: i64) -> AppResult<Vec<QualificationStatus>>;
}
