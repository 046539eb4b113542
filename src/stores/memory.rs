use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::{
    error::AppResult,
    models::{Program, QualificationStatus, UserProfile},
};

use super::{Catalog, ProfileStore, StatusStore};

/// In-memory catalog backed by a map, for tests and local runs
#[derive(Default)]
pub struct MemoryCatalog {
    programs: RwLock<HashMap<i64, Program>>,
}

impl MemoryCatalog {
    pub fn new(programs: Vec<Program>) -> Self {
        Self {
            programs: RwLock::new(programs.into_iter().map(|p| (p.id, p)).collect()),
        }
    }

    pub async fn insert(&self, program: Program) {
        self.programs.write().await.insert(program.id, program);
    }
}

#[async_trait::async_trait]
impl Catalog for MemoryCatalog {
    async fn list_active_programs(&self) -> AppResult<Vec<Program>> {
        let programs = self.programs.read().await;
        let mut active: Vec<Program> = programs.values().filter(|p| p.is_active).cloned().collect();
        // Map iteration order is arbitrary; keep output deterministic
        active.sort_by_key(|p| p.id);
        Ok(active)
    }

    async fn get_program(&self, program_id: i64) -> AppResult<Option<Program>> {
        Ok(self.programs.read().await.get(&program_id).cloned())
    }
}

/// In-memory profile store
#[derive(Default)]
pub struct MemoryProfileStore {
    users: RwLock<HashMap<i64, UserProfile>>,
}

impl MemoryProfileStore {
    pub fn new(users: Vec<UserProfile>) -> Self {
        Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id, u)).collect()),
        }
    }

    pub async fn insert(&self, user: UserProfile) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait::async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_user(&self, user_id: i64) -> AppResult<Option<UserProfile>> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }
}

/// In-memory status store keyed on (user_id, program_id)
#[derive(Default)]
pub struct MemoryStatusStore {
    statuses: RwLock<HashMap<(i64, i64), QualificationStatus>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows held, across all users
    pub async fn len(&self) -> usize {
        self.statuses.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.statuses.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get_status(
        &self,
        user_id: i64,
        program_id: i64,
    ) -> AppResult<Option<QualificationStatus>> {
        Ok(self
            .statuses
            .read()
            .await
            .get(&(user_id, program_id))
            .cloned())
    }

    async fn upsert_status(&self, status: &QualificationStatus) -> AppResult<()> {
        self.statuses
            .write()
            .await
            .insert((status.user_id, status.program_id), status.clone());
        Ok(())
    }

    async fn list_statuses(&self, user_id: i64) -> AppResult<Vec<QualificationStatus>> {
        let statuses = self.statuses.read().await;
        let mut rows: Vec<QualificationStatus> = statuses
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.program_id);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn status(user_id: i64, program_id: i64, score: f64) -> QualificationStatus {
        QualificationStatus {
            user_id,
            program_id,
            is_qualified: score >= 100.0,
            qualification_score: score,
            requirements_met: 0,
            total_requirements: 0,
            missing_requirements: vec![],
            last_checked: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_pair() {
        let store = MemoryStatusStore::new();

        store.upsert_status(&status(1, 10, 50.0)).await.unwrap();
        store.upsert_status(&status(1, 10, 100.0)).await.unwrap();

        assert_eq!(store.len().await, 1);
        let row = store.get_status(1, 10).await.unwrap().unwrap();
        assert_eq!(row.qualification_score, 100.0);
        assert!(row.is_qualified);
    }

    #[tokio::test]
    async fn test_list_statuses_scoped_to_user() {
        let store = MemoryStatusStore::new();
        store.upsert_status(&status(1, 10, 80.0)).await.unwrap();
        store.upsert_status(&status(1, 11, 60.0)).await.unwrap();
        store.upsert_status(&status(2, 10, 90.0)).await.unwrap();

        let rows = store.list_statuses(1).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|s| s.user_id == 1));
    }
}
