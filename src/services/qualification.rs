use std::sync::Arc;

use chrono::Utc;

use crate::{
    error::{AppError, AppResult},
    models::{
        Program, QualificationCheck, QualificationStatus, QualificationSummary, SummaryEntry,
        UserProfile,
    },
    services::requirements,
    stores::{Catalog, ProfileStore, StatusStore},
};

/// Statuses at or above this score count as a partial qualification match
pub const PARTIAL_MATCH_THRESHOLD: f64 = 75.0;

/// Checks user evidence against program requirements and keeps the
/// persisted per-(user, program) status up to date
pub struct QualificationService {
    catalog: Arc<dyn Catalog>,
    profiles: Arc<dyn ProfileStore>,
    statuses: Arc<dyn StatusStore>,
}

impl QualificationService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        profiles: Arc<dyn ProfileStore>,
        statuses: Arc<dyn StatusStore>,
    ) -> Self {
        Self {
            catalog,
            profiles,
            statuses,
        }
    }

    /// Checks one user against one program and persists the outcome.
    ///
    /// Fails with NotFound when either side is absent; malformed
    /// requirements degrade to "not met" inside the evaluator and never
    /// abort the check.
    pub async fn check(&self, user_id: i64, program_id: i64) -> AppResult<QualificationCheck> {
        let user = self
            .profiles
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        let program = self
            .catalog
            .get_program(program_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Program {} not found", program_id)))?;

        self.check_program(&user, &program).await
    }

    /// Evaluates all requirements of `program`, upserts the status row, and
    /// returns the full per-requirement detail
    pub(crate) async fn check_program(
        &self,
        user: &UserProfile,
        program: &Program,
    ) -> AppResult<QualificationCheck> {
        let today = Utc::now().date_naive();

        let detailed_results: Vec<_> = program
            .requirements
            .iter()
            .map(|req| requirements::evaluate(req, &user.test_scores, &user.qualifications, today))
            .collect();

        let total_requirements = detailed_results.len() as u32;
        let requirements_met = detailed_results.iter().filter(|r| r.is_met).count() as u32;

        // A program with no requirements is unconfigured, not a free pass:
        // score 0 and never qualified
        let qualification_score = if total_requirements > 0 {
            f64::from(requirements_met) / f64::from(total_requirements) * 100.0
        } else {
            0.0
        };

        let mandatory_unmet = detailed_results
            .iter()
            .any(|r| r.is_mandatory && !r.is_met);
        let is_qualified = qualification_score >= 100.0 && !mandatory_unmet;

        let missing_requirements: Vec<_> = detailed_results
            .iter()
            .filter(|r| !r.is_met)
            .cloned()
            .collect();

        let checked_at = Utc::now();
        let status = QualificationStatus {
            user_id: user.id,
            program_id: program.id,
            is_qualified,
            qualification_score,
            requirements_met,
            total_requirements,
            missing_requirements: missing_requirements.clone(),
            last_checked: checked_at,
        };

        self.statuses.upsert_status(&status).await?;

        tracing::debug!(
            user_id = user.id,
            program_id = program.id,
            qualification_score,
            is_qualified,
            "Qualification status updated"
        );

        Ok(QualificationCheck {
            user_id: user.id,
            program_id: program.id,
            program_name: program.name.clone(),
            university_name: program.university_name.clone(),
            is_qualified,
            qualification_score,
            requirements_met,
            total_requirements,
            missing_requirements,
            detailed_results,
            checked_at,
        })
    }

    /// Checks the user against every active program.
    ///
    /// A failure on one program is logged and skipped; partial results are
    /// acceptable and returned.
    pub async fn check_all(&self, user_id: i64) -> AppResult<Vec<QualificationCheck>> {
        let user = self
            .profiles
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        let programs = self.catalog.list_active_programs().await?;

        tracing::info!(
            user_id,
            program_count = programs.len(),
            "Starting qualification scan"
        );

        let mut results = Vec::with_capacity(programs.len());
        for program in &programs {
            match self.check_program(&user, program).await {
                Ok(check) => results.push(check),
                Err(e) => {
                    tracing::error!(
                        user_id,
                        program_id = program.id,
                        error = %e,
                        "Qualification check failed, skipping program"
                    );
                }
            }
        }

        tracing::info!(
            user_id,
            checked = results.len(),
            skipped = programs.len() - results.len(),
            "Qualification scan completed"
        );

        Ok(results)
    }

    /// Buckets the user's persisted statuses into qualified, partially
    /// qualified (score >= 75), and not qualified
    pub async fn summary(&self, user_id: i64) -> AppResult<QualificationSummary> {
        if self.profiles.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }

        let statuses = self.statuses.list_statuses(user_id).await?;
        let total_programs_checked = statuses.len();

        let mut qualified_programs = Vec::new();
        let mut partially_qualified = Vec::new();
        let mut not_qualified = Vec::new();

        for status in statuses {
            let entry = SummaryEntry {
                program_id: status.program_id,
                qualification_score: status.qualification_score,
                missing_requirements: status.missing_requirements,
                last_checked: status.last_checked,
            };

            if status.is_qualified {
                qualified_programs.push(entry);
            } else if status.qualification_score >= PARTIAL_MATCH_THRESHOLD {
                partially_qualified.push(entry);
            } else {
                not_qualified.push(entry);
            }
        }

        Ok(QualificationSummary {
            user_id,
            qualified_programs,
            partially_qualified,
            not_qualified,
            total_programs_checked,
        })
    }

    /// Submits a fire-and-forget full-catalog scan for the user.
    ///
    /// The task's outcome is logged, never observed by the caller; a scan
    /// that outlives caller interest simply completes and its statuses
    /// remain valid.
    pub fn spawn_full_scan(self: &Arc<Self>, user_id: i64) {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            match service.check_all(user_id).await {
                Ok(results) => tracing::info!(
                    user_id,
                    programs_checked = results.len(),
                    "Background qualification scan completed"
                ),
                Err(e) => tracing::warn!(
                    user_id,
                    error = %e,
                    "Background qualification scan failed"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        DegreeLevel, Interest, InterestLevel, Qualification, Requirement, RequirementType,
        TestScore,
    };
    use crate::stores::{MemoryCatalog, MemoryProfileStore, MemoryStatusStore, MockStatusStore};

    fn requirement(id: i64, requirement_type: RequirementType, value: &str, mandatory: bool) -> Requirement {
        Requirement {
            id,
            requirement_type,
            value: value.to_string(),
            test_type: match requirement_type {
                RequirementType::TestScore => Some("GRE".to_string()),
                _ => None,
            },
            is_mandatory: mandatory,
            description: None,
        }
    }

    fn program(id: i64, requirements: Vec<Requirement>) -> Program {
        Program {
            id,
            university_id: 1,
            name: format!("Program {}", id),
            university_name: "Test University".to_string(),
            country: "Germany".to_string(),
            degree_level: DegreeLevel::Master,
            field_of_study: "Computer Science".to_string(),
            duration_years: Some(2.0),
            language: "English".to_string(),
            tuition_fee: Some(10000.0),
            currency: "EUR".to_string(),
            is_active: true,
            world_ranking: Some(100),
            requirements,
        }
    }

    fn strong_user(id: i64) -> UserProfile {
        UserProfile {
            id,
            qualifications: vec![Qualification {
                qualification_type: DegreeLevel::Bachelor,
                institution_name: "State University".to_string(),
                field_of_study: "Computer Science".to_string(),
                grade_point: Some("3.8".to_string()),
                max_grade_point: Some("4.0".to_string()),
                completion_year: Some(2022),
                is_completed: true,
            }],
            interests: vec![Interest {
                field_of_study: "Computer Science".to_string(),
                interest_level: InterestLevel::High,
            }],
            test_scores: vec![TestScore {
                test_type: "GRE".to_string(),
                score: "325".to_string(),
                max_score: Some("340".to_string()),
                test_date: None,
                expiry_date: None,
            }],
        }
    }

    fn service(
        catalog: MemoryCatalog,
        profiles: MemoryProfileStore,
        statuses: Arc<MemoryStatusStore>,
    ) -> QualificationService {
        QualificationService::new(Arc::new(catalog), Arc::new(profiles), statuses)
    }

    #[tokio::test]
    async fn test_check_fully_qualified() {
        let catalog = MemoryCatalog::new(vec![program(
            10,
            vec![
                requirement(1, RequirementType::TestScore, "320", true),
                requirement(2, RequirementType::Gpa, "3.5", true),
                requirement(3, RequirementType::DegreeLevel, "bachelor", true),
            ],
        )]);
        let profiles = MemoryProfileStore::new(vec![strong_user(1)]);
        let statuses = Arc::new(MemoryStatusStore::new());
        let svc = service(catalog, profiles, statuses.clone());

        let check = svc.check(1, 10).await.unwrap();

        assert!(check.is_qualified);
        assert_eq!(check.qualification_score, 100.0);
        assert_eq!(check.requirements_met, 3);
        assert_eq!(check.total_requirements, 3);
        assert!(check.missing_requirements.is_empty());

        let persisted = statuses.get_status(1, 10).await.unwrap().unwrap();
        assert!(persisted.is_qualified);
    }

    #[tokio::test]
    async fn test_unmet_mandatory_forces_not_qualified() {
        let catalog = MemoryCatalog::new(vec![program(
            10,
            vec![requirement(1, RequirementType::TestScore, "340", true)],
        )]);
        let profiles = MemoryProfileStore::new(vec![strong_user(1)]);
        let statuses = Arc::new(MemoryStatusStore::new());
        let svc = service(catalog, profiles, statuses);

        let check = svc.check(1, 10).await.unwrap();

        assert!(!check.is_qualified);
        assert_eq!(check.qualification_score, 0.0);
        assert_eq!(check.missing_requirements.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_requirement_program_scores_zero() {
        let catalog = MemoryCatalog::new(vec![program(10, vec![])]);
        let profiles = MemoryProfileStore::new(vec![strong_user(1)]);
        let statuses = Arc::new(MemoryStatusStore::new());
        let svc = service(catalog, profiles, statuses);

        let check = svc.check(1, 10).await.unwrap();

        assert!(!check.is_qualified);
        assert_eq!(check.qualification_score, 0.0);
        assert_eq!(check.total_requirements, 0);
    }

    #[tokio::test]
    async fn test_score_invariant_and_idempotence() {
        let catalog = MemoryCatalog::new(vec![program(
            10,
            vec![
                requirement(1, RequirementType::TestScore, "320", true),
                requirement(2, RequirementType::Gpa, "3.9", false),
            ],
        )]);
        let profiles = MemoryProfileStore::new(vec![strong_user(1)]);
        let statuses = Arc::new(MemoryStatusStore::new());
        let svc = service(catalog, profiles, statuses.clone());

        let first = svc.check(1, 10).await.unwrap();
        let second = svc.check(1, 10).await.unwrap();

        // 1 of 2 requirements met, optional gpa of 3.9 missed
        assert_eq!(first.qualification_score, 50.0);
        assert!(first.qualification_score >= 0.0 && first.qualification_score <= 100.0);

        // Identical except last_checked, and still exactly one row
        assert_eq!(first.is_qualified, second.is_qualified);
        assert_eq!(first.qualification_score, second.qualification_score);
        assert_eq!(first.requirements_met, second.requirements_met);
        assert_eq!(statuses.len().await, 1);
    }

    #[tokio::test]
    async fn test_check_not_found() {
        let catalog = MemoryCatalog::new(vec![program(10, vec![])]);
        let profiles = MemoryProfileStore::new(vec![strong_user(1)]);
        let statuses = Arc::new(MemoryStatusStore::new());
        let svc = service(catalog, profiles, statuses);

        assert!(matches!(
            svc.check(999, 10).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            svc.check(1, 999).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_check_all_with_malformed_program_still_returns_all() {
        // Program 2 has a malformed requirement value; the evaluator
        // degrades it instead of aborting the scan
        let catalog = MemoryCatalog::new(vec![
            program(1, vec![requirement(1, RequirementType::TestScore, "320", true)]),
            program(2, vec![requirement(2, RequirementType::Gpa, "not-a-number", true)]),
            program(3, vec![requirement(3, RequirementType::DegreeLevel, "bachelor", true)]),
        ]);
        let profiles = MemoryProfileStore::new(vec![strong_user(1)]);
        let statuses = Arc::new(MemoryStatusStore::new());
        let svc = service(catalog, profiles, statuses);

        let results = svc.check_all(1).await.unwrap();

        assert_eq!(results.len(), 3);
        let degraded = results.iter().find(|r| r.program_id == 2).unwrap();
        assert!(!degraded.is_qualified);
        assert_eq!(degraded.qualification_score, 0.0);
        assert!(degraded.detailed_results[0].details.contains("not numeric"));
    }

    #[tokio::test]
    async fn test_check_all_skips_failing_program() {
        let catalog = MemoryCatalog::new(vec![
            program(1, vec![]),
            program(2, vec![]),
            program(3, vec![]),
        ]);
        let profiles = MemoryProfileStore::new(vec![strong_user(1)]);

        // Persisting program 2's status fails; the scan must continue
        let mut statuses = MockStatusStore::new();
        statuses
            .expect_upsert_status()
            .returning(|status: &QualificationStatus| {
                if status.program_id == 2 {
                    Err(AppError::Internal("write failed".to_string()))
                } else {
                    Ok(())
                }
            });

        let svc = QualificationService::new(
            Arc::new(catalog),
            Arc::new(profiles),
            Arc::new(statuses),
        );

        let results = svc.check_all(1).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.program_id != 2));
    }

    #[tokio::test]
    async fn test_summary_buckets() {
        let catalog = MemoryCatalog::new(vec![]);
        let profiles = MemoryProfileStore::new(vec![strong_user(1)]);
        let statuses = Arc::new(MemoryStatusStore::new());

        let mk = |program_id: i64, score: f64, qualified: bool| QualificationStatus {
            user_id: 1,
            program_id,
            is_qualified: qualified,
            qualification_score: score,
            requirements_met: 0,
            total_requirements: 0,
            missing_requirements: vec![],
            last_checked: Utc::now(),
        };
        statuses.upsert_status(&mk(1, 100.0, true)).await.unwrap();
        statuses.upsert_status(&mk(2, 80.0, false)).await.unwrap();
        statuses.upsert_status(&mk(3, 40.0, false)).await.unwrap();

        let svc = service(catalog, profiles, statuses);
        let summary = svc.summary(1).await.unwrap();

        assert_eq!(summary.qualified_programs.len(), 1);
        assert_eq!(summary.partially_qualified.len(), 1);
        assert_eq!(summary.not_qualified.len(), 1);
        assert_eq!(summary.total_programs_checked, 3);
    }
}
