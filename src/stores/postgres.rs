use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};

use crate::{
    error::{AppError, AppResult},
    models::{
        DegreeLevel, Interest, InterestLevel, Program, Qualification, QualificationStatus,
        Requirement, RequirementType, TestScore, UserProfile,
    },
};

use super::{Catalog, ProfileStore, StatusStore};

#[derive(FromRow)]
struct ProgramRow {
    id: i64,
    university_id: i64,
    name: String,
    university_name: String,
    country: String,
    degree_level: String,
    field_of_study: String,
    duration_years: Option<f64>,
    language: String,
    tuition_fee: Option<f64>,
    currency: String,
    is_active: bool,
    world_ranking: Option<i32>,
}

#[derive(FromRow)]
struct RequirementRow {
    id: i64,
    program_id: i64,
    requirement_type: String,
    requirement_value: String,
    test_type: Option<String>,
    is_mandatory: bool,
    description: Option<String>,
}

const PROGRAM_SELECT: &str = r#"
    SELECT p.id, p.university_id, p.name,
           u.name AS university_name,
           r.name AS country,
           p.degree_level, p.field_of_study, p.duration_years,
           p.language, p.tuition_fee, p.currency, p.is_active,
           u.ranking_world AS world_ranking
    FROM programs p
    JOIN universities u ON u.id = p.university_id
    JOIN regions r ON r.id = u.region_id
"#;

/// Postgres-backed program catalog
///
/// Programs are read as flat snapshots with the university and region
/// joined in, so callers never see the relational shape.
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_requirements(
        &self,
        program_ids: &[i64],
    ) -> AppResult<HashMap<i64, Vec<Requirement>>> {
        if program_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<RequirementRow> = sqlx::query_as(
            r#"
            SELECT id, program_id, requirement_type, requirement_value,
                   test_type, is_mandatory, description
            FROM program_requirements
            WHERE program_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(program_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i64, Vec<Requirement>> = HashMap::new();
        for row in rows {
            // Requirement rows are externally authored; drop ones whose type
            // we cannot interpret rather than failing the whole catalog read
            let Some(requirement_type) = RequirementType::parse(&row.requirement_type) else {
                tracing::warn!(
                    requirement_id = row.id,
                    requirement_type = %row.requirement_type,
                    "Skipping requirement with unknown type"
                );
                continue;
            };

            grouped.entry(row.program_id).or_default().push(Requirement {
                id: row.id,
                requirement_type,
                value: row.requirement_value,
                test_type: row.test_type,
                is_mandatory: row.is_mandatory,
                description: row.description,
            });
        }

        Ok(grouped)
    }

    fn into_program(row: ProgramRow, requirements: Vec<Requirement>) -> AppResult<Program> {
        let degree_level = DegreeLevel::parse(&row.degree_level).ok_or_else(|| {
            AppError::Internal(format!(
                "Program {} has unknown degree level '{}'",
                row.id, row.degree_level
            ))
        })?;

        Ok(Program {
            id: row.id,
            university_id: row.university_id,
            name: row.name,
            university_name: row.university_name,
            country: row.country,
            degree_level,
            field_of_study: row.field_of_study,
            duration_years: row.duration_years,
            language: row.language,
            tuition_fee: row.tuition_fee,
            currency: row.currency,
            is_active: row.is_active,
            world_ranking: row.world_ranking,
            requirements,
        })
    }
}

#[async_trait::async_trait]
impl Catalog for PgCatalog {
    async fn list_active_programs(&self) -> AppResult<Vec<Program>> {
        let query = format!("{} WHERE p.is_active = true ORDER BY p.id", PROGRAM_SELECT);
        let rows: Vec<ProgramRow> = sqlx::query_as(&query).fetch_all(&self.pool).await?;

        let program_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut requirements = self.load_requirements(&program_ids).await?;

        rows.into_iter()
            .map(|row| {
                let reqs = requirements.remove(&row.id).unwrap_or_default();
                Self::into_program(row, reqs)
            })
            .collect()
    }

    async fn get_program(&self, program_id: i64) -> AppResult<Option<Program>> {
        let query = format!("{} WHERE p.id = $1", PROGRAM_SELECT);
        let row: Option<ProgramRow> = sqlx::query_as(&query)
            .bind(program_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let mut requirements = self.load_requirements(&[row.id]).await?;
                let reqs = requirements.remove(&row.id).unwrap_or_default();
                Ok(Some(Self::into_program(row, reqs)?))
            }
            None => Ok(None),
        }
    }
}

#[derive(FromRow)]
struct QualificationRow {
    qualification_type: String,
    institution_name: String,
    field_of_study: String,
    grade_point: Option<String>,
    max_grade_point: Option<String>,
    completion_year: Option<i32>,
    is_completed: bool,
}

#[derive(FromRow)]
struct InterestRow {
    field_of_study: String,
    interest_level: String,
}

#[derive(FromRow)]
struct TestScoreRow {
    test_type: String,
    score: String,
    max_score: Option<String>,
    test_date: Option<NaiveDate>,
    expiry_date: Option<NaiveDate>,
}

/// Postgres-backed user profile store
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProfileStore for PgProfileStore {
    async fn get_user(&self, user_id: i64) -> AppResult<Option<UserProfile>> {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        if exists.is_none() {
            return Ok(None);
        }

        let qualification_rows: Vec<QualificationRow> = sqlx::query_as(
            r#"
            SELECT qualification_type, institution_name, field_of_study,
                   grade_point, max_grade_point, completion_year, is_completed
            FROM user_qualifications
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let interest_rows: Vec<InterestRow> = sqlx::query_as(
            "SELECT field_of_study, interest_level FROM user_interests WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let test_score_rows: Vec<TestScoreRow> = sqlx::query_as(
            r#"
            SELECT test_type, score, max_score, test_date, expiry_date
            FROM user_test_scores
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let qualifications = qualification_rows
            .into_iter()
            .filter_map(|row| {
                let Some(qualification_type) = DegreeLevel::parse(&row.qualification_type) else {
                    tracing::warn!(
                        user_id,
                        qualification_type = %row.qualification_type,
                        "Skipping qualification with unknown type"
                    );
                    return None;
                };
                Some(Qualification {
                    qualification_type,
                    institution_name: row.institution_name,
                    field_of_study: row.field_of_study,
                    grade_point: row.grade_point,
                    max_grade_point: row.max_grade_point,
                    completion_year: row.completion_year,
                    is_completed: row.is_completed,
                })
            })
            .collect();

        let interests = interest_rows
            .into_iter()
            .map(|row| Interest {
                field_of_study: row.field_of_study,
                interest_level: match row.interest_level.to_lowercase().as_str() {
                    "high" => InterestLevel::High,
                    "low" => InterestLevel::Low,
                    _ => InterestLevel::Medium,
                },
            })
            .collect();

        let test_scores = test_score_rows
            .into_iter()
            .map(|row| TestScore {
                test_type: row.test_type,
                score: row.score,
                max_score: row.max_score,
                test_date: row.test_date,
                expiry_date: row.expiry_date,
            })
            .collect();

        Ok(Some(UserProfile {
            id: user_id,
            qualifications,
            interests,
            test_scores,
        }))
    }
}

#[derive(FromRow)]
struct StatusRow {
    user_id: i64,
    program_id: i64,
    is_qualified: bool,
    qualification_score: f64,
    requirements_met: i32,
    total_requirements: i32,
    missing_requirements: String,
    last_checked: DateTime<Utc>,
}

impl StatusRow {
    fn into_status(self) -> QualificationStatus {
        // Missing requirements are stored as a JSON document; an unreadable
        // blob degrades to an empty list instead of failing the read
        let missing_requirements =
            serde_json::from_str(&self.missing_requirements).unwrap_or_else(|e| {
                tracing::warn!(
                    user_id = self.user_id,
                    program_id = self.program_id,
                    error = %e,
                    "Unreadable missing_requirements payload"
                );
                vec![]
            });

        QualificationStatus {
            user_id: self.user_id,
            program_id: self.program_id,
            is_qualified: self.is_qualified,
            qualification_score: self.qualification_score,
            requirements_met: self.requirements_met.max(0) as u32,
            total_requirements: self.total_requirements.max(0) as u32,
            missing_requirements,
            last_checked: self.last_checked,
        }
    }
}

/// Postgres-backed qualification status store
///
/// The upsert relies on the unique (user_id, program_id) index for its
/// last-writer-wins semantics.
pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl StatusStore for PgStatusStore {
    async fn get_status(
        &self,
        user_id: i64,
        program_id: i64,
    ) -> AppResult<Option<QualificationStatus>> {
        let row: Option<StatusRow> = sqlx::query_as(
            r#"
            SELECT user_id, program_id, is_qualified, qualification_score,
                   requirements_met, total_requirements, missing_requirements, last_checked
            FROM user_qualification_status
            WHERE user_id = $1 AND program_id = $2
            "#,
        )
        .bind(user_id)
        .bind(program_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(StatusRow::into_status))
    }

    async fn upsert_status(&self, status: &QualificationStatus) -> AppResult<()> {
        let missing = serde_json::to_string(&status.missing_requirements)
            .map_err(|e| AppError::Internal(format!("Status serialization error: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO user_qualification_status
                (user_id, program_id, is_qualified, qualification_score,
                 requirements_met, total_requirements, missing_requirements, last_checked)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, program_id) DO UPDATE SET
                is_qualified = EXCLUDED.is_qualified,
                qualification_score = EXCLUDED.qualification_score,
                requirements_met = EXCLUDED.requirements_met,
                total_requirements = EXCLUDED.total_requirements,
                missing_requirements = EXCLUDED.missing_requirements,
                last_checked = EXCLUDED.last_checked
            "#,
        )
        .bind(status.user_id)
        .bind(status.program_id)
        .bind(status.is_qualified)
        .bind(status.qualification_score)
        .bind(status.requirements_met as i32)
        .bind(status.total_requirements as i32)
        .bind(missing)
        .bind(status.last_checked)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_statuses(&self, user_id: i64) -> AppResult<Vec<QualificationStatus>> {
        let rows: Vec<StatusRow> = sqlx::query_as(
            r#"
            SELECT user_id, program_id, is_qualified, qualification_score,
                   requirements_met, total_requirements, missing_requirements, last_checked
            FROM user_qualification_status
            WHERE user_id = $1
            ORDER BY qualification_score DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StatusRow::into_status).collect())
    }
}
