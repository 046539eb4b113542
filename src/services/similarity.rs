use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{Program, ProgramSummary, SimilarProgram},
    stores::Catalog,
};

/// Minimum score for a program to count as related to a free-text field
const FIELD_MATCH_THRESHOLD: f64 = 60.0;

/// Finds programs similar to a base program or to a free-text field
pub struct SimilarityService {
    catalog: Arc<dyn Catalog>,
}

impl SimilarityService {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Programs most similar to the given base program, ranked by the
    /// pairwise similarity score
    pub async fn similar_programs(
        &self,
        program_id: i64,
        limit: usize,
    ) -> AppResult<Vec<SimilarProgram>> {
        let base = self
            .catalog
            .get_program(program_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Program {} not found", program_id)))?;

        let programs = self.catalog.list_active_programs().await?;

        let mut similar: Vec<SimilarProgram> = programs
            .iter()
            .filter(|p| p.id != base.id)
            .filter(|p| {
                p.field_of_study.eq_ignore_ascii_case(&base.field_of_study)
                    || p.degree_level == base.degree_level
            })
            .map(|p| SimilarProgram {
                program: ProgramSummary::from(p),
                similarity_score: program_similarity(&base, p),
                matching_factors: similarity_factors(&base, p),
                recommendation_reasons: vec![format!("Similar to {}", base.name)],
            })
            .collect();

        sort_by_similarity_desc(&mut similar);
        similar.truncate(limit);

        tracing::info!(program_id, found = similar.len(), "Similar programs computed");
        Ok(similar)
    }

    /// Programs whose field of study relates to a free-text field name
    pub async fn similar_programs_by_field(
        &self,
        field: &str,
        limit: usize,
    ) -> AppResult<Vec<SimilarProgram>> {
        let field = field.trim();
        if field.is_empty() {
            return Err(AppError::InvalidInput(
                "Field of study must not be empty".to_string(),
            ));
        }

        let programs = self.catalog.list_active_programs().await?;

        let mut similar: Vec<SimilarProgram> = programs
            .iter()
            .filter_map(|p| {
                let score = field_similarity(field, &p.field_of_study);
                if score < FIELD_MATCH_THRESHOLD {
                    return None;
                }
                Some(SimilarProgram {
                    program: ProgramSummary::from(p),
                    similarity_score: score,
                    matching_factors: vec![format!("Similar field to {}", field)],
                    recommendation_reasons: vec![format!("Related to {}", field)],
                })
            })
            .collect();

        sort_by_similarity_desc(&mut similar);
        similar.truncate(limit);

        tracing::info!(field, found = similar.len(), "Field search computed");
        Ok(similar)
    }
}

/// Pairwise similarity between two programs, 0 to 100.
///
/// Field of study dominates, followed by degree level, language, duration,
/// and a small bonus for comparable world rankings.
pub fn program_similarity(a: &Program, b: &Program) -> f64 {
    let mut score: f64 = 0.0;

    let field_a = a.field_of_study.to_lowercase();
    let field_b = b.field_of_study.to_lowercase();
    if field_a == field_b {
        score += 40.0;
    } else if field_a.contains(&field_b) || field_b.contains(&field_a) {
        score += 20.0;
    }

    if a.degree_level == b.degree_level {
        score += 30.0;
    }

    if a.language.eq_ignore_ascii_case(&b.language) {
        score += 15.0;
    }

    if let (Some(da), Some(db)) = (a.duration_years, b.duration_years) {
        if (da - db).abs() < f64::EPSILON {
            score += 10.0;
        }
    }

    if let (Some(ra), Some(rb)) = (a.world_ranking, b.world_ranking) {
        if (ra - rb).abs() < 50 {
            score += 5.0;
        }
    }

    score.min(100.0)
}

/// Human-readable factors behind a pairwise similarity score
pub fn similarity_factors(a: &Program, b: &Program) -> Vec<String> {
    let mut factors = Vec::new();

    let field_a = a.field_of_study.to_lowercase();
    let field_b = b.field_of_study.to_lowercase();
    if field_a == field_b {
        factors.push("Same field of study".to_string());
    } else if field_a.contains(&field_b) || field_b.contains(&field_a) {
        factors.push("Related field of study".to_string());
    }

    if a.degree_level == b.degree_level {
        factors.push(format!("Same degree level ({})", a.degree_level));
    }

    if a.language.eq_ignore_ascii_case(&b.language) {
        factors.push(format!("Taught in {}", a.language));
    }

    if let (Some(da), Some(db)) = (a.duration_years, b.duration_years) {
        if (da - db).abs() < f64::EPSILON {
            factors.push("Same duration".to_string());
        }
    }

    if factors.is_empty() {
        factors.push("General similarity".to_string());
    }

    factors
}

/// Similarity between a free-text field name and a program's field, 0 to 100.
///
/// Tiered: exact match, substring containment, shared words, unrelated.
pub fn field_similarity(query: &str, field: &str) -> f64 {
    let query = query.to_lowercase();
    let field = field.to_lowercase();

    if query == field {
        return 100.0;
    }

    if query.contains(&field) || field.contains(&query) {
        return 80.0;
    }

    let query_words: HashSet<&str> = query.split_whitespace().collect();
    let field_words: HashSet<&str> = field.split_whitespace().collect();
    if query_words.intersection(&field_words).next().is_some() {
        return 60.0;
    }

    40.0
}

fn sort_by_similarity_desc(similar: &mut [SimilarProgram]) {
    similar.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DegreeLevel;
    use crate::stores::MemoryCatalog;

    fn program(id: i64, field: &str, degree_level: DegreeLevel) -> Program {
        Program {
            id,
            university_id: 1,
            name: format!("Program {}", id),
            university_name: "Test University".to_string(),
            country: "Germany".to_string(),
            degree_level,
            field_of_study: field.to_string(),
            duration_years: Some(2.0),
            language: "English".to_string(),
            tuition_fee: Some(10000.0),
            currency: "EUR".to_string(),
            is_active: true,
            world_ranking: Some(100),
            requirements: vec![],
        }
    }

    #[test]
    fn test_identical_attributes_score_100() {
        let a = program(1, "Computer Science", DegreeLevel::Master);
        let b = program(2, "Computer Science", DegreeLevel::Master);

        // 40 field + 30 degree + 15 language + 10 duration + 5 ranking
        assert_eq!(program_similarity(&a, &b), 100.0);
    }

    #[test]
    fn test_substring_field_scores_20() {
        let a = program(1, "Science", DegreeLevel::Master);
        let mut b = program(2, "Computer Science", DegreeLevel::Bachelor);
        b.language = "German".to_string();
        b.duration_years = Some(3.0);
        b.world_ranking = Some(500);

        assert_eq!(program_similarity(&a, &b), 20.0);
    }

    #[test]
    fn test_ranking_bonus_requires_both_rankings() {
        let a = program(1, "Computer Science", DegreeLevel::Master);
        let mut b = program(2, "Computer Science", DegreeLevel::Master);
        b.world_ranking = None;

        assert_eq!(program_similarity(&a, &b), 95.0);
    }

    #[test]
    fn test_field_similarity_tiers() {
        assert_eq!(field_similarity("Computer Science", "Computer Science"), 100.0);
        assert_eq!(field_similarity("computer", "Computer Science"), 80.0);
        assert_eq!(field_similarity("Data Science", "Computer Science"), 60.0);
        assert_eq!(field_similarity("History", "Computer Science"), 40.0);
    }

    #[test]
    fn test_similarity_factors_list_shared_attributes() {
        let a = program(1, "Computer Science", DegreeLevel::Master);
        let b = program(2, "Computer Science", DegreeLevel::Master);

        let factors = similarity_factors(&a, &b);
        assert!(factors.contains(&"Same field of study".to_string()));
        assert!(factors.contains(&"Same degree level (master)".to_string()));
        assert!(factors.contains(&"Taught in English".to_string()));
        assert!(factors.contains(&"Same duration".to_string()));
    }

    #[tokio::test]
    async fn test_similar_programs_excludes_base_and_unrelated() {
        let catalog = Arc::new(MemoryCatalog::new(vec![
            program(1, "Computer Science", DegreeLevel::Master),
            program(2, "Computer Science", DegreeLevel::Master),
            program(3, "History", DegreeLevel::Phd),
        ]));
        let svc = SimilarityService::new(catalog);

        let similar = svc.similar_programs(1, 10).await.unwrap();

        let ids: Vec<i64> = similar.iter().map(|s| s.program.program_id).collect();
        assert_eq!(ids, vec![2]);
        assert_eq!(similar[0].similarity_score, 100.0);
        assert_eq!(similar[0].recommendation_reasons, vec!["Similar to Program 1"]);
    }

    #[tokio::test]
    async fn test_similar_programs_missing_base_is_not_found() {
        let catalog = Arc::new(MemoryCatalog::new(vec![]));
        let svc = SimilarityService::new(catalog);

        let result = svc.similar_programs(404, 10).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_field_search_filters_below_threshold() {
        let catalog = Arc::new(MemoryCatalog::new(vec![
            program(1, "Computer Science", DegreeLevel::Master),
            program(2, "Data Science", DegreeLevel::Master),
            program(3, "History", DegreeLevel::Master),
        ]));
        let svc = SimilarityService::new(catalog);

        let similar = svc
            .similar_programs_by_field("Computer Science", 10)
            .await
            .unwrap();

        let ids: Vec<i64> = similar.iter().map(|s| s.program.program_id).collect();
        // Exact 100, shared-word 60, unrelated 40 dropped
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_field_search_rejects_empty_field() {
        let catalog = Arc::new(MemoryCatalog::new(vec![]));
        let svc = SimilarityService::new(catalog);

        let result = svc.similar_programs_by_field("  ", 10).await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_field_search_respects_limit() {
        let catalog = Arc::new(MemoryCatalog::new(vec![
            program(1, "Computer Science", DegreeLevel::Master),
            program(2, "Computer Science", DegreeLevel::Bachelor),
            program(3, "Computer Science", DegreeLevel::Phd),
        ]));
        let svc = SimilarityService::new(catalog);

        let similar = svc
            .similar_programs_by_field("Computer Science", 2)
            .await
            .unwrap();
        assert_eq!(similar.len(), 2);
    }
}
