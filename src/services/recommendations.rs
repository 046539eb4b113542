use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::{
    error::{AppError, AppResult},
    models::{
        Interest, InterestLevel, Program, ProgramSummary, RankedRecommendation,
        RecommendationCandidate, RecommendationFilters, RecommendationResponse,
        RecommendationSource, RequirementType, SourceCounts, TestScore, UserProfile,
    },
    services::qualification::{QualificationService, PARTIAL_MATCH_THRESHOLD},
    services::requirements,
    stores::{Catalog, ProfileStore, StatusStore},
};

/// Per-source weights applied when combining candidate lists.
///
/// Deliberately not normalized: a program nominated by several sources can
/// outscore any single source's raw maximum, rewarding multi-signal
/// agreement.
const INTEREST_WEIGHT: f64 = 0.4;
const QUALIFICATION_WEIGHT: f64 = 0.5;
const TEST_SCORE_WEIGHT: f64 = 0.3;

/// Minimum test-score match value a candidate needs to be emitted
const TEST_SCORE_CUTOFF: f64 = 50.0;

/// Match value assigned when a program has no matchable test requirements
const TEST_SCORE_BASELINE: f64 = 60.0;

/// Generates ranked program recommendations from interest, qualification,
/// and test-score signals
pub struct RecommendationService {
    catalog: Arc<dyn Catalog>,
    profiles: Arc<dyn ProfileStore>,
    statuses: Arc<dyn StatusStore>,
    qualification: Arc<QualificationService>,
    status_ttl_minutes: i64,
}

impl RecommendationService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        profiles: Arc<dyn ProfileStore>,
        statuses: Arc<dyn StatusStore>,
        qualification: Arc<QualificationService>,
        status_ttl_minutes: i64,
    ) -> Self {
        Self {
            catalog,
            profiles,
            statuses,
            qualification,
            status_ttl_minutes,
        }
    }

    /// Produces the final ranked recommendation list for a user.
    ///
    /// Refreshes stale qualification statuses, runs the three signal
    /// generators, combines their candidates, and applies the caller's
    /// filters. A profile with no usable signals yields an empty but
    /// successful response; only a missing user is an error.
    pub async fn recommendations(
        &self,
        user_id: i64,
        filters: RecommendationFilters,
        limit: usize,
    ) -> AppResult<RecommendationResponse> {
        let user = self
            .profiles
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        let programs = self.catalog.list_active_programs().await?;

        self.refresh_stale_statuses(&user, &programs).await;

        // Each generator over-fetches so the combiner has enough overlap
        // to work with before the final cut
        let fetch = limit.saturating_mul(2);
        let today = Utc::now().date_naive();

        let interest = Self::interest_candidates(&user, &programs, &filters, fetch);
        let qualification = match self.qualification_candidates(user_id, fetch).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Qualification signal unavailable");
                vec![]
            }
        };
        let test_score =
            Self::test_score_candidates(&user, &programs, &filters, fetch, today);

        let recommendation_sources = SourceCounts {
            interest_based: interest.len(),
            qualification_based: qualification.len(),
            test_score_based: test_score.len(),
        };

        let mut recommendations = Self::combine(interest, qualification, test_score, &filters);
        recommendations.truncate(limit);

        tracing::info!(
            user_id,
            total = recommendations.len(),
            interest = recommendation_sources.interest_based,
            qualification = recommendation_sources.qualification_based,
            test_score = recommendation_sources.test_score_based,
            "Recommendations generated"
        );

        Ok(RecommendationResponse {
            user_id,
            total_recommendations: recommendations.len(),
            recommendations,
            recommendation_sources,
            filters_applied: filters,
        })
    }

    /// Re-checks statuses that are missing or older than the TTL.
    ///
    /// Best effort: a failed refresh is logged and the request proceeds
    /// with whatever statuses exist.
    async fn refresh_stale_statuses(&self, user: &UserProfile, programs: &[Program]) {
        let cutoff = Utc::now() - chrono::Duration::minutes(self.status_ttl_minutes);

        let existing: HashMap<i64, chrono::DateTime<Utc>> =
            match self.statuses.list_statuses(user.id).await {
                Ok(statuses) => statuses
                    .into_iter()
                    .map(|s| (s.program_id, s.last_checked))
                    .collect(),
                Err(e) => {
                    tracing::warn!(user_id = user.id, error = %e, "Status refresh skipped");
                    return;
                }
            };

        let mut refreshed = 0usize;
        for program in programs {
            let stale = existing
                .get(&program.id)
                .map(|checked| *checked < cutoff)
                .unwrap_or(true);

            if stale {
                match self.qualification.check_program(user, program).await {
                    Ok(_) => refreshed += 1,
                    Err(e) => tracing::warn!(
                        user_id = user.id,
                        program_id = program.id,
                        error = %e,
                        "Qualification refresh failed"
                    ),
                }
            }
        }

        if refreshed > 0 {
            tracing::info!(user_id = user.id, refreshed, "Qualification statuses refreshed");
        }
    }

    /// Interest-based signal: programs whose field matches the user's
    /// declared interests, weighted by interest level
    fn interest_candidates(
        user: &UserProfile,
        programs: &[Program],
        filters: &RecommendationFilters,
        limit: usize,
    ) -> Vec<RecommendationCandidate> {
        if user.interests.is_empty() {
            return vec![];
        }

        let preferred_fields = filters.preferred_fields.as_deref().unwrap_or(&[]);

        let mut candidates: Vec<RecommendationCandidate> = programs
            .iter()
            .filter(|p| {
                filters
                    .degree_level
                    .map(|level| p.degree_level == level)
                    .unwrap_or(true)
            })
            .filter_map(|program| {
                let match_score =
                    Self::interest_match_score(&user.interests, program, preferred_fields);
                if match_score <= 0.0 {
                    return None;
                }

                Some(RecommendationCandidate {
                    program: ProgramSummary::from(program),
                    match_score,
                    matching_factors: Self::interest_matching_factors(&user.interests, program),
                    recommendation_reasons: vec![format!(
                        "Matches your interest in {}",
                        program.field_of_study
                    )],
                    source: RecommendationSource::InterestBased,
                })
            })
            .collect();

        sort_by_score_desc(&mut candidates);
        candidates.truncate(limit);
        candidates
    }

    /// Scores one program against the user's interests and any caller
    /// preferred fields, capped at 100
    fn interest_match_score(
        interests: &[Interest],
        program: &Program,
        preferred_fields: &[String],
    ) -> f64 {
        let field = program.field_of_study.to_lowercase();
        let mut score: f64 = 0.0;

        // Exact field match first, weighted by interest level
        for interest in interests {
            if interest.field_of_study.to_lowercase() == field {
                score += match interest.interest_level {
                    InterestLevel::High => 90.0,
                    InterestLevel::Medium => 70.0,
                    InterestLevel::Low => 50.0,
                };
                break;
            }
        }

        // Fall back to a substring match at lower value
        if score == 0.0 {
            for interest in interests {
                let interest_field = interest.field_of_study.to_lowercase();
                if field.contains(&interest_field) || interest_field.contains(&field) {
                    score += match interest.interest_level {
                        InterestLevel::High => 60.0,
                        InterestLevel::Medium => 40.0,
                        InterestLevel::Low => 25.0,
                    };
                    break;
                }
            }
        }

        // Caller preferred fields add a bonus on top
        for preferred in preferred_fields {
            let preferred = preferred.to_lowercase();
            if preferred == field {
                score += 20.0;
                break;
            } else if field.contains(&preferred) || preferred.contains(&field) {
                score += 10.0;
                break;
            }
        }

        score.min(100.0)
    }

    fn interest_matching_factors(interests: &[Interest], program: &Program) -> Vec<String> {
        let field = program.field_of_study.to_lowercase();
        let mut factors = Vec::new();

        for interest in interests {
            let interest_field = interest.field_of_study.to_lowercase();
            if interest_field == field {
                let level = match interest.interest_level {
                    InterestLevel::High => "high",
                    InterestLevel::Medium => "medium",
                    InterestLevel::Low => "low",
                };
                factors.push(format!(
                    "Direct match with your {} interest in {}",
                    level, interest.field_of_study
                ));
            } else if field.contains(&interest_field) || interest_field.contains(&field) {
                factors.push(format!(
                    "Related to your interest in {}",
                    interest.field_of_study
                ));
            }
        }

        if factors.is_empty() {
            factors.push("General field match".to_string());
        }

        factors
    }

    /// Qualification-based signal: programs with a persisted status that is
    /// qualified or at least a partial match, scored by the stored value
    async fn qualification_candidates(
        &self,
        user_id: i64,
        limit: usize,
    ) -> AppResult<Vec<RecommendationCandidate>> {
        let mut statuses = self.statuses.list_statuses(user_id).await?;
        statuses.retain(|s| {
            s.is_qualified || s.qualification_score >= PARTIAL_MATCH_THRESHOLD
        });
        statuses.sort_by(|a, b| {
            b.qualification_score
                .partial_cmp(&a.qualification_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        statuses.truncate(limit);

        let mut candidates = Vec::with_capacity(statuses.len());
        for status in statuses {
            let Some(program) = self.catalog.get_program(status.program_id).await? else {
                tracing::warn!(
                    user_id,
                    program_id = status.program_id,
                    "Status references a missing program"
                );
                continue;
            };

            let reason = if status.is_qualified {
                "You meet all requirements for this program".to_string()
            } else {
                "You have a high qualification match for this program".to_string()
            };

            candidates.push(RecommendationCandidate {
                program: ProgramSummary::from(&program),
                match_score: status.qualification_score,
                matching_factors: vec!["High qualification match".to_string()],
                recommendation_reasons: vec![
                    reason,
                    format!("Qualification score: {}", status.qualification_score),
                ],
                source: RecommendationSource::QualificationBased,
            });
        }

        Ok(candidates)
    }

    /// Test-score signal: programs whose test and language requirements the
    /// user's valid scores are competitive for
    fn test_score_candidates(
        user: &UserProfile,
        programs: &[Program],
        filters: &RecommendationFilters,
        limit: usize,
        today: NaiveDate,
    ) -> Vec<RecommendationCandidate> {
        if user.test_scores.is_empty() {
            return vec![];
        }

        let mut candidates: Vec<RecommendationCandidate> = programs
            .iter()
            .filter(|p| {
                filters
                    .degree_level
                    .map(|level| p.degree_level == level)
                    .unwrap_or(true)
            })
            .filter_map(|program| {
                let match_score = Self::test_score_match(&user.test_scores, program, today);
                if match_score <= TEST_SCORE_CUTOFF {
                    return None;
                }

                Some(RecommendationCandidate {
                    program: ProgramSummary::from(program),
                    match_score,
                    matching_factors: vec!["Test score compatibility".to_string()],
                    recommendation_reasons: vec![
                        "Your test scores are competitive for this program".to_string(),
                    ],
                    source: RecommendationSource::TestScoreBased,
                })
            })
            .collect();

        sort_by_score_desc(&mut candidates);
        candidates.truncate(limit);
        candidates
    }

    /// Mean match value over the program's matchable test and language
    /// requirements.
    ///
    /// A met requirement contributes 100; an unmet one contributes
    /// proportional partial credit `min(100, 95 * user/target)`, which
    /// stays below full marks for under-qualified candidates. Programs
    /// without matchable requirements get a flat baseline.
    fn test_score_match(test_scores: &[TestScore], program: &Program, today: NaiveDate) -> f64 {
        let requirements: Vec<_> = program
            .requirements
            .iter()
            .filter(|r| {
                matches!(
                    r.requirement_type,
                    RequirementType::TestScore | RequirementType::Language
                )
            })
            .collect();

        if requirements.is_empty() {
            return TEST_SCORE_BASELINE;
        }

        let mut total = 0.0;
        let mut matched = 0usize;

        for req in requirements {
            let test_type = req
                .test_type
                .clone()
                .or_else(|| requirements::extract_test_type(req.description.as_deref()));
            let target = req.value.trim().parse::<f64>().ok();

            let (Some(test_type), Some(target)) = (test_type, target) else {
                continue;
            };
            if target <= 0.0 {
                continue;
            }

            let Some(user_score) = Self::best_valid_score(test_scores, &test_type, today) else {
                continue;
            };

            if user_score >= target {
                total += 100.0;
            } else {
                total += (95.0 * user_score / target).min(100.0);
            }
            matched += 1;
        }

        if matched == 0 {
            return TEST_SCORE_BASELINE;
        }

        total / matched as f64
    }

    /// Best unexpired numeric score the user holds for a test type
    fn best_valid_score(test_scores: &[TestScore], test_type: &str, today: NaiveDate) -> Option<f64> {
        test_scores
            .iter()
            .filter(|s| s.test_type.eq_ignore_ascii_case(test_type))
            .filter(|s| s.expiry_date.map(|d| d > today).unwrap_or(true))
            .filter_map(|s| s.score.trim().parse::<f64>().ok())
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
    }

    /// Merges the three candidate lists into one ranked result.
    ///
    /// Candidates are keyed by program id; each source adds its weighted
    /// contribution, so multi-source programs accumulate score. Country,
    /// budget, and language adjustments apply once per merged candidate,
    /// multiplicatively and in that order.
    fn combine(
        interest: Vec<RecommendationCandidate>,
        qualification: Vec<RecommendationCandidate>,
        test_score: Vec<RecommendationCandidate>,
        filters: &RecommendationFilters,
    ) -> Vec<RankedRecommendation> {
        let mut order: Vec<i64> = Vec::new();
        let mut merged: HashMap<i64, RankedRecommendation> = HashMap::new();

        for (candidates, weight) in [
            (interest, INTEREST_WEIGHT),
            (qualification, QUALIFICATION_WEIGHT),
            (test_score, TEST_SCORE_WEIGHT),
        ] {
            for candidate in candidates {
                let program_id = candidate.program.program_id;
                let contribution = candidate.match_score * weight;

                match merged.get_mut(&program_id) {
                    Some(existing) => {
                        existing.final_score += contribution;
                        existing.matching_factors.extend(candidate.matching_factors);
                        existing
                            .recommendation_reasons
                            .extend(candidate.recommendation_reasons);
                        existing.recommendation_type = RecommendationSource::MultiSource;
                    }
                    None => {
                        order.push(program_id);
                        merged.insert(
                            program_id,
                            RankedRecommendation {
                                program: candidate.program,
                                final_score: contribution,
                                recommendation_type: candidate.source,
                                matching_factors: candidate.matching_factors,
                                recommendation_reasons: candidate.recommendation_reasons,
                            },
                        );
                    }
                }
            }
        }

        let mut recommendations: Vec<RankedRecommendation> = order
            .into_iter()
            .filter_map(|id| merged.remove(&id))
            .map(|mut rec| {
                rec.final_score = Self::apply_filter_adjustments(&rec, filters);
                dedupe_preserving_order(&mut rec.matching_factors);
                dedupe_preserving_order(&mut rec.recommendation_reasons);
                rec
            })
            .collect();

        // Stable sort: ties keep first-seen order
        sort_ranked_desc(&mut recommendations);
        recommendations
    }

    fn apply_filter_adjustments(
        rec: &RankedRecommendation,
        filters: &RecommendationFilters,
    ) -> f64 {
        let mut score = rec.final_score;

        if let Some(countries) = filters
            .preferred_countries
            .as_deref()
            .filter(|c| !c.is_empty())
        {
            if countries.iter().any(|c| c == &rec.program.country) {
                score *= 1.2;
            } else {
                score *= 0.7;
            }
        }

        if let (Some(max_fee), Some(fee)) = (filters.max_tuition_fee, rec.program.tuition_fee) {
            if fee > max_fee {
                score *= 0.5;
            }
        }

        if let Some(language) = &filters.language_preference {
            if language == &rec.program.language {
                score *= 1.1;
            }
        }

        score
    }
}

fn sort_by_score_desc(candidates: &mut [RecommendationCandidate]) {
    candidates.sort_by(|a, b| {
        b.match_score
            .partial_cmp(&a.match_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn sort_ranked_desc(recommendations: &mut [RankedRecommendation]) {
    recommendations.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn dedupe_preserving_order(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}
