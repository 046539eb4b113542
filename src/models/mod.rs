use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Degree level for programs and completed qualifications
///
/// Levels form a fixed total order used when checking degree requirements.
/// Diploma and certificate share a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegreeLevel {
    HighSchool,
    Diploma,
    Certificate,
    Bachelor,
    Master,
    Phd,
}

impl DegreeLevel {
    /// Rank in the degree hierarchy (higher outranks lower)
    pub fn rank(&self) -> u8 {
        match self {
            DegreeLevel::HighSchool => 1,
            DegreeLevel::Diploma | DegreeLevel::Certificate => 2,
            DegreeLevel::Bachelor => 3,
            DegreeLevel::Master => 4,
            DegreeLevel::Phd => 5,
        }
    }

    /// Parses the snake_case form used in requirement values and the database
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high_school" => Some(DegreeLevel::HighSchool),
            "diploma" => Some(DegreeLevel::Diploma),
            "certificate" => Some(DegreeLevel::Certificate),
            "bachelor" => Some(DegreeLevel::Bachelor),
            "master" => Some(DegreeLevel::Master),
            "phd" => Some(DegreeLevel::Phd),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DegreeLevel::HighSchool => "high_school",
            DegreeLevel::Diploma => "diploma",
            DegreeLevel::Certificate => "certificate",
            DegreeLevel::Bachelor => "bachelor",
            DegreeLevel::Master => "master",
            DegreeLevel::Phd => "phd",
        }
    }
}

impl std::fmt::Display for DegreeLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How strongly a user cares about a field of study
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterestLevel {
    Low,
    Medium,
    High,
}

/// A completed or in-progress academic qualification on a user's profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Qualification {
    pub qualification_type: DegreeLevel,
    pub institution_name: String,
    pub field_of_study: String,
    /// Grade point as recorded, e.g. "3.8" - stored as text upstream
    pub grade_point: Option<String>,
    /// Scale maximum, e.g. "4.0"; assumed 4.0 when absent
    pub max_grade_point: Option<String>,
    pub completion_year: Option<i32>,
    pub is_completed: bool,
}

/// A declared field-of-study interest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interest {
    pub field_of_study: String,
    pub interest_level: InterestLevel,
}

/// A standardized test result on a user's profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestScore {
    pub test_type: String,
    /// Score as recorded, e.g. "320" or "7.5" - stored as text upstream
    pub score: String,
    pub max_score: Option<String>,
    pub test_date: Option<NaiveDate>,
    /// Scores past this date are never usable as evidence
    pub expiry_date: Option<NaiveDate>,
}

/// Read-only snapshot of a user and the evidence attached to their profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub qualifications: Vec<Qualification>,
    pub interests: Vec<Interest>,
    pub test_scores: Vec<TestScore>,
}

/// Kind of admission requirement attached to a program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementType {
    TestScore,
    Gpa,
    DegreeLevel,
    Language,
}

impl RequirementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementType::TestScore => "test_score",
            RequirementType::Gpa => "gpa",
            RequirementType::DegreeLevel => "degree_level",
            RequirementType::Language => "language",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "test_score" => Some(RequirementType::TestScore),
            "gpa" => Some(RequirementType::Gpa),
            "degree_level" => Some(RequirementType::DegreeLevel),
            "language" => Some(RequirementType::Language),
            _ => None,
        }
    }
}

/// One admission criterion attached to a program
///
/// Requirement records are externally authored and can be malformed; the
/// evaluator degrades unparsable values to "not met" rather than failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub id: i64,
    pub requirement_type: RequirementType,
    /// Target value, parsed per requirement type ("320", "3.5", "bachelor")
    pub value: String,
    /// Test type when applicable; inferred from description when absent
    pub test_type: Option<String>,
    pub is_mandatory: bool,
    pub description: Option<String>,
}

/// Flattened catalog snapshot of a program with its university joined in
///
/// The engine only ever sees this denormalized form, so scoring never has
/// to resolve university or region lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub id: i64,
    pub university_id: i64,
    pub name: String,
    pub university_name: String,
    pub country: String,
    pub degree_level: DegreeLevel,
    pub field_of_study: String,
    pub duration_years: Option<f64>,
    pub language: String,
    pub tuition_fee: Option<f64>,
    pub currency: String,
    pub is_active: bool,
    pub world_ranking: Option<i32>,
    pub requirements: Vec<Requirement>,
}

/// The program fields echoed back on every recommendation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSummary {
    pub program_id: i64,
    pub program_name: String,
    pub university_name: String,
    pub country: String,
    pub field_of_study: String,
    pub degree_level: DegreeLevel,
    pub tuition_fee: Option<f64>,
    pub currency: String,
    pub language: String,
}

impl From<&Program> for ProgramSummary {
    fn from(program: &Program) -> Self {
        Self {
            program_id: program.id,
            program_name: program.name.clone(),
            university_name: program.university_name.clone(),
            country: program.country.clone(),
            field_of_study: program.field_of_study.clone(),
            degree_level: program.degree_level,
            tuition_fee: program.tuition_fee,
            currency: program.currency.clone(),
            language: program.language.clone(),
        }
    }
}

/// User-side evidence value matched against a requirement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserValue {
    Number(f64),
    Text(String),
}

/// Outcome of evaluating a single requirement against a user's evidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequirementResult {
    pub requirement_id: i64,
    pub requirement_type: RequirementType,
    pub requirement_value: String,
    pub is_mandatory: bool,
    pub is_met: bool,
    pub user_value: Option<UserValue>,
    pub details: String,
}

/// Persisted verdict for one (user, program) pair
///
/// Exactly one row exists per pair; re-checks overwrite in place and always
/// refresh `last_checked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualificationStatus {
    pub user_id: i64,
    pub program_id: i64,
    pub is_qualified: bool,
    pub qualification_score: f64,
    pub requirements_met: u32,
    pub total_requirements: u32,
    pub missing_requirements: Vec<RequirementResult>,
    pub last_checked: DateTime<Utc>,
}

/// Full response for a single qualification check, including per-requirement
/// detail the persisted status does not keep
#[derive(Debug, Clone, Serialize)]
pub struct QualificationCheck {
    pub user_id: i64,
    pub program_id: i64,
    pub program_name: String,
    pub university_name: String,
    pub is_qualified: bool,
    pub qualification_score: f64,
    pub requirements_met: u32,
    pub total_requirements: u32,
    pub missing_requirements: Vec<RequirementResult>,
    pub detailed_results: Vec<RequirementResult>,
    pub checked_at: DateTime<Utc>,
}

/// One bucket entry in a user's qualification summary
#[derive(Debug, Clone, Serialize)]
pub struct SummaryEntry {
    pub program_id: i64,
    pub qualification_score: f64,
    pub missing_requirements: Vec<RequirementResult>,
    pub last_checked: DateTime<Utc>,
}

/// Persisted statuses for a user, bucketed by outcome
#[derive(Debug, Clone, Serialize)]
pub struct QualificationSummary {
    pub user_id: i64,
    pub qualified_programs: Vec<SummaryEntry>,
    pub partially_qualified: Vec<SummaryEntry>,
    pub not_qualified: Vec<SummaryEntry>,
    pub total_programs_checked: usize,
}

/// Which evidence source nominated a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    InterestBased,
    QualificationBased,
    TestScoreBased,
    MultiSource,
}

/// Candidate produced by one signal generator, before combination
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationCandidate {
    pub program: ProgramSummary,
    /// Raw per-source match score in [0, 100]
    pub match_score: f64,
    pub matching_factors: Vec<String>,
    pub recommendation_reasons: Vec<String>,
    pub source: RecommendationSource,
}

/// Final recommendation after weighted combination and filter adjustments
#[derive(Debug, Clone, Serialize)]
pub struct RankedRecommendation {
    #[serde(flatten)]
    pub program: ProgramSummary,
    pub final_score: f64,
    pub recommendation_type: RecommendationSource,
    pub matching_factors: Vec<String>,
    pub recommendation_reasons: Vec<String>,
}

/// A program returned by the similarity queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarProgram {
    #[serde(flatten)]
    pub program: ProgramSummary,
    pub similarity_score: f64,
    pub matching_factors: Vec<String>,
    pub recommendation_reasons: Vec<String>,
}

/// Caller-supplied constraints for a recommendation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationFilters {
    pub preferred_countries: Option<Vec<String>>,
    pub preferred_fields: Option<Vec<String>>,
    pub degree_level: Option<DegreeLevel>,
    pub max_tuition_fee: Option<f64>,
    pub language_preference: Option<String>,
}

/// How many candidates each generator produced for a request
#[derive(Debug, Clone, Serialize)]
pub struct SourceCounts {
    pub interest_based: usize,
    pub qualification_based: usize,
    pub test_score_based: usize,
}

/// Full recommendation response returned to the API layer
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResponse {
    pub user_id: i64,
    pub recommendations: Vec<RankedRecommendation>,
    pub total_recommendations: usize,
    pub recommendation_sources: SourceCounts,
    pub filters_applied: RecommendationFilters,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degree_rank_ordering() {
        assert!(DegreeLevel::HighSchool.rank() < DegreeLevel::Diploma.rank());
        assert!(DegreeLevel::Diploma.rank() < DegreeLevel::Bachelor.rank());
        assert!(DegreeLevel::Bachelor.rank() < DegreeLevel::Master.rank());
        assert!(DegreeLevel::Master.rank() < DegreeLevel::Phd.rank());
    }

    #[test]
    fn test_diploma_and_certificate_share_rank() {
        assert_eq!(DegreeLevel::Diploma.rank(), DegreeLevel::Certificate.rank());
    }

    #[test]
    fn test_degree_level_parse() {
        assert_eq!(DegreeLevel::parse("bachelor"), Some(DegreeLevel::Bachelor));
        assert_eq!(DegreeLevel::parse(" PhD "), Some(DegreeLevel::Phd));
        assert_eq!(DegreeLevel::parse("associate"), None);
    }

    #[test]
    fn test_degree_level_serde_snake_case() {
        let json = serde_json::to_string(&DegreeLevel::HighSchool).unwrap();
        assert_eq!(json, r#""high_school""#);

        let parsed: DegreeLevel = serde_json::from_str(r#""master""#).unwrap();
        assert_eq!(parsed, DegreeLevel::Master);
    }

    #[test]
    fn test_recommendation_source_serde() {
        let json = serde_json::to_string(&RecommendationSource::MultiSource).unwrap();
        assert_eq!(json, r#""multi_source""#);
    }

    #[test]
    fn test_user_value_serde_untagged() {
        let number = serde_json::to_string(&UserValue::Number(3.8)).unwrap();
        assert_eq!(number, "3.8");

        let text = serde_json::to_string(&UserValue::Text("bachelor".to_string())).unwrap();
        assert_eq!(text, r#""bachelor""#);
    }

    #[test]
    fn test_program_summary_from_program() {
        let program = Program {
            id: 7,
            university_id: 2,
            name: "MSc Computer Science".to_string(),
            university_name: "ETH Zurich".to_string(),
            country: "Switzerland".to_string(),
            degree_level: DegreeLevel::Master,
            field_of_study: "Computer Science".to_string(),
            duration_years: Some(2.0),
            language: "English".to_string(),
            tuition_fee: Some(1500.0),
            currency: "CHF".to_string(),
            is_active: true,
            world_ranking: Some(9),
            requirements: vec![],
        };

        let summary = ProgramSummary::from(&program);
        assert_eq!(summary.program_id, 7);
        assert_eq!(summary.university_name, "ETH Zurich");
        assert_eq!(summary.degree_level, DegreeLevel::Master);
        assert_eq!(summary.tuition_fee, Some(1500.0));
    }
}
