use chrono::NaiveDate;

use crate::models::{Qualification, Requirement, RequirementResult, RequirementType, TestScore, UserValue};

/// Test types recognized when inferring from a requirement description
pub const TEST_TYPES: [&str; 9] = [
    "IELTS", "TOEFL", "GRE", "GMAT", "SAT", "ACT", "PTE", "TOEIC", "GOV",
];

/// Subset of test types accepted as language proficiency evidence
const LANGUAGE_TESTS: [&str; 4] = ["IELTS", "TOEFL", "TOEIC", "PTE"];

/// Outcome of one requirement check before it is folded into a result
struct Verdict {
    is_met: bool,
    user_value: Option<UserValue>,
    details: String,
}

impl Verdict {
    fn unmet(details: impl Into<String>) -> Self {
        Self {
            is_met: false,
            user_value: None,
            details: details.into(),
        }
    }
}

/// Evaluates a single admission requirement against a user's evidence.
///
/// Never fails: missing evidence and unparsable requirement values both
/// degrade to "not met" with an explanatory detail string. Requirement
/// records are externally authored, so malformed values are an expected
/// input, not an exception.
pub fn evaluate(
    requirement: &Requirement,
    test_scores: &[TestScore],
    qualifications: &[Qualification],
    today: NaiveDate,
) -> RequirementResult {
    let verdict = match requirement.requirement_type {
        RequirementType::TestScore => check_test_score(requirement, test_scores, None, today),
        RequirementType::Gpa => check_gpa(requirement, qualifications),
        RequirementType::DegreeLevel => check_degree_level(requirement, qualifications),
        RequirementType::Language => check_language(requirement, test_scores, today),
    };

    RequirementResult {
        requirement_id: requirement.id,
        requirement_type: requirement.requirement_type,
        requirement_value: requirement.value.clone(),
        is_mandatory: requirement.is_mandatory,
        is_met: verdict.is_met,
        user_value: verdict.user_value,
        details: verdict.details,
    }
}

/// Extracts a test type from free-text requirement description, if any of
/// the known vocabulary appears in it
pub fn extract_test_type(description: Option<&str>) -> Option<String> {
    let description = description?.to_uppercase();
    TEST_TYPES
        .iter()
        .find(|t| description.contains(*t))
        .map(|t| t.to_string())
}

fn check_test_score(
    requirement: &Requirement,
    test_scores: &[TestScore],
    forced_type: Option<&str>,
    today: NaiveDate,
) -> Verdict {
    let Ok(required_score) = requirement.value.trim().parse::<f64>() else {
        return Verdict::unmet(format!(
            "Requirement value '{}' is not numeric",
            requirement.value
        ));
    };

    let test_type = match forced_type {
        Some(t) => Some(t.to_string()),
        None => requirement
            .test_type
            .clone()
            .or_else(|| extract_test_type(requirement.description.as_deref())),
    };

    let Some(test_type) = test_type else {
        return Verdict::unmet("No test type specified or recognized");
    };

    let matching: Vec<&TestScore> = test_scores
        .iter()
        .filter(|s| s.test_type.eq_ignore_ascii_case(&test_type))
        .collect();

    if matching.is_empty() {
        return Verdict::unmet(format!("No {} score found", test_type));
    }

    // Expired scores are never usable as evidence
    let valid: Vec<&TestScore> = matching
        .into_iter()
        .filter(|s| s.expiry_date.map(|d| d > today).unwrap_or(true))
        .collect();

    if valid.is_empty() {
        return Verdict::unmet(format!("All {} scores have expired", test_type));
    }

    let best = valid
        .iter()
        .filter_map(|s| s.score.trim().parse::<f64>().ok())
        .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.max(v))));

    let Some(user_score) = best else {
        return Verdict::unmet(format!("No valid {} score found", test_type));
    };

    Verdict {
        is_met: user_score >= required_score,
        user_value: Some(UserValue::Number(user_score)),
        details: format!(
            "{}: {} (required: {})",
            test_type, user_score, required_score
        ),
    }
}

fn check_gpa(requirement: &Requirement, qualifications: &[Qualification]) -> Verdict {
    let Ok(required_gpa) = requirement.value.trim().parse::<f64>() else {
        return Verdict::unmet(format!(
            "Requirement value '{}' is not numeric",
            requirement.value
        ));
    };

    let completed: Vec<&Qualification> = qualifications
        .iter()
        .filter(|q| q.is_completed && q.grade_point.is_some())
        .collect();

    if completed.is_empty() {
        return Verdict::unmet("No completed qualifications with GPA found");
    }

    // Normalize every grade to a 4.0 scale and keep the best; entries whose
    // grade points do not parse are skipped
    let mut highest_gpa: Option<f64> = None;
    let mut best_institution: Option<&str> = None;

    for qual in &completed {
        let Some(gpa) = qual.grade_point.as_deref().and_then(|g| g.trim().parse::<f64>().ok())
        else {
            continue;
        };
        let max_gpa = qual
            .max_grade_point
            .as_deref()
            .and_then(|m| m.trim().parse::<f64>().ok())
            .unwrap_or(4.0);

        let normalized = (gpa / max_gpa) * 4.0;
        if highest_gpa.map_or(true, |h| normalized > h) {
            highest_gpa = Some(normalized);
            best_institution = Some(qual.institution_name.as_str());
        }
    }

    let Some(highest_gpa) = highest_gpa else {
        return Verdict::unmet("No completed qualifications with GPA found");
    };

    Verdict {
        is_met: highest_gpa >= required_gpa,
        user_value: Some(UserValue::Number(highest_gpa)),
        details: format!(
            "GPA: {:.2}/4.0 from {} (required: {})",
            highest_gpa,
            best_institution.unwrap_or("N/A"),
            required_gpa
        ),
    }
}

fn check_degree_level(requirement: &Requirement, qualifications: &[Qualification]) -> Verdict {
    let Some(required_level) = crate::models::DegreeLevel::parse(&requirement.value) else {
        return Verdict::unmet(format!("Unknown degree level '{}'", requirement.value));
    };

    let highest = qualifications
        .iter()
        .filter(|q| q.is_completed)
        .max_by_key(|q| q.qualification_type.rank());

    let Some(highest) = highest else {
        return Verdict::unmet("No completed qualifications found");
    };

    Verdict {
        is_met: highest.qualification_type.rank() >= required_level.rank(),
        user_value: Some(UserValue::Text(
            highest.qualification_type.as_str().to_string(),
        )),
        details: format!(
            "Highest degree: {} (required: {})",
            highest.qualification_type, required_level
        ),
    }
}

fn check_language(requirement: &Requirement, test_scores: &[TestScore], today: NaiveDate) -> Verdict {
    // Any recognized language test passing the numeric check satisfies the
    // requirement; the first one that does wins
    for test in LANGUAGE_TESTS {
        let verdict = check_test_score(requirement, test_scores, Some(test), today);
        if verdict.is_met {
            return verdict;
        }
    }

    Verdict::unmet("No valid language test scores found")
}
