//! Scheme eligibility scoring.
//!
//! Every loaded scheme is scored in one batched generation call. Schemes the
//! model skipped, or all of them when the batch fails, are scored by a simple
//! rule match on the scheme's eligibility text instead.

use crate::models::InferenceRequest;
use crate::orchestrator::InferenceOrchestrator;
use crate::prompts::{extract_json, list_field};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const ELIGIBLE_SCORE: u8 = 50;
const MAX_RESULTS: usize = 5;

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scheme {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub eligibility_rules: Vec<String>,
    #[serde(default)]
    pub documents_required: Vec<String>,
    #[serde(default)]
    pub benefit: String,
    #[serde(default)]
    pub steps: Vec<String>,
    pub category: Option<String>,
    pub state: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub age: Option<u32>,
    pub gender: Option<String>,
    /// Annual income in rupees.
    pub income: Option<u64>,
    pub state: Option<String>,
    pub district: Option<String>,
    pub caste: Option<String>,
    pub occupation: Option<String>,
    pub ration_card: Option<String>,
    pub disability: bool,
    pub married: bool,
    pub education: Option<String>,
    pub bpl_card: bool,
    /// Acres.
    pub farm_size: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResult {
    pub scheme: Scheme,
    pub score: u8,
    pub eligible: bool,
    pub reasons: Vec<String>,
    pub documents_needed: Vec<String>,
    pub how_to_apply: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SchemeFile {
    Bare(Vec<Scheme>),
    Wrapped {
        #[serde(default)]
        schemes: Vec<Scheme>,
    },
}

/// Reads a scheme list stored either as a bare array or as `{"schemes": [...]}`.
/// A missing or malformed file yields no schemes.
pub fn load_schemes(path: &Path) -> Vec<Scheme> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            warn!(path = %path.display(), %error, "scheme file unavailable");
            return Vec::new();
        }
    };

    match serde_json::from_str::<SchemeFile>(&raw) {
        Ok(SchemeFile::Bare(schemes)) | Ok(SchemeFile::Wrapped { schemes }) => {
            info!(count = schemes.len(), "loaded schemes");
            schemes
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "scheme file is malformed");
            Vec::new()
        }
    }
}

pub struct EligibilityScorer {
    orchestrator: Arc<InferenceOrchestrator>,
    schemes: Vec<Scheme>,
}

impl EligibilityScorer {
    pub fn new(orchestrator: Arc<InferenceOrchestrator>, schemes: Vec<Scheme>) -> Self {
        Self { orchestrator, schemes }
    }

    pub fn schemes(&self) -> &[Scheme] {
        &self.schemes
    }

    pub fn scheme(&self, id: &str) -> Option<&Scheme> {
        self.schemes.iter().find(|scheme| scheme.id == id)
    }

    /// Top five schemes by descending score.
    pub async fn check(&self, profile: &UserProfile) -> Vec<EligibilityResult> {
        if self.schemes.is_empty() {
            return vec![unconfigured_result()];
        }

        let request = InferenceRequest::new(batch_prompt(profile, &self.schemes)).json();
        let outcome = self.orchestrator.infer_detailed(&request).await;

        let mut scored = if outcome.is_degraded() {
            HashMap::new()
        } else {
            parse_batch(&outcome.text, &self.schemes)
        };
        if scored.is_empty() {
            warn!("batch eligibility scoring unavailable, using rule-based scores");
        }

        let mut results = self
            .schemes
            .iter()
            .map(|scheme| {
                scored
                    .remove(&scheme.id)
                    .unwrap_or_else(|| rule_based_result(profile, scheme))
            })
            .collect::<Vec<_>>();

        results.sort_by(|left, right| right.score.cmp(&left.score));
        results.truncate(MAX_RESULTS);
        results
    }
}

fn or_unspecified<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "Not specified".to_string())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn batch_prompt(profile: &UserProfile, schemes: &[Scheme]) -> String {
    let profile_block = [
        format!("- Age: {}", or_unspecified(&profile.age)),
        format!("- Gender: {}", or_unspecified(&profile.gender)),
        format!("- Annual Income: ₹{}", or_unspecified(&profile.income)),
        format!("- State: {}", or_unspecified(&profile.state)),
        format!("- District: {}", or_unspecified(&profile.district)),
        format!("- Caste Category: {}", or_unspecified(&profile.caste)),
        format!("- Occupation: {}", or_unspecified(&profile.occupation)),
        format!("- Ration Card Type: {}", or_unspecified(&profile.ration_card)),
        format!("- Disability: {}", yes_no(profile.disability)),
        format!("- Married: {}", yes_no(profile.married)),
        format!("- Education: {}", or_unspecified(&profile.education)),
        format!("- BPL Card: {}", yes_no(profile.bpl_card)),
        format!("- Farm Size: {} acres", or_unspecified(&profile.farm_size)),
    ]
    .join("\n");

    let schemes_block = schemes
        .iter()
        .map(|scheme| {
            format!(
                "[{}] {}\nEligibility: {}\nBenefit: {}",
                scheme.id,
                scheme.name,
                scheme.eligibility_rules.join("; "),
                scheme.benefit
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are an assistant helping Indian citizens find government schemes.\n\
         User Profile:\n{profile_block}\n\nSchemes:\n{schemes_block}\n\n\
         For each scheme id, score eligibility 0-100 and explain briefly. \
         Return a JSON array of objects with keys: \"id\", \"score\", \"eligible\", \
         \"reasons\" (array of strings), \"documentsNeeded\" (array), \"howToApply\" (array). \
         One object per scheme, same order as above. Return ONLY the JSON array, no other text."
    )
}

/// Results keyed by scheme id; unknown ids are ignored.
fn parse_batch(text: &str, schemes: &[Scheme]) -> HashMap<String, EligibilityResult> {
    let Some(Value::Array(items)) = extract_json(text, '[', ']') else {
        return HashMap::new();
    };

    let mut results = HashMap::new();
    for item in &items {
        let Some(id) = item.get("id").and_then(|id| match id {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }) else {
            continue;
        };
        let Some(scheme) = schemes.iter().find(|scheme| scheme.id == id) else {
            continue;
        };

        let score = item
            .get("score")
            .and_then(Value::as_f64)
            .map_or(ELIGIBLE_SCORE, |score| score.round().clamp(0.0, 100.0) as u8);
        let eligible = item
            .get("eligible")
            .and_then(Value::as_bool)
            .unwrap_or(score >= ELIGIBLE_SCORE);

        let mut reasons = list_field(item, "reasons");
        if reasons.is_empty() {
            reasons.push("Analysis completed".to_string());
        }
        let documents_needed = Some(list_field(item, "documentsNeeded"))
            .filter(|documents| !documents.is_empty())
            .unwrap_or_else(|| scheme.documents_required.clone());
        let how_to_apply = Some(list_field(item, "howToApply"))
            .filter(|steps| !steps.is_empty())
            .unwrap_or_else(|| scheme.steps.clone());

        results.insert(
            id,
            EligibilityResult {
                scheme: scheme.clone(),
                score,
                eligible,
                reasons,
                documents_needed,
                how_to_apply,
            },
        );
    }
    results
}

fn rule_based_result(profile: &UserProfile, scheme: &Scheme) -> EligibilityResult {
    let score = rule_score(profile, scheme);
    let eligible = score >= ELIGIBLE_SCORE;
    EligibilityResult {
        scheme: scheme.clone(),
        score,
        eligible,
        reasons: vec![if eligible {
            "May be eligible based on basic criteria".to_string()
        } else {
            "May not meet all eligibility criteria".to_string()
        }],
        documents_needed: scheme.documents_required.clone(),
        how_to_apply: scheme.steps.clone(),
    }
}

/// Base 50 plus boosts for profile facts the scheme's rules mention.
/// Category codes (`sc`, `st`, `obc`, `bpl`) match whole words only.
pub fn rule_score(profile: &UserProfile, scheme: &Scheme) -> u8 {
    let rules = scheme.eligibility_rules.join(" ").to_lowercase();
    let words = rules
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<HashSet<_>>();
    let mut score: i32 = 50;

    if let Some(age) = profile.age {
        if rules.contains("senior") && age >= 60 {
            score += 20;
        }
        if rules.contains("youth") && (18..=35).contains(&age) {
            score += 15;
        }
        let female = profile
            .gender
            .as_deref()
            .is_some_and(|gender| gender.eq_ignore_ascii_case("female"));
        if rules.contains("woman") && female {
            score += 20;
        }
    }

    if let Some(income) = profile.income {
        if words.contains("bpl") && income < 100_000 {
            score += 15;
        }
        if rules.contains("below poverty") && income < 50_000 {
            score += 20;
        }
    }

    if let Some(caste) = profile.caste.as_deref().map(str::to_lowercase) {
        for category in ["sc", "st", "obc"] {
            let named = caste
                .split(|ch: char| !ch.is_alphanumeric())
                .any(|part| part == category);
            if words.contains(category) && named {
                score += 10;
            }
        }
    }

    if let Some(occupation) = profile.occupation.as_deref().map(str::to_lowercase) {
        if rules.contains("farmer") && occupation.contains("farmer") {
            score += 15;
        }
        if rules.contains("student") && occupation.contains("student") {
            score += 15;
        }
    }

    if profile.disability && rules.contains("disability") {
        score += 20;
    }
    if profile.bpl_card && words.contains("bpl") {
        score += 15;
    }

    score.clamp(0, 100) as u8
}

fn unconfigured_result() -> EligibilityResult {
    EligibilityResult {
        scheme: Scheme {
            id: "none".to_string(),
            name: "No schemes available".to_string(),
            description: "Schemes database not loaded".to_string(),
            eligibility_rules: Vec::new(),
            documents_required: Vec::new(),
            benefit: String::new(),
            steps: Vec::new(),
            category: None,
            state: None,
        },
        score: 0,
        eligible: false,
        reasons: vec!["Schemes database not configured".to_string()],
        documents_needed: Vec::new(),
        how_to_apply: Vec::new(),
    }
}
