//! Best-effort answers with no network at all.
//!
//! When every configured backend is missing or failing, the orchestrator asks
//! [`OfflineResponder`] to approximate the answer from the prompt's own text:
//! the leading sentences stand in for a summary, keyword/pattern scoring picks
//! key points, numbered lines become action steps, and per-language phrase
//! templates fill the narrative fields.

use crate::models::InferenceRequest;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::OnceLock;

const MAX_KEY_POINTS: usize = 5;
const MAX_STEPS: usize = 6;
const MAX_POINT_CHARS: usize = 240;
const MIN_SENTENCE_CHARS: usize = 10;

const SECTION_MARKERS: [&str; 4] = [
    "Full text excerpt:",
    "Key sections:",
    "Context:",
    "Form text:",
];

const SECTION_END_MARKERS: [&str; 9] = [
    "Generate a JSON",
    "Question:",
    "Important:",
    "Return ONLY",
    "Return a JSON",
    "Make it",
    "Make the",
    "Provide a",
    "Answer clearly",
];

const INSTRUCTION_PREFIXES: [&str; 13] = [
    "You are",
    "Based on",
    "Respond in",
    "Answer in",
    "Return",
    "Generate",
    "Important:",
    "Question:",
    "Document:",
    "Make ",
    "Provide ",
    "Extract ",
    "For each",
];

const DOMAIN_TERMS: [&str; 26] = [
    "eligib",
    "required",
    "must",
    "fee",
    "document",
    "deadline",
    "last date",
    "apply",
    "application",
    "benefit",
    "certificate",
    "income",
    "subsidy",
    "pension",
    "penalty",
    "पात्र",
    "आवश्यक",
    "शुल्क",
    "दस्तावेज",
    "अंतिम तिथि",
    "आवेदन",
    "लाभ",
    "योग्य",
    "अर्ज",
    "कागदपत्र",
    "मुदत",
];

/// Words whose trailing period does not end a sentence.
const ABBREVIATIONS: [&str; 12] = [
    "rs", "no", "nos", "dr", "smt", "shri", "sh", "mr", "mrs", "ms", "govt", "dept",
];

const MARATHI_MARKERS: [&str; 6] = ["आहे", "आहेत", "नाही", "असते", "करणे", "होते"];

/// Narrative phrases for one language. `question_answer` may contain `{question}`.
#[derive(Debug, Clone, Copy)]
pub struct PhraseTemplates {
    pub summary_unavailable: &'static str,
    pub question_answer: &'static str,
    pub plain_explanation: &'static str,
    pub no_key_points: &'static str,
    pub default_steps: &'static [&'static str],
    pub offline_notice: &'static str,
}

const ENGLISH: PhraseTemplates = PhraseTemplates {
    summary_unavailable: "This document could not be summarized offline. Please try again \
        when you are connected.",
    question_answer: "You asked: \"{question}\". We are offline, so this answer only uses the \
        text already on your device.",
    plain_explanation: "In simple words:",
    no_key_points: "No key points could be found offline.",
    default_steps: &[
        "Keep this document safe.",
        "Visit your nearest Common Service Centre (CSC) or government office for help.",
        "Try again when you are connected for a detailed explanation.",
    ],
    offline_notice: "(Offline summary: prepared without an AI service.)",
};

const HINDI: PhraseTemplates = PhraseTemplates {
    summary_unavailable: "इस दस्तावेज़ का ऑफ़लाइन सारांश नहीं बन सका। कृपया इंटरनेट जुड़ने पर \
        फिर से प्रयास करें।",
    question_answer: "आपने पूछा: \"{question}\"। अभी हम ऑफ़लाइन हैं, इसलिए यह उत्तर केवल \
        उपलब्ध पाठ पर आधारित है।",
    plain_explanation: "सरल शब्दों में:",
    no_key_points: "ऑफ़लाइन कोई मुख्य बिंदु नहीं मिला।",
    default_steps: &[
        "इस दस्तावेज़ को सुरक्षित रखें।",
        "मदद के लिए नज़दीकी जन सेवा केंद्र (CSC) या सरकारी कार्यालय जाएँ।",
        "विस्तृत जानकारी के लिए इंटरनेट जुड़ने पर फिर से प्रयास करें।",
    ],
    offline_notice: "(ऑफ़लाइन सारांश: बिना AI सेवा के तैयार किया गया।)",
};

const MARATHI: PhraseTemplates = PhraseTemplates {
    summary_unavailable: "या दस्तऐवजाचा ऑफलाइन सारांश तयार करता आला नाही. कृपया इंटरनेट \
        जोडल्यावर पुन्हा प्रयत्न करा.",
    question_answer: "तुम्ही विचारले: \"{question}\". सध्या आम्ही ऑफलाइन आहोत, त्यामुळे हे \
        उत्तर फक्त उपलब्ध मजकुरावर आधारित आहे.",
    plain_explanation: "सोप्या शब्दांत:",
    no_key_points: "ऑफलाइन कोणतेही मुख्य मुद्दे सापडले नाहीत.",
    default_steps: &[
        "हा दस्तऐवज सुरक्षित ठेवा.",
        "मदतीसाठी जवळच्या सेवा केंद्रात (CSC) किंवा सरकारी कार्यालयात जा.",
        "सविस्तर माहितीसाठी इंटरनेट जोडल्यावर पुन्हा प्रयत्न करा.",
    ],
    offline_notice: "(ऑफलाइन सारांश: AI सेवेशिवाय तयार केला.)",
};

const DEFAULT_TEMPLATES: [(&str, PhraseTemplates); 3] =
    [("en", ENGLISH), ("hi", HINDI), ("mr", MARATHI)];

/// Same shape as the summaries the networked tiers are asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineDigest {
    pub summary: String,
    pub eli10: String,
    pub key_points: Vec<String>,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OfflineResponder {
    templates: HashMap<String, PhraseTemplates>,
}

impl Default for OfflineResponder {
    fn default() -> Self {
        Self {
            templates: DEFAULT_TEMPLATES
                .iter()
                .map(|(language, templates)| (language.to_string(), *templates))
                .collect(),
        }
    }
}

impl OfflineResponder {
    pub fn with_templates(
        mut self,
        language: impl Into<String>,
        templates: PhraseTemplates,
    ) -> Self {
        self.templates.insert(language.into(), templates);
        self
    }

    fn templates_for(&self, language: &str) -> &PhraseTemplates {
        self.templates
            .get(&language.to_lowercase())
            .or_else(|| self.templates.get("en"))
            .unwrap_or(&ENGLISH)
    }

    pub fn respond(&self, request: &InferenceRequest) -> String {
        let language = request
            .language
            .clone()
            .unwrap_or_else(|| detect_language(&request.prompt).to_string());
        let templates = self.templates_for(&language);
        let digest = self.digest(&request.prompt, &language);

        if request.wants_json {
            return serde_json::to_string(&digest).unwrap_or_default();
        }

        let mut lines = vec![digest.summary, String::new(), digest.eli10];
        if !digest.key_points.is_empty() {
            lines.push(String::new());
            lines.extend(digest.key_points.iter().map(|point| format!("- {point}")));
        }
        lines.push(String::new());
        lines.push(templates.offline_notice.to_string());
        lines.join("\n")
    }

    pub fn digest(&self, prompt: &str, language: &str) -> OfflineDigest {
        let templates = self.templates_for(language);
        let (material, question) = split_prompt(prompt);
        let sentences = split_sentences(&material);

        let summary = if !sentences.is_empty() {
            sentences.iter().take(2).cloned().collect::<Vec<_>>().join(" ")
        } else if let Some(question) = &question {
            templates.question_answer.replace("{question}", question)
        } else {
            templates.summary_unavailable.to_string()
        };

        let eli10 = match sentences.first() {
            Some(sentence) => format!("{} {}", templates.plain_explanation, sentence),
            None => format!("{} {}", templates.plain_explanation, summary),
        };

        let mut key_points = key_points(&material);
        if key_points.is_empty() {
            key_points = sentences.iter().take(3).cloned().collect();
        }
        if key_points.is_empty() {
            key_points.push(templates.no_key_points.to_string());
        }

        let mut steps = numbered_steps(&material);
        if steps.is_empty() {
            steps = templates
                .default_steps
                .iter()
                .map(|step| step.to_string())
                .collect();
        }

        OfflineDigest {
            summary,
            eli10,
            key_points,
            steps,
        }
    }
}

/// `mr` when Devanagari dominates and Marathi marker words appear, `hi` for
/// other Devanagari text, `en` otherwise.
pub fn detect_language(text: &str) -> &'static str {
    let sample = text.chars().take(1_000).collect::<String>();
    let devanagari = sample
        .chars()
        .filter(|ch| ('\u{0900}'..='\u{097F}').contains(ch))
        .count();
    let latin = sample.chars().filter(char::is_ascii_alphabetic).count();

    if devanagari == 0 || devanagari <= latin {
        return "en";
    }
    if MARATHI_MARKERS.iter().any(|marker| sample.contains(marker)) {
        "mr"
    } else {
        "hi"
    }
}

fn starts_with_any(line: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| line.starts_with(prefix))
}

fn is_instruction_line(line: &str) -> bool {
    starts_with_any(line, &INSTRUCTION_PREFIXES)
        || line.starts_with(['{', '}', '[', ']', '"'])
}

/// Separates the document material a prompt carries from its instructions,
/// and pulls out a `Question:` line if there is one.
fn split_prompt(prompt: &str) -> (String, Option<String>) {
    let question = prompt.lines().map(str::trim).find_map(|line| {
        line.strip_prefix("Question:")
            .map(str::trim)
            .filter(|question| !question.is_empty())
            .map(str::to_string)
    });

    let has_sections = prompt
        .lines()
        .any(|line| starts_with_any(line.trim(), &SECTION_MARKERS));

    let mut material = Vec::new();
    if has_sections {
        let mut inside = false;
        for line in prompt.lines().map(str::trim) {
            let marker = SECTION_MARKERS
                .iter()
                .find(|marker| line.starts_with(**marker));
            if let Some(marker) = marker {
                inside = true;
                let rest = line[marker.len()..].trim();
                if !rest.is_empty() {
                    material.push(rest);
                }
                continue;
            }
            if starts_with_any(line, &SECTION_END_MARKERS) {
                inside = false;
                continue;
            }
            if inside && line != "---" {
                material.push(line);
            }
        }
    } else {
        material.extend(
            prompt
                .lines()
                .map(str::trim)
                .filter(|line| !is_instruction_line(line)),
        );
    }

    (material.join("\n").trim().to_string(), question)
}

/// A period after an abbreviation such as `Rs.` or before a number does not
/// end the sentence.
fn ends_sentence(current: &str, ch: char, rest: &Peekable<Chars<'_>>) -> bool {
    if !matches!(ch, '.' | '!' | '?' | '।' | '॥') {
        return false;
    }
    let mut ahead = rest.clone();
    if ahead.peek().is_some_and(|next| !next.is_whitespace()) {
        return false;
    }
    if ch != '.' {
        return true;
    }

    let next_visible = ahead.find(|next| !next.is_whitespace());
    if next_visible.is_some_and(|next| next.is_ascii_digit()) {
        return false;
    }
    let word = current[..current.len() - ch.len_utf8()]
        .rsplit(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    !ABBREVIATIONS.contains(&word.as_str())
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if ch == '\n' || ends_sentence(&current, ch, &chars) {
            push_sentence(&mut sentences, &current);
            current.clear();
        }
    }
    push_sentence(&mut sentences, &current);

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, candidate: &str) {
    let sentence = candidate.split_whitespace().collect::<Vec<_>>().join(" ");
    if sentence.chars().count() > MIN_SENTENCE_CHARS {
        sentences.push(sentence);
    }
}

fn cached(cell: &'static OnceLock<Option<Regex>>, source: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(source).ok()).as_ref()
}

fn numbered_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    cached(
        &PATTERN,
        r"(?i)^(?:step\s*\d{1,2}\s*[:.)-]|\(?(?:\d{1,2}|[a-z]|[ivx]{1,4}|[०-९]{1,2})[.)])\s+(\S.*)$",
    )
}

fn money_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    cached(
        &PATTERN,
        r"(?i)(?:₹|रु|\brs\.?\s*\d|\binr\b|\d[\d,]*(?:\.\d+)?\s*(?:rupees|lakh|crore|%))",
    )
}

fn strip_step_marker(line: &str) -> Option<String> {
    numbered_pattern()
        .and_then(|pattern| pattern.captures(line))
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str().trim().to_string())
}

fn strip_bullet(line: &str) -> &str {
    line.trim_start_matches(['-', '•', '*', '–']).trim()
}

fn score_line(line: &str) -> usize {
    let lowered = line.to_lowercase();
    let mut score = DOMAIN_TERMS
        .iter()
        .filter(|term| lowered.contains(**term))
        .count()
        * 2;

    if money_pattern().is_some_and(|pattern| pattern.is_match(line)) {
        score += 2;
    } else if line.chars().any(|ch| ch.is_ascii_digit()) {
        score += 1;
    }

    if line.starts_with(['-', '•', '*', '–']) || strip_step_marker(line).is_some() {
        score += 1;
    }

    score
}

fn truncate_point(text: &str) -> String {
    if text.chars().count() <= MAX_POINT_CHARS {
        return text.to_string();
    }
    let mut truncated = text.chars().take(MAX_POINT_CHARS).collect::<String>();
    truncated.push('…');
    truncated
}

fn key_points(material: &str) -> Vec<String> {
    let units = material
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .flat_map(|line| {
            let sentences = split_sentences(line);
            if sentences.len() > 1 {
                sentences
            } else {
                vec![line.to_string()]
            }
        })
        .collect::<Vec<_>>();

    let mut scored = units
        .iter()
        .enumerate()
        .map(|(position, unit)| (position, score_line(unit)))
        .filter(|(_, score)| *score > 0)
        .collect::<Vec<_>>();

    scored.sort_by(|left, right| right.1.cmp(&left.1).then(left.0.cmp(&right.0)));
    scored.truncate(MAX_KEY_POINTS);
    scored.sort_by_key(|(position, _)| *position);

    scored
        .into_iter()
        .map(|(position, _)| {
            let unit = &units[position];
            let body =
                strip_step_marker(unit).unwrap_or_else(|| strip_bullet(unit).to_string());
            truncate_point(&body)
        })
        .filter(|point| !point.is_empty())
        .collect()
}

fn numbered_steps(material: &str) -> Vec<String> {
    material
        .lines()
        .map(str::trim)
        .filter_map(strip_step_marker)
        .filter(|step| !step.is_empty())
        .take(MAX_STEPS)
        .map(|step| truncate_point(&step))
        .collect()
}
