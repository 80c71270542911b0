//! Text heuristics
//!
//! Pure functions used to normalize oracle output and to classify a
//! transaction locally when the oracle has nothing useful to say.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::classification::KEYWORD_FALLBACK_SOURCE;
use crate::models::{ClassificationResult, Provenance};

/// Characters that split a plain-text oracle line into label and category
pub const SEPARATORS: [char; 3] = ['-', ':', '|'];

/// Canonical category labels keyed by lowercase synonym
const CATEGORY_SYNONYMS: &[(&str, &str)] = &[
    ("food", "Food & Dining"),
    ("dining", "Food & Dining"),
    ("groceries", "Groceries"),
    ("grocery", "Groceries"),
    ("travel", "Travel"),
    ("transport", "Transport"),
    ("transportation", "Transport"),
    ("shopping", "Shopping"),
    ("rent", "Rent"),
    ("bills", "Bills"),
];

struct KeywordRule {
    pattern: Regex,
    category: &'static str,
    subcategory: Option<&'static str>,
    merchant: &'static str,
}

/// Last-resort brand table, checked in order
static KEYWORD_RULES: Lazy<Vec<KeywordRule>> = Lazy::new(|| {
    let table: [(&str, &'static str, Option<&'static str>, &'static str); 7] = [
        (r"(?i)agoda", "Travel", Some("Hotel"), "Agoda"),
        (r"(?i)uber", "Transport", Some("Ride Hailing"), "Uber"),
        // Word start only: "ola" inside "cola" is not the ride-hailing brand
        (r"(?i)\bola", "Transport", Some("Ride Hailing"), "Ola"),
        (r"(?i)zomato", "Food & Dining", Some("Food Delivery"), "Zomato"),
        (r"(?i)swiggy", "Food & Dining", Some("Food Delivery"), "Swiggy"),
        (r"(?i)blinkit", "Food & Dining", None, "Blinkit"),
        (r"(?i)zepto", "Food & Dining", None, "Zepto"),
    ];
    table
        .into_iter()
        .filter_map(|(pattern, category, subcategory, merchant)| {
            Regex::new(pattern).ok().map(|pattern| KeywordRule {
                pattern,
                category,
                subcategory,
                merchant,
            })
        })
        .collect()
});

/// Lowercase, collapse whitespace, then capitalize the first letter of
/// every word
pub fn title_case(input: &str) -> String {
    let collapsed = input
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let mut out = String::with_capacity(collapsed.len());
    let mut prev_is_word = false;
    for c in collapsed.chars() {
        let is_word = c.is_alphanumeric() || c == '_';
        if is_word && !prev_is_word {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        prev_is_word = is_word;
    }
    out
}

/// Map a category through the synonym table; unknown values are title-cased
pub fn normalize_category(category: &str) -> String {
    let key = category.trim().to_lowercase();
    CATEGORY_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == key)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| title_case(category))
}

/// Textual form of an amount as it appears in transaction text
///
/// Whole amounts render without a fractional part (`250`, not `250.0`).
pub fn amount_token(amount: f64) -> String {
    let amount = amount.abs();
    if amount.fract() == 0.0 && amount < 1e15 {
        format!("{}", amount as i64)
    } else {
        format!("{}", amount)
    }
}

fn amount_pattern(amount: Option<f64>) -> Option<Regex> {
    let amount = amount.filter(|a| a.is_finite() && *a != 0.0)?;
    Regex::new(&format!(r"\b{}\b", regex::escape(&amount_token(amount)))).ok()
}

/// Pick the most relevant line of a plain-text oracle reply
///
/// Preference: a line containing the transaction amount, then a line
/// containing a separator, then the last non-empty line.
pub fn select_line(body: &str, amount: Option<f64>) -> Option<&str> {
    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let by_amount = amount_pattern(amount)
        .and_then(|re| lines.iter().copied().find(|l| re.is_match(l)));

    by_amount
        .or_else(|| lines.iter().copied().find(|l| l.contains(SEPARATORS)))
        .or_else(|| lines.last().copied())
}

/// Segment after the last separator that holds a meaningful label (one
/// containing at least one letter); the whole line otherwise
pub fn category_text(line: &str) -> &str {
    let mut search_end = line.len();
    while let Some(idx) = line[..search_end].rfind(SEPARATORS) {
        let segment = line[idx + 1..search_end].trim();
        if segment.chars().any(char::is_alphabetic) {
            return segment;
        }
        search_end = idx;
    }
    line.trim()
}

/// Permissive parser for plain-text oracle replies
///
/// Returns only a category; plain text never names a merchant.
pub fn parse_plain_text(body: &str, amount: Option<f64>) -> Option<String> {
    let line = select_line(body, amount)?;
    let category = category_text(line);
    if category.is_empty() {
        return None;
    }
    Some(normalize_category(category))
}

/// Classify raw transaction text with the brand keyword table
///
/// The result is empty (but still labelled) when no keyword matches.
pub fn keyword_fallback(text: &str) -> ClassificationResult {
    let mut result = ClassificationResult::new(KEYWORD_FALLBACK_SOURCE);
    result.provenance = Provenance::Heuristic;

    if let Some(rule) = KEYWORD_RULES.iter().find(|r| r.pattern.is_match(text)) {
        result.category = Some(rule.category.to_string());
        result.subcategory = rule.subcategory.map(str::to_string);
        result.merchant = Some(rule.merchant.to_string());
    }
    result
}

/// Fill an uninformative result from the keyword table
///
/// Does nothing when the result already has a category or merchant.
pub fn apply_keyword_fallback(result: &mut ClassificationResult, text: &str) -> bool {
    if !result.is_uninformative() {
        return false;
    }
    let filled = result.fill_from(keyword_fallback(text));
    if filled {
        tracing::debug!(
            category = ?result.category,
            merchant = ?result.merchant,
            "Keyword fallback filled classification"
        );
    }
    filled
}
