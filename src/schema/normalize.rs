//! Deterministic normalization rules (§4.4), used as the fallback when the
//! LLM gateway is unavailable and to clean up low-confidence LLM output.

use std::sync::LazyLock;

use rustc_hash::FxHashMap;

pub fn identity(raw: &str) -> String {
    raw.trim().to_string()
}

/// "First Last" / "Dr. First Last" -> "Last, First". Already-normalized
/// "Last, First" input passes through unchanged (idempotence, §8).
pub fn experimenter(raw: &str) -> String {
    let cleaned = raw.trim().trim_start_matches("Dr.").trim_start_matches("Dr").trim();
    if cleaned.contains(',') {
        return cleaned.to_string();
    }
    let parts: Vec<&str> = cleaned.split_whitespace().collect();
    match parts.as_slice() {
        [] => String::new(),
        [single] => single.to_string(),
        [first, .., last] => format!("{last}, {first}"),
    }
}

static INSTITUTIONS: LazyLock<FxHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    [
        ("MIT", "Massachusetts Institute of Technology"),
        ("UCL", "University College London"),
        ("UCSF", "University of California, San Francisco"),
        ("UCSD", "University of California, San Diego"),
        ("NIH", "National Institutes of Health"),
        ("CSHL", "Cold Spring Harbor Laboratory"),
    ]
    .into_iter()
    .collect()
});

/// Abbreviation -> full name, passing already-expanded names through
/// unchanged.
pub fn institution(raw: &str) -> String {
    let trimmed = raw.trim();
    match INSTITUTIONS.get(trimmed) {
        Some(full) => full.to_string(),
        None => trimmed.to_string(),
    }
}

static SPECIES: LazyLock<FxHashMap<&'static str, &'static str>> = LazyLock::new(|| {
    [
        ("mouse", "Mus musculus"),
        ("mice", "Mus musculus"),
        ("rat", "Rattus norvegicus"),
        ("macaque", "Macaca mulatta"),
        ("zebrafish", "Danio rerio"),
    ]
    .into_iter()
    .collect()
});

/// Colloquial species name -> binomial, case-insensitive; passes an
/// already-binomial name through unchanged.
pub fn species(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    match SPECIES.get(lower.as_str()) {
        Some(binomial) => binomial.to_string(),
        None => trimmed.to_string(),
    }
}

/// Sex token -> `{M,F,U,O}`.
pub fn sex(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    match lower.as_str() {
        "m" | "male" => "M".to_string(),
        "f" | "female" => "F".to_string(),
        "u" | "unknown" => "U".to_string(),
        "" => "U".to_string(),
        _ => "O".to_string(),
    }
}

/// Age phrase -> ISO-8601 duration. Recognizes "P60", "P60D", "60 days",
/// "postnatal day 60", "8 weeks old".
pub fn age(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('P') && trimmed.ends_with('D') {
        return trimmed.to_string();
    }
    if let Some(rest) = trimmed.strip_prefix('P') {
        if let Ok(days) = rest.parse::<u32>() {
            return format!("P{days}D");
        }
    }

    let lower = trimmed.to_lowercase();
    let digits: String = lower.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return trimmed.to_string();
    }
    let number: u32 = digits.parse().unwrap_or(0);

    if lower.contains("week") {
        format!("P{}D", number * 7)
    } else if lower.contains("month") {
        format!("P{}D", number * 30)
    } else {
        // "60 days", "postnatal day 60", bare "P60"-equivalent phrasing.
        format!("P{number}D")
    }
}
