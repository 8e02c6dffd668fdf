use anyhow::{Result, anyhow};
use isolang::Language;

/// Language utilities for prompt language names
///
/// Languages may be given as ISO 639-1 (2-letter) or ISO 639-2 (3-letter)
/// codes, or directly as a name such as "Portuguese" or "Brazilian Portuguese".
/// Prompts always name the language in English.

/// Map an ISO 639-2/B code to its ISO 639-2/T form
fn bibliographic_to_terminologic(code: &str) -> Option<&'static str> {
    match code {
        "fre" => Some("fra"),
        "ger" => Some("deu"),
        "dut" => Some("nld"),
        "gre" => Some("ell"),
        "chi" => Some("zho"),
        "cze" => Some("ces"),
        "ice" => Some("isl"),
        "alb" => Some("sqi"),
        "arm" => Some("hye"),
        "baq" => Some("eus"),
        "bur" => Some("mya"),
        "per" => Some("fas"),
        "geo" => Some("kat"),
        "may" => Some("msa"),
        "mac" => Some("mkd"),
        "rum" => Some("ron"),
        "slo" => Some("slk"),
        "wel" => Some("cym"),
        _ => None,
    }
}

/// Look up a language by ISO code
pub fn language_from_code(code: &str) -> Option<Language> {
    let normalized = code.trim().to_lowercase();
    match normalized.len() {
        2 => Language::from_639_1(&normalized),
        3 => {
            let part2t = bibliographic_to_terminologic(&normalized).unwrap_or(&normalized);
            Language::from_639_3(part2t)
        }
        _ => None,
    }
}

/// Resolve the language name used in prompts.
///
/// ISO codes are expanded to their English name; anything longer than three
/// characters is taken as a name and passed through trimmed.
pub fn prompt_language_name(language: &str) -> Result<String> {
    let trimmed = language.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Language must not be empty"));
    }

    if let Some(lang) = language_from_code(trimmed) {
        return Ok(lang.to_name().to_string());
    }

    if trimmed.chars().count() <= 3 {
        return Err(anyhow!("Invalid language code: {}", trimmed));
    }

    Ok(trimmed.to_string())
}
