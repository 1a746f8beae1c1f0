// VIN text extraction and decode-merge.
//
// Pure scan over a record's free-text fields for a 17-character token from
// the VIN alphabet (I/O/Q excluded); failing that, an 8-16 character partial
// (masked) token with at least 2 letters and 2 digits, preferring the
// longest. At most one candidate per record goes to the decode collaborator;
// its structured answer merges into the free text without duplicating facts
// already present.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::core::types::{Lot, VinAttributes};
use crate::services::VinDecoder;
use crate::utils::{ProgressTracker, StepKey};

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z0-9*]+").unwrap());
static FULL_VIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-HJ-NPR-Z0-9]{17}$").unwrap());
static PARTIAL_VIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-HJ-NPR-Z0-9*]{8,16}$").unwrap());
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());

/// One VIN candidate per record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VinCandidate {
    pub vin: String,
    pub partial: bool,
}

fn letter_digit_counts(token: &str) -> (usize, usize) {
    let letters = token.chars().filter(|c| c.is_ascii_alphabetic()).count();
    let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
    (letters, digits)
}

/// Scan ordered free-text fields for a VIN candidate. A full VIN in an
/// earlier field wins outright; otherwise the longest qualifying partial
/// across all fields is returned.
pub fn extract_vin_candidate(fields: &[&str]) -> Option<VinCandidate> {
    let mut best_partial: Option<String> = None;

    for field in fields {
        let upper = field.to_uppercase();
        for token in TOKEN_RE.find_iter(&upper) {
            let token = token.as_str();
            if FULL_VIN_RE.is_match(token) {
                return Some(VinCandidate {
                    vin: token.to_string(),
                    partial: false,
                });
            }
            if PARTIAL_VIN_RE.is_match(token) {
                let (letters, digits) = letter_digit_counts(token);
                if letters >= 2 && digits >= 2 {
                    let longer = best_partial
                        .as_ref()
                        .map(|current| token.len() > current.len())
                        .unwrap_or(true);
                    if longer {
                        best_partial = Some(token.to_string());
                    }
                }
            }
        }
    }

    best_partial.map(|vin| VinCandidate { vin, partial: true })
}

/// Model-year hint for the decode collaborator, when the text mentions one
pub fn year_hint(text: &str) -> Option<u32> {
    YEAR_RE
        .find(text)
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|y| (1900..=2035).contains(y))
}

fn attribute_parts(attributes: &VinAttributes) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(year) = attributes.year {
        parts.push(year.to_string());
    }
    for field in [
        &attributes.make,
        &attributes.model,
        &attributes.trim,
        &attributes.engine,
        &attributes.body_style,
    ] {
        if let Some(value) = field {
            if !value.trim().is_empty() {
                parts.push(value.trim().to_string());
            }
        }
    }
    parts
}

/// Merge decoded attributes into `description`, skipping any fact already
/// present (case-insensitive substring check against description + context)
pub fn merge_attributes(description: &mut String, context: &str, attributes: &VinAttributes) {
    let haystack = format!("{} {}", description, context).to_lowercase();
    let additions: Vec<String> = attribute_parts(attributes)
        .into_iter()
        .filter(|part| !haystack.contains(&part.to_lowercase()))
        .collect();

    if additions.is_empty() {
        return;
    }
    let appended = additions.join(" ");
    if description.is_empty() {
        *description = appended;
    } else {
        description.push(' ');
        description.push_str(&appended);
    }
}

/// Scan every lot (and nested item), decode at most one candidate each, and
/// merge the structured answer into its free text. Collaborator failure
/// leaves the record unchanged.
pub async fn extract_and_decode(
    decoder: &dyn VinDecoder,
    lots: &mut [Lot],
    progress: &ProgressTracker,
) {
    let total = lots.len();
    for (done, lot) in lots.iter_mut().enumerate() {
        let tags = lot.tags.join(" ");
        let fields = [
            tags.as_str(),
            lot.condition.as_str(),
            lot.description.as_str(),
            lot.title.as_str(),
        ];
        if let Some(candidate) = extract_vin_candidate(&fields) {
            let hint = year_hint(&lot.title).or_else(|| year_hint(&lot.description));
            match decoder.decode(&candidate.vin, hint).await {
                Ok(Some(attributes)) => {
                    debug!("VIN {} decoded for lot {}", candidate.vin, lot.lot_id);
                    let context = format!("{} {} {}", lot.title, lot.condition, tags);
                    merge_attributes(&mut lot.description, &context, &attributes);
                }
                Ok(None) => {}
                Err(e) => warn!("VIN decode failed for lot {}: {}", lot.lot_id, e),
            }
        }

        for item in lot.items.iter_mut() {
            let fields = [
                item.condition.as_str(),
                item.description.as_str(),
                item.title.as_str(),
            ];
            let Some(candidate) = extract_vin_candidate(&fields) else {
                continue;
            };
            match decoder.decode(&candidate.vin, year_hint(&item.title)).await {
                Ok(Some(attributes)) => {
                    let context = format!("{} {}", item.title, item.condition);
                    merge_attributes(&mut item.description, &context, &attributes);
                }
                Ok(None) => {}
                Err(e) => warn!("VIN decode failed for item in lot {}: {}", lot.lot_id, e),
            }
        }

        progress.publish_partial(StepKey::Vin, done + 1, total);
    }
}
