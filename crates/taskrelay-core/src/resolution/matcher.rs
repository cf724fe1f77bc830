//! Fuzzy matching of model names against an availability set.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static DASHED_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)-(\d)").expect("Invalid regex"));

/// Lowercase and fold dashed version numbers into dotted ones, so
/// `claude-opus-4-5` and `claude-opus-4.5` compare equal.
pub fn normalize_model_name(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    // Two passes so overlapping runs like `1-2-3` fold completely.
    let once = DASHED_VERSION.replace_all(&lower, "$1.$2");
    DASHED_VERSION.replace_all(&once, "$1.$2").into_owned()
}

fn model_part(id: &str) -> &str {
    id.split_once('/').map_or(id, |(_, model)| model)
}

fn provider_part(id: &str) -> Option<&str> {
    id.split_once('/').map(|(provider, _)| provider)
}

/// Find the best available `provider/model` for `target`.
///
/// Candidates are narrowed to `provider_hint` when one is given, then matched
/// by containment of the normalized target. Preference order: exact full id,
/// exact model id (shortest full id first), shortest containing id. Remaining
/// ties break lexically so the result only depends on the inputs.
pub fn fuzzy_match_model(
    target: &str,
    available: &BTreeSet<String>,
    provider_hint: Option<&[String]>,
) -> Option<String> {
    let needle = normalize_model_name(target);
    if needle.is_empty() {
        return None;
    }
    let needle_model = normalize_model_name(model_part(target));

    let hint: Option<Vec<String>> =
        provider_hint.map(|providers| providers.iter().map(|p| p.to_lowercase()).collect());

    let mut best: Option<(u8, &String)> = None;
    for candidate in available {
        if let Some(hint) = &hint {
            let provider = provider_part(candidate).map(str::to_lowercase);
            if !provider.is_some_and(|provider| hint.contains(&provider)) {
                continue;
            }
        }

        let normalized = normalize_model_name(candidate);
        if !normalized.contains(&needle) {
            continue;
        }

        let rank = if normalized == needle {
            0
        } else if normalize_model_name(model_part(candidate)) == needle_model {
            1
        } else {
            2
        };

        let better = match best {
            None => true,
            Some((best_rank, best_candidate)) => {
                compare(rank, candidate, best_rank, best_candidate) == Ordering::Less
            }
        };
        if better {
            best = Some((rank, candidate));
        }
    }

    best.map(|(_, candidate)| candidate.clone())
}

fn compare(rank: u8, candidate: &str, other_rank: u8, other: &str) -> Ordering {
    rank.cmp(&other_rank)
        .then(candidate.len().cmp(&other.len()))
        .then_with(|| candidate.cmp(other))
}
