//! Fuzzy autocomplete over the projection's name-history index.
//!
//! Candidates are names that were ever used but are not on the active
//! list right now. Ranking combines use frequency, prefix/substring
//! match bonuses, an edit-distance penalty for near-misses, a bonus when
//! the name's remembered category still exists, and a bonus for names
//! containing emoji.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::projection::Projection;

/// At most this many suggestions are returned per request.
const MAX_SUGGESTIONS: usize = 4;

/// Near-misses further than this edit distance are discarded.
const MAX_DISTANCE: usize = 3;

/// One ranked autocomplete result.
///
/// `category_id`/`category_name` are attached when the name's most recent
/// category assignment still refers to a live category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
}

struct Candidate {
    suggestion: Suggestion,
    score: f64,
}

/// Levenshtein edit distance, case-folded.
///
/// Two-row Wagner-Fischer with the shorter string on the inner axis, so
/// the working memory is `O(min(m, n))`.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    // Keep the shorter string on the inner (row) axis.
    let (short, long) = if a.len() > b.len() { (b, a) } else { (a, b) };

    let m = short.len();
    let n = long.len();
    if m == 0 {
        return n;
    }

    let mut prev_row: Vec<usize> = (0..=m).collect();
    let mut curr_row: Vec<usize> = vec![0; m + 1];

    for i in 1..=n {
        curr_row[0] = i;
        for j in 1..=m {
            let cost = usize::from(long[i - 1] != short[j - 1]);
            curr_row[j] = (prev_row[j] + 1) // deletion
                .min(curr_row[j - 1] + 1) // insertion
                .min(prev_row[j - 1] + cost); // substitution
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[m]
}

/// Whether the string contains an emoji or other non-ASCII symbol.
pub fn contains_emoji(s: &str) -> bool {
    s.chars().any(|c| {
        let code = c as u32;
        // Miscellaneous Symbols and Pictographs, Emoticons, Transport,
        // Supplemental Symbols.
        (0x1F300..=0x1F9FF).contains(&code)
            // Miscellaneous Symbols
            || (0x2600..=0x26FF).contains(&code)
            // Dingbats
            || (0x2700..=0x27BF).contains(&code)
            // Emoticons
            || (0x1F600..=0x1F64F).contains(&code)
            // Transport and Map Symbols
            || (0x1F680..=0x1F6FF).contains(&code)
            // Regional indicators (flags)
            || (0x1F1E0..=0x1F1FF).contains(&code)
            // Any other non-ASCII symbol that is not letter/number/punct/space.
            || (code > 127
                && !c.is_alphabetic()
                && !c.is_numeric()
                && !is_punctuation(c)
                && !c.is_whitespace())
    })
}

/// Inclusive codepoint ranges of Unicode general category P beyond ASCII,
/// sorted for binary search. Derived from the UnicodeData.txt category
/// assignments; symbol codepoints interleaved in the same blocks
/// (currency signs, fullwidth operators, modifier marks) are not listed.
const PUNCTUATION_RANGES: &[(u32, u32)] = &[
    (0x00A1, 0x00A1), (0x00A7, 0x00A7), (0x00AB, 0x00AB), (0x00B6, 0x00B7), (0x00BB, 0x00BB),
    (0x00BF, 0x00BF), (0x037E, 0x037E), (0x0387, 0x0387), (0x055A, 0x055F), (0x0589, 0x058A),
    (0x05BE, 0x05BE), (0x05C0, 0x05C0), (0x05C3, 0x05C3), (0x05C6, 0x05C6), (0x05F3, 0x05F4),
    (0x0609, 0x060A), (0x060C, 0x060D), (0x061B, 0x061B), (0x061D, 0x061F), (0x066A, 0x066D),
    (0x06D4, 0x06D4), (0x0700, 0x070D), (0x07F7, 0x07F9), (0x0830, 0x083E), (0x085E, 0x085E),
    (0x0964, 0x0965), (0x0970, 0x0970), (0x09FD, 0x09FD), (0x0A76, 0x0A76), (0x0AF0, 0x0AF0),
    (0x0C77, 0x0C77), (0x0C84, 0x0C84), (0x0DF4, 0x0DF4), (0x0E4F, 0x0E4F), (0x0E5A, 0x0E5B),
    (0x0F04, 0x0F12), (0x0F14, 0x0F14), (0x0F3A, 0x0F3D), (0x0F85, 0x0F85), (0x0FD0, 0x0FD4),
    (0x0FD9, 0x0FDA), (0x104A, 0x104F), (0x10FB, 0x10FB), (0x1360, 0x1368), (0x166E, 0x166E),
    (0x169B, 0x169C), (0x16EB, 0x16ED), (0x1735, 0x1736), (0x17D4, 0x17D6), (0x17D8, 0x17DA),
    (0x1800, 0x180A), (0x1944, 0x1945), (0x1A1E, 0x1A1F), (0x1AA0, 0x1AA6), (0x1AA8, 0x1AAD),
    (0x1B5A, 0x1B60), (0x1BFC, 0x1BFF), (0x1C3B, 0x1C3F), (0x1C7E, 0x1C7F), (0x1CC0, 0x1CC7),
    (0x1CD3, 0x1CD3), (0x2010, 0x2027), (0x2030, 0x2043), (0x2045, 0x2051), (0x2053, 0x205E),
    (0x207D, 0x207E), (0x208D, 0x208E), (0x2308, 0x230B), (0x2329, 0x232A), (0x2768, 0x2775),
    (0x27C5, 0x27C6), (0x27E6, 0x27EF), (0x2983, 0x2998), (0x29D8, 0x29DB), (0x29FC, 0x29FD),
    (0x2CF9, 0x2CFC), (0x2CFE, 0x2CFF), (0x2D70, 0x2D70), (0x2E00, 0x2E5D), (0x3001, 0x3003),
    (0x3008, 0x3011), (0x3014, 0x301F), (0x3030, 0x3030), (0x303D, 0x303D), (0x30A0, 0x30A0),
    (0x30FB, 0x30FB), (0xA4FE, 0xA4FF), (0xA60D, 0xA60F), (0xA673, 0xA673), (0xA67E, 0xA67E),
    (0xA6F2, 0xA6F7), (0xA874, 0xA877), (0xA8CE, 0xA8CF), (0xA8F8, 0xA8FA), (0xA8FC, 0xA8FC),
    (0xA92E, 0xA92F), (0xA95F, 0xA95F), (0xA9C1, 0xA9CD), (0xA9DE, 0xA9DF), (0xAA5C, 0xAA5F),
    (0xAADE, 0xAADF), (0xAAF0, 0xAAF1), (0xABEB, 0xABEB), (0xFD3E, 0xFD3F), (0xFE10, 0xFE19),
    (0xFE30, 0xFE52), (0xFE54, 0xFE61), (0xFE63, 0xFE63), (0xFE68, 0xFE68), (0xFE6A, 0xFE6B),
    (0xFF01, 0xFF03), (0xFF05, 0xFF0A), (0xFF0C, 0xFF0F), (0xFF1A, 0xFF1B), (0xFF1F, 0xFF20),
    (0xFF3B, 0xFF3D), (0xFF3F, 0xFF3F), (0xFF5B, 0xFF5B), (0xFF5D, 0xFF5D), (0xFF5F, 0xFF65),
    (0x10100, 0x10102), (0x1039F, 0x1039F), (0x103D0, 0x103D0), (0x1056F, 0x1056F),
    (0x10857, 0x10857), (0x1091F, 0x1091F), (0x1093F, 0x1093F), (0x10A50, 0x10A58),
    (0x10A7F, 0x10A7F), (0x10AF0, 0x10AF6), (0x10B39, 0x10B3F), (0x10B99, 0x10B9C),
    (0x10EAD, 0x10EAD), (0x10F55, 0x10F59), (0x10F86, 0x10F89), (0x11047, 0x1104D),
    (0x110BB, 0x110BC), (0x110BE, 0x110C1), (0x11140, 0x11143), (0x11174, 0x11175),
    (0x111C5, 0x111C8), (0x111CD, 0x111CD), (0x111DB, 0x111DB), (0x111DD, 0x111DF),
    (0x11238, 0x1123D), (0x112A9, 0x112A9), (0x1144B, 0x1144F), (0x1145A, 0x1145B),
    (0x1145D, 0x1145D), (0x114C6, 0x114C6), (0x115C1, 0x115D7), (0x11641, 0x11643),
    (0x11660, 0x1166C), (0x116B9, 0x116B9), (0x1173C, 0x1173E), (0x1183B, 0x1183B),
    (0x11944, 0x11946), (0x119E2, 0x119E2), (0x11A3F, 0x11A46), (0x11A9A, 0x11A9C),
    (0x11A9E, 0x11AA2), (0x11B00, 0x11B09), (0x11C41, 0x11C45), (0x11C70, 0x11C71),
    (0x11EF7, 0x11EF8), (0x11F43, 0x11F4F), (0x11FFF, 0x11FFF), (0x12470, 0x12474),
    (0x12FF1, 0x12FF2), (0x16A6E, 0x16A6F), (0x16AF5, 0x16AF5), (0x16B37, 0x16B3B),
    (0x16B44, 0x16B44), (0x16E97, 0x16E9A), (0x16FE2, 0x16FE2), (0x1BC9F, 0x1BC9F),
    (0x1DA87, 0x1DA8B), (0x1E95E, 0x1E95F),
];

/// Unicode general category P beyond the ASCII range.
///
/// The caller's `code > 127` guard handles ASCII punctuation, so only
/// the non-ASCII ranges are tabulated.
fn is_punctuation(c: char) -> bool {
    let code = c as u32;
    PUNCTUATION_RANGES
        .binary_search_by(|&(lo, hi)| {
            if hi < code {
                Ordering::Less
            } else if lo > code {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        })
        .is_ok()
}

/// Rank up to four suggestions for `query` against the current state.
///
/// An empty query matches every candidate and ranks purely by frequency.
/// Otherwise prefix matches beat substring matches beat near-misses
/// within edit distance 3; everything further is discarded.
pub fn suggest(state: &Projection, query: &str) -> Vec<Suggestion> {
    let active: Vec<String> = state
        .active_todo_names()
        .iter()
        .map(|name| name.to_lowercase())
        .collect();
    let query_lower = query.to_lowercase();

    let mut candidates: Vec<Candidate> = Vec::new();

    for (name, freq) in state.name_frequency() {
        let name_lower = name.to_lowercase();

        // Names already on the active list are not suggested back.
        if active.contains(&name_lower) {
            continue;
        }

        let mut score = if query.is_empty() {
            freq as f64 * 1000.0
        } else if name_lower.starts_with(&query_lower) {
            freq as f64 * 1000.0 + 500.0
        } else if name_lower.contains(&query_lower) {
            freq as f64 * 1000.0 + 250.0
        } else {
            let distance = levenshtein(query, &name);
            if distance > MAX_DISTANCE {
                continue;
            }
            freq as f64 * 1000.0 - distance as f64 * 100.0
        };

        // Remembered category, if it still exists, makes the suggestion
        // one tap instead of two.
        let mut category_id = None;
        let mut category_name = None;
        if let Some(last) = state.last_category_for_name(&name) {
            if let Some(category) = state.get_category(&last) {
                category_id = Some(last);
                category_name = Some(category.name);
                score += 200.0;
            }
        }

        if contains_emoji(&name) {
            score += 300.0;
        }

        candidates.push(Candidate {
            suggestion: Suggestion {
                name,
                category_id,
                category_name,
            },
            score,
        });
    }

    // Stable sort: equal scores keep their relative order.
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    candidates
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|c| c.suggestion)
        .collect()
}
