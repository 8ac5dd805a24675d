use rand::seq::SliceRandom;

/// Character-level Levenshtein distance, two-row DP.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Match user input against literal option labels: exact match wins, else
/// the closest label by edit distance is accepted when
/// `distance / input_length` stays strictly under 0.5.
pub(crate) fn match_option<'a>(
    text: &str,
    labels: impl Iterator<Item = &'a String>,
) -> Option<&'a String> {
    let labels: Vec<&String> = labels.collect();
    if let Some(exact) = labels.iter().find(|l| l.as_str() == text) {
        return Some(exact);
    }
    let closest = labels.iter().copied().min_by_key(|l| levenshtein(text, l))?;
    let distance = levenshtein(text, closest);
    let ratio = distance as f64 / text.chars().count().max(1) as f64;
    if ratio < 0.5 {
        Some(closest)
    } else {
        None
    }
}

/// Random pick among configured reply variants.
pub(crate) fn choose(words: &[String]) -> Option<&str> {
    words.choose(&mut rand::thread_rng()).map(|s| s.as_str())
}
