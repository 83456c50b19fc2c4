use crate::index::term::TermEntry;

pub const DEFAULT_MAX_EDIT_DISTANCE: usize = 2;

/// Edit distance where an edit is one inserted character, one deleted
/// character, or two adjacent characters swapped. Replacing a character
/// costs a deletion plus an insertion.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let len_a = a.len();
    let len_b = b.len();

    if len_a == 0 {
        return len_b;
    }
    if len_b == 0 {
        return len_a;
    }

    let mut prev_prev_row: Vec<usize> = vec![0; len_b + 1];
    let mut prev_row: Vec<usize> = (0..=len_b).collect();
    let mut curr_row = vec![0; len_b + 1];

    for i in 1..=len_a {
        curr_row[0] = i;

        for j in 1..=len_b {
            let mut best = std::cmp::min(
                prev_row[j] + 1,     // deletion
                curr_row[j - 1] + 1, // insertion
            );

            if a[i - 1] == b[j - 1] {
                best = best.min(prev_row[j - 1]);
            }

            if i > 1 && j > 1
                && a[i - 1] == b[j - 2]
                && a[i - 2] == b[j - 1]
                && a[i - 1] != a[i - 2]
            {
                best = best.min(prev_prev_row[j - 2] + 1);
            }

            curr_row[j] = best;
        }

        std::mem::swap(&mut prev_prev_row, &mut prev_row);
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[len_b]
}

/// Pick the best correction for `word` from a spelling dictionary stream.
///
/// Candidates must arrive in ascending term order with their summed
/// frequency in `term_freq`. The winner has the lowest distance, then the
/// highest frequency, then sorts first. `word` itself is never returned.
pub fn best_suggestion<I>(word: &str, candidates: I, max_edit_distance: usize) -> String
where
    I: IntoIterator<Item = TermEntry>,
{
    if word.is_empty() {
        return String::new();
    }
    let word_len = word.chars().count();

    let mut best: Option<(usize, u64, String)> = None;
    for candidate in candidates {
        if candidate.term == word || candidate.term_freq == 0 {
            continue;
        }
        if candidate.term.chars().count().abs_diff(word_len) > max_edit_distance {
            continue;
        }

        let distance = edit_distance(word, &candidate.term);
        if distance > max_edit_distance {
            continue;
        }

        let better = match &best {
            None => true,
            Some((best_distance, best_freq, _)) => {
                distance < *best_distance
                    || (distance == *best_distance && candidate.term_freq > *best_freq)
            }
        };
        if better {
            best = Some((distance, candidate.term_freq, candidate.term));
        }
    }

    best.map(|(_, _, term)| term).unwrap_or_default()
}
