//! Lorem-ipsum filler text for replies without a stored interaction.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua", "enim",
    "ad", "minim", "veniam", "quis", "nostrud", "exercitation", "ullamco", "laboris", "nisi",
    "aliquip", "ex", "ea", "commodo", "consequat", "duis", "aute", "irure", "in", "reprehenderit",
    "voluptate", "velit", "esse", "cillum", "fugiat", "nulla", "pariatur", "excepteur", "sint",
    "occaecat", "cupidatat", "non", "proident", "sunt", "culpa", "qui", "officia", "deserunt",
    "mollit", "anim", "id", "est", "laborum",
];

const SENTENCE_MIN: usize = 6;
const SENTENCE_MAX: usize = 14;

/// `words` words of filler grouped into sentences. The same seed always
/// produces the same text.
pub fn generate(words: usize, seed: Option<u64>) -> String {
    match seed {
        Some(seed) => generate_with(&mut StdRng::seed_from_u64(seed), words),
        None => generate_with(&mut rand::rng(), words),
    }
}

pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, words: usize) -> String {
    let mut out = String::new();
    let mut remaining = words;

    while remaining > 0 {
        let len = rng.random_range(SENTENCE_MIN..=SENTENCE_MAX).min(remaining);
        remaining -= len;

        if !out.is_empty() {
            out.push(' ');
        }
        for i in 0..len {
            let word = WORDS[rng.random_range(0..WORDS.len())];
            if i == 0 {
                let mut chars = word.chars();
                if let Some(first) = chars.next() {
                    out.extend(first.to_uppercase());
                    out.push_str(chars.as_str());
                }
            } else {
                out.push(' ');
                out.push_str(word);
            }
        }
        out.push('.');
    }
    out
}
