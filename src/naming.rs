//! Random agent names.

use rand::{seq::SliceRandom, Rng};

const CONSONANTS: &[u8] = b"bcdfghjklmnpqrstvwxyz";
const VOWELS: &[u8] = b"aeiou";

/// Capitalized name made of `num_syllables` consonant-vowel syllables, e.g. `Bakilo`.
pub fn generate_agent_name(num_syllables: usize) -> String {
    generate_agent_name_with(&mut rand::thread_rng(), num_syllables)
}

/// Same as [`generate_agent_name`] with a caller-provided generator.
pub fn generate_agent_name_with<R: Rng + ?Sized>(rng: &mut R, num_syllables: usize) -> String {
    let mut name = String::with_capacity(num_syllables * 2);
    for _ in 0..num_syllables {
        if let (Some(&c), Some(&v)) = (CONSONANTS.choose(rng), VOWELS.choose(rng)) {
            name.push(c as char);
            name.push(v as char);
        }
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => name,
    }
}
