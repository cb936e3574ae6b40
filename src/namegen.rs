//! Candidate username generators.
//!
//! Five pure strategies, each producing names of a fixed length from its
//! own alphabet. Batches are collision-free: generation retries until the
//! requested number of distinct names is collected, bounded by an attempt
//! cap so small alphabets fail loudly instead of looping forever.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand::seq::SliceRandom;

const MIXED: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const CONSONANTS: &[u8] = b"bcdfghjklmnpqrstvwxyz";
const VOWELS: &[u8] = b"aeiou";

// Upper bound on generation attempts per batch, as a multiple of the
// requested count. Exhausting it means the alphabet/length combination
// cannot supply `count` distinct names in reasonable time.
const ATTEMPT_FACTOR: usize = 64;
const MIN_ATTEMPTS: usize = 256;

/// A generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Lowercase letters and digits, uniform per position.
    Mixed,
    /// Lowercase letters only.
    Letters,
    /// Digits only; leading zeros allowed.
    Numbers,
    /// Alternating consonant/vowel, starting with a consonant.
    Pronounceable,
    /// Lowercase letters with roughly half of the mappable ones replaced
    /// by their leetspeak digit (`a→4 e→3 i→1 o→0 s→5 t→7 g→9`).
    Leetspeak,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mixed => write!(f, "mixed"),
            Self::Letters => write!(f, "letters"),
            Self::Numbers => write!(f, "numbers"),
            Self::Pronounceable => write!(f, "pronounceable"),
            Self::Leetspeak => write!(f, "leetspeak"),
        }
    }
}

/// The name given to [`Kind::from_str`] is not a generation strategy.
#[derive(Debug, Clone)]
pub struct UnknownKind {
    name: String,
}

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown generator kind `{}` (expected mixed, letters, numbers, \
             pronounceable, or leetspeak)",
            self.name
        )
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for Kind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mixed" => Ok(Self::Mixed),
            "letters" => Ok(Self::Letters),
            "numbers" => Ok(Self::Numbers),
            "pronounceable" => Ok(Self::Pronounceable),
            "leetspeak" => Ok(Self::Leetspeak),
            other => Err(UnknownKind { name: other.into() }),
        }
    }
}

/// What to generate: strategy, name length, batch size, and whether to
/// shuffle the finished batch.
///
/// Consumed per call; not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spec {
    /// The generation strategy.
    pub kind: Kind,
    /// Characters per name. Must be at least 1.
    pub length: usize,
    /// Number of distinct names to produce. Must be at least 1.
    pub count: usize,
    /// Shuffle the batch (Fisher-Yates) before returning it.
    pub random_order: bool,
}

/// Errors from [`generate`].
#[derive(Debug)]
#[non_exhaustive]
pub enum GenerateError {
    /// `length` was zero.
    ZeroLength,
    /// `count` was zero.
    ZeroCount,
    /// The attempt cap was hit before `count` distinct names appeared;
    /// the alphabet/length combination is too small for the batch.
    SpaceExhausted {
        /// The strategy that ran out of room.
        kind: Kind,
        /// The requested name length.
        length: usize,
        /// The requested batch size.
        count: usize,
    },
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroLength => write!(f, "generated names must be at least one character long"),
            Self::ZeroCount => write!(f, "at least one name must be requested"),
            Self::SpaceExhausted {
                kind,
                length,
                count,
            } => {
                write!(
                    f,
                    "could not collect {count} distinct {kind} names of length {length}"
                )
            }
        }
    }
}

impl std::error::Error for GenerateError {}

fn pick<R: Rng + ?Sized>(rng: &mut R, alphabet: &[u8]) -> char {
    alphabet[rng.random_range(0..alphabet.len())] as char
}

fn leet_substitute(ch: char) -> Option<char> {
    match ch {
        'a' => Some('4'),
        'e' => Some('3'),
        'i' => Some('1'),
        'o' => Some('0'),
        's' => Some('5'),
        't' => Some('7'),
        'g' => Some('9'),
        _ => None,
    }
}

fn one<R: Rng + ?Sized>(kind: Kind, length: usize, rng: &mut R) -> String {
    let mut name = String::with_capacity(length);
    for position in 0..length {
        let ch = match kind {
            Kind::Mixed => pick(rng, MIXED),
            Kind::Letters => pick(rng, LETTERS),
            Kind::Numbers => pick(rng, DIGITS),
            Kind::Pronounceable => {
                if position % 2 == 0 {
                    pick(rng, CONSONANTS)
                } else {
                    pick(rng, VOWELS)
                }
            }
            Kind::Leetspeak => {
                let ch = pick(rng, LETTERS);
                match leet_substitute(ch) {
                    Some(digit) if rng.random_bool(0.5) => digit,
                    _ => ch,
                }
            }
        };
        name.push(ch);
    }
    name
}

/// Generate a batch of distinct candidate names.
///
/// Equivalent to [`generate_with`] seeded from the thread-local RNG.
///
/// # Errors
///
/// See [`generate_with`].
pub fn generate(spec: &Spec) -> Result<Vec<String>, GenerateError> {
    generate_with(spec, &mut rand::rng())
}

/// Generate a batch of distinct candidate names from a caller-supplied
/// random source.
///
/// Names are collected in generation order; collisions are regenerated.
/// With `random_order` set, the finished batch gets a final Fisher-Yates
/// shuffle.
///
/// # Errors
///
/// Returns [`GenerateError::ZeroLength`] or [`GenerateError::ZeroCount`]
/// for degenerate specs, and [`GenerateError::SpaceExhausted`] when the
/// attempt cap is hit before `count` distinct names appear (e.g. eleven
/// distinct one-digit names).
///
/// # Example
///
/// ```
/// use roblox_avail::namegen::{Kind, Spec, generate};
///
/// let names = generate(&Spec {
///     kind: Kind::Letters,
///     length: 3,
///     count: 5,
///     random_order: false,
/// })
/// .expect("26^3 names to draw from");
/// assert_eq!(names.len(), 5);
/// ```
pub fn generate_with<R: Rng + ?Sized>(
    spec: &Spec,
    rng: &mut R,
) -> Result<Vec<String>, GenerateError> {
    if spec.length == 0 {
        return Err(GenerateError::ZeroLength);
    }
    if spec.count == 0 {
        return Err(GenerateError::ZeroCount);
    }

    let attempt_budget = spec.count.saturating_mul(ATTEMPT_FACTOR).max(MIN_ATTEMPTS);
    let mut seen = HashSet::with_capacity(spec.count);
    let mut names = Vec::with_capacity(spec.count);
    let mut attempts = 0;

    while names.len() < spec.count {
        if attempts == attempt_budget {
            return Err(GenerateError::SpaceExhausted {
                kind: spec.kind,
                length: spec.length,
                count: spec.count,
            });
        }
        attempts += 1;

        let name = one(spec.kind, spec.length, rng);
        if seen.insert(name.clone()) {
            names.push(name);
        }
    }

    if spec.random_order {
        names.shuffle(rng);
    }

    Ok(names)
}
