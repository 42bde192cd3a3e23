use std::fmt;
use rand::{rngs::OsRng, Rng};

/// The smallest PIN any policy may produce.
pub const MIN_PIN: u32 = 100;

const MIN_DIGITS: u32 = 3;
const MAX_DIGITS: u32 = 9;
const MAX_INPUT_LEN: usize = 32;

/// A numeric PIN.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pin(u32);

impl Pin {
    /// Wraps a raw number.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the numeric value.
    pub fn value(self) -> u32 {
        self.0
    }

    /// Parses a candidate typed by a user.
    ///
    /// Surrounding whitespace is ignored and leading zeros are allowed,
    /// so `"0123"` and `"123"` are the same PIN. Anything that is not a
    /// plain run of at most nine digits yields `None`.
    pub fn parse(candidate: &str) -> Option<Self> {
        let digits = candidate.trim();
        if digits.is_empty()
            || digits.len() > MAX_INPUT_LEN
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let significant = digits.trim_start_matches('0');
        if significant.len() > MAX_DIGITS as usize {
            return None;
        }
        if significant.is_empty() {
            return Some(Pin(0));
        }
        significant.parse().ok().map(Pin)
    }

    /// The canonical decimal form that keys are derived from.
    pub fn canonical(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Keep PINs out of debug logs.
impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(***)")
    }
}

/// How new PINs are drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PinPolicy {
    digits: u32,
}

impl Default for PinPolicy {
    fn default() -> Self {
        Self { digits: 6 }
    }
}

impl PinPolicy {
    /// A policy producing PINs of exactly `digits` digits, or `None` when
    /// `digits` is outside 3..=9.
    pub fn new(digits: u32) -> Option<Self> {
        (MIN_DIGITS..=MAX_DIGITS)
            .contains(&digits)
            .then_some(Self { digits })
    }

    /// Number of digits in generated PINs.
    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// Number of distinct PINs this policy can produce.
    pub fn space(&self) -> u32 {
        self.upper() - self.lower()
    }

    fn lower(&self) -> u32 {
        10u32.pow(self.digits - 1)
    }

    fn upper(&self) -> u32 {
        10u32.pow(self.digits)
    }

    /// Draws a PIN uniformly from `[10^(digits-1), 10^digits)` using the OS RNG.
    pub fn generate(&self) -> Pin {
        Pin(OsRng.gen_range(self.lower()..self.upper()))
    }
}
