//! Structural Identities
//!
//! A [`Hosh`] identifies either a piece of content or a computation over other
//! identities. Hoshes form a group so identities can be composed without ever
//! looking at the underlying content again.
//!
//! ## Algebra
//!
//! ```text
//! (a, b, c) * (a', b', c') = (a + a', b + b', c + c' + a·b')     mod p
//! (a, b, c) + (a', b', c') = (a + a', b + b', c + c')            mod p
//! ```
//!
//! with p = 2^61 − 1. `*` is associative but order-sensitive: it composes a
//! function identity with the identities of its arguments. `+` is commutative
//! and is used to fold the entries of a map, so insertion order never leaks
//! into a map identity.
//!
//! ## Display Format
//!
//! The id is the 48-character lowercase hex encoding of the three components:
//! ```text
//! 0b1f4c6a2d93e07f 1c52d7a0e6b93f44 03a9c8e71d5b2f60
//! ```
//! (printed without the spaces).

use std::fmt;
use std::ops::{Add, AddAssign, Mul, MulAssign};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The Mersenne prime 2^61 − 1.
const P: u64 = (1 << 61) - 1;

/// Length of the textual id.
pub const ID_LEN: usize = 48;

/// A structural identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hosh {
    a: u64,
    b: u64,
    c: u64,
}

impl Hosh {
    /// The neutral element: `UNIT * h == h * UNIT == h` and `UNIT + h == h`.
    pub const UNIT: Self = Self { a: 0, b: 0, c: 0 };

    /// Computes the identity of raw bytes.
    pub fn of(content: &[u8]) -> Self {
        Self::from_digest(blake3::hash(content).as_bytes())
    }

    /// Computes the identity of a string.
    pub fn of_str(s: &str) -> Self {
        Self::of(s.as_bytes())
    }

    /// Computes the identity of multiple parts.
    ///
    /// Each part is length-prefixed, so `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn of_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Self::from_digest(hasher.finalize().as_bytes())
    }

    fn from_digest(digest: &[u8; 32]) -> Self {
        let word = |i: usize| {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&digest[i * 8..i * 8 + 8]);
            u64::from_le_bytes(buf) % P
        };
        Self {
            a: word(0),
            b: word(1),
            c: word(2),
        }
    }

    /// Returns the group inverse.
    pub fn inverse(&self) -> Self {
        Self {
            a: neg(self.a),
            b: neg(self.b),
            c: add(neg(self.c), mul(self.a, self.b)),
        }
    }

    /// The identity of output `i` out of `n` outputs of the same computation.
    ///
    /// Multiplying all `n` slices in index order gives back `self`, and a
    /// single-output slice is `self` itself.
    pub fn slice(&self, i: usize, n: usize) -> Self {
        debug_assert!(i < n, "slice index {} out of range for {} outputs", i, n);
        if n <= 1 {
            return *self;
        }
        let id = self.id();
        let part = |j: usize| {
            Self::of_parts(&[
                b"slice",
                id.as_bytes(),
                &(j as u64).to_le_bytes(),
                &(n as u64).to_le_bytes(),
            ])
        };
        if i + 1 < n {
            return part(i);
        }
        let head = (0..n - 1).fold(Self::UNIT, |acc, j| acc * part(j));
        head.inverse() * *self
    }

    /// Returns true for the neutral element.
    pub fn is_unit(&self) -> bool {
        *self == Self::UNIT
    }

    /// Returns the canonical textual id.
    pub fn id(&self) -> String {
        let mut bytes = [0u8; 24];
        bytes[..8].copy_from_slice(&self.a.to_be_bytes());
        bytes[8..16].copy_from_slice(&self.b.to_be_bytes());
        bytes[16..].copy_from_slice(&self.c.to_be_bytes());
        hex::encode(bytes)
    }

    /// Returns a short version of the id (first 8 chars).
    pub fn short(&self) -> String {
        self.id()[..8].to_string()
    }

    /// Parses a canonical textual id.
    pub fn from_id(s: &str) -> Result<Self, HoshParseError> {
        if s.len() != ID_LEN {
            return Err(HoshParseError::InvalidLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|_| HoshParseError::InvalidHex)?;
        let word = |i: usize| -> Result<u64, HoshParseError> {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            let v = u64::from_be_bytes(buf);
            if v >= P {
                return Err(HoshParseError::OutOfRange);
            }
            Ok(v)
        };
        Ok(Self {
            a: word(0)?,
            b: word(1)?,
            c: word(2)?,
        })
    }

    /// Interprets `label` as an id when it is one, otherwise hashes it.
    pub fn from_label(label: &str) -> Self {
        Self::from_id(label).unwrap_or_else(|_| Self::of_str(label))
    }
}

fn add(x: u64, y: u64) -> u64 {
    let s = x + y;
    if s >= P {
        s - P
    } else {
        s
    }
}

fn neg(x: u64) -> u64 {
    if x == 0 {
        0
    } else {
        P - x
    }
}

fn mul(x: u64, y: u64) -> u64 {
    let wide = (x as u128) * (y as u128);
    // 2^61 ≡ 1 (mod p), so the high bits fold onto the low ones.
    let lo = (wide as u64) & P;
    let hi = (wide >> 61) as u64;
    let lo = if lo == P { 0 } else { lo };
    add(lo, hi)
}

impl Mul for Hosh {
    type Output = Hosh;

    fn mul(self, rhs: Hosh) -> Hosh {
        Hosh {
            a: add(self.a, rhs.a),
            b: add(self.b, rhs.b),
            c: add(add(self.c, rhs.c), mul(self.a, rhs.b)),
        }
    }
}

impl MulAssign for Hosh {
    fn mul_assign(&mut self, rhs: Hosh) {
        *self = *self * rhs;
    }
}

impl Mul<&[u8]> for Hosh {
    type Output = Hosh;

    fn mul(self, rhs: &[u8]) -> Hosh {
        self * Hosh::of(rhs)
    }
}

impl Add for Hosh {
    type Output = Hosh;

    fn add(self, rhs: Hosh) -> Hosh {
        Hosh {
            a: add(self.a, rhs.a),
            b: add(self.b, rhs.b),
            c: add(self.c, rhs.c),
        }
    }
}

impl AddAssign for Hosh {
    fn add_assign(&mut self, rhs: Hosh) {
        *self = *self + rhs;
    }
}

impl Default for Hosh {
    fn default() -> Self {
        Self::UNIT
    }
}

impl fmt::Display for Hosh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl fmt::Debug for Hosh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hosh({})", self.short())
    }
}

impl FromStr for Hosh {
    type Err = HoshParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_id(s)
    }
}

impl Serialize for Hosh {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id())
    }
}

impl<'de> Deserialize<'de> for Hosh {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hosh::from_id(&s).map_err(serde::de::Error::custom)
    }
}

/// Error parsing a textual id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HoshParseError {
    #[error("invalid hex string")]
    InvalidHex,
    #[error("invalid id length {0}, expected {ID_LEN}")]
    InvalidLength(usize),
    #[error("id component out of range")]
    OutOfRange,
}
