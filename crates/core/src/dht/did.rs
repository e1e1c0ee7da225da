#![warn(missing_docs)]

//! Identifiers on the ring.
//!
//! Nodes and keys share one circular space of 2^256 identifiers. A [Did] is the SHA-256
//! digest of a node address or of a key, read as a big endian unsigned integer. The
//! space forms the finite ring Z/2^256, so addition, subtraction and negation wrap.
//!
//! Ordering on a circle only makes sense relative to a reference point. [Did::in_range]
//! answers "does x sit strictly between min and max walking clockwise", which is the
//! only comparison the lookup and stabilization code needs.

use std::ops::Add;
use std::ops::Deref;
use std::ops::Neg;
use std::ops::Sub;
use std::str::FromStr;

use ethereum_types::H256;
use num_bigint::BigUint;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::consts::RING_BITS;
use crate::error::Error;
use crate::error::Result;

/// Did is a finite Ring R(P) where P = 2^256, wrap H256.
#[derive(Copy, Clone, Default, Eq, Ord, PartialEq, PartialOrd, Debug, Serialize, Deserialize, Hash)]
pub struct Did(H256);

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let inner = &self.0;
        write!(f, "0x{inner:x}")
    }
}

fn modulus() -> BigUint {
    BigUint::from(2u16).pow(RING_BITS as u32)
}

impl Did {
    /// Hash arbitrary text onto the ring. Used for node addresses and keys alike.
    pub fn digest(s: &str) -> Self {
        let hash = Sha256::digest(s.as_bytes());
        Self(H256::from_slice(hash.as_slice()))
    }

    /// The all zero identifier.
    pub fn zero() -> Self {
        Self(H256::zero())
    }

    /// Test x <- (min, max), an open interval walked clockwise.
    ///
    /// Three cases hold the answer: no wrap (`min < x < max`), wrap with x past zero
    /// (`x < max < min`) and wrap with x before zero (`max < min < x`). An empty
    /// interval such as `(x, x)` contains nothing.
    pub fn in_range(&self, min: Self, max: Self) -> bool {
        let x = *self;
        (x > min && max > x) || (max > x && min > max) || (min > max && x > min)
    }

    /// Start of the `i`-th finger interval: `(self + 2^(i-1)) mod 2^256`.
    ///
    /// `i` is expected in `1..=256`; index 0 names the node itself and maps to `self`.
    pub fn target(&self, i: usize) -> Self {
        if i == 0 {
            return *self;
        }
        *self + Did::from(BigUint::from(2u16).pow((i - 1) as u32))
    }
}

impl Deref for Did {
    type Target = H256;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Did> for H256 {
    fn from(a: Did) -> Self {
        a.0
    }
}

impl From<H256> for Did {
    fn from(h: H256) -> Self {
        Self(h)
    }
}

impl From<u32> for Did {
    fn from(id: u32) -> Did {
        Self::from(BigUint::from(id))
    }
}

impl From<Did> for BigUint {
    fn from(did: Did) -> BigUint {
        BigUint::from_bytes_be(did.as_bytes())
    }
}

impl From<BigUint> for Did {
    fn from(a: BigUint) -> Self {
        let reduced = (a % modulus()).to_bytes_be();
        let mut res = [0u8; 32];
        res[32 - reduced.len()..].copy_from_slice(&reduced);
        Self(H256::from(res))
    }
}

impl TryFrom<&[u8]> for Did {
    type Error = Error;
    fn try_from(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::BadIdLength(bytes.len()));
        }
        Ok(Self(H256::from_slice(bytes)))
    }
}

impl FromStr for Did {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        Did::try_from(bytes.as_slice())
    }
}

// impl Finite Ring For Did
impl Neg for Did {
    type Output = Self;
    fn neg(self) -> Self {
        (modulus() - BigUint::from(self)).into()
    }
}

impl Add for Did {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        (BigUint::from(self) + BigUint::from(rhs)).into()
    }
}

impl Sub for Did {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}
