//! An arbitrary-width bit vector stored as 30-bit limbs, little limb first.
//!
//! The limb width is chosen so each limb holds a whole number of digits in both supported text
//! encodings (six base-32 digits, five base-64 digits). Vectors are always kept clamped: the only
//! vector whose top limb is zero is the zero vector itself, `[0]`. That keeps derived equality
//! and the text encoding canonical.

use std::fmt;
use std::fmt::{Debug, Display, Formatter};

use smallvec::{smallvec, SmallVec};

use crate::errors::BitVectorError;

/// Number of bits used in each limb.
pub const LIMB_BITS: usize = 30;

const LIMB_MASK: u32 = (1 << LIMB_BITS) - 1;

/// Limbs kept inline before spilling to the heap; enough for the candidate sets of most short
/// entries once a letter or two is known.
const INLINE_LIMBS: usize = 4;

/// Digit alphabet. Base 32 uses the first 32 characters, base 64 all of them.
const DIGITS: &[u8; 64] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ-_";

/// Supported text encodings for `BitVector`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Radix {
    /// Five bits per digit, `0-9a-v`, case-insensitive on input.
    Base32,
    /// Six bits per digit, `0-9a-zA-Z-_`, case-sensitive.
    Base64,
}

impl Radix {
    pub fn bits_per_digit(self) -> usize {
        match self {
            Radix::Base32 => 5,
            Radix::Base64 => 6,
        }
    }

    fn digits_per_limb(self) -> usize {
        LIMB_BITS / self.bits_per_digit()
    }

    fn digit_char(self, value: u32) -> char {
        debug_assert!(value < 1 << self.bits_per_digit(), "{value} is not a {self} digit");
        DIGITS[value as usize] as char
    }

    fn digit_value(self, digit: char) -> Option<u32> {
        match self {
            Radix::Base32 => digit.to_digit(32),
            Radix::Base64 => match digit {
                '0'..='9' => Some(digit as u32 - '0' as u32),
                'a'..='z' => Some(digit as u32 - 'a' as u32 + 10),
                'A'..='Z' => Some(digit as u32 - 'A' as u32 + 36),
                '-' => Some(62),
                '_' => Some(63),
                _ => None,
            },
        }
    }
}

impl Display for Radix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Radix::Base32 => write!(f, "base-32"),
            Radix::Base64 => write!(f, "base-64"),
        }
    }
}

/// An unbounded bit string. Bit `i` lives in limb `i / 30` at position `i % 30`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitVector {
    limbs: SmallVec<[u32; INLINE_LIMBS]>,
}

impl BitVector {
    /// The canonical zero vector.
    pub fn zero() -> BitVector {
        BitVector { limbs: smallvec![0] }
    }

    /// Build a vector from raw limbs (the persisted representation). Trailing zero limbs are
    /// stripped; a limb using more than 30 bits is rejected.
    pub fn from_limbs(limbs: &[u32]) -> Result<BitVector, BitVectorError> {
        if let Some(&limb) = limbs.iter().find(|&&limb| limb > LIMB_MASK) {
            return Err(BitVectorError::LimbOutOfRange { limb });
        }

        let mut result = BitVector { limbs: limbs.iter().copied().collect() };
        if result.limbs.is_empty() {
            result.limbs.push(0);
        }
        result.clamp();

        Ok(result)
    }

    pub fn limbs(&self) -> &[u32] {
        &self.limbs
    }

    pub fn is_zero(&self) -> bool {
        self.limbs.len() == 1 && self.limbs[0] == 0
    }

    /// Set bit `index`, growing the vector if needed. Only call this on a vector that isn't
    /// shared with any other search branch.
    pub fn set_bit(&mut self, index: usize) {
        let limb_idx = index / LIMB_BITS;
        if limb_idx >= self.limbs.len() {
            self.limbs.resize(limb_idx + 1, 0);
        }
        self.limbs[limb_idx] |= 1 << (index % LIMB_BITS);
    }

    /// Index of the highest set bit plus one, or 0 for the zero vector.
    pub fn bit_length(&self) -> usize {
        let top = self.limbs.len() - 1;
        match self.limbs[top] {
            0 => 0,
            high => top * LIMB_BITS + (32 - high.leading_zeros() as usize),
        }
    }

    /// Number of set bits.
    pub fn bit_count(&self) -> usize {
        self.limbs.iter().map(|limb| limb.count_ones() as usize).sum()
    }

    /// Bitwise AND as a new vector.
    pub fn and(&self, other: &BitVector) -> BitVector {
        let mut result = BitVector {
            limbs: self.limbs.iter().zip(&other.limbs).map(|(a, b)| a & b).collect(),
        };
        result.clamp();
        result
    }

    /// Bitwise AND into `self`. Limbs past the end of `other` become zero.
    pub fn and_in_place(&mut self, other: &BitVector) {
        self.limbs.truncate(other.limbs.len());
        for (limb, other_limb) in self.limbs.iter_mut().zip(&other.limbs) {
            *limb &= other_limb;
        }
        self.clamp();
    }

    /// Iterate over the indices of set bits, highest first.
    pub fn active_bits(&self) -> ActiveBits<'_> {
        ActiveBits {
            limbs: &self.limbs,
            remaining_limbs: self.limbs.len(),
            current: 0,
        }
    }

    /// Encode as digits, most significant first. The zero vector encodes as `"0"`.
    pub fn to_str_radix(&self, radix: Radix) -> String {
        let bits = radix.bits_per_digit();
        let digit_mask = (1u32 << bits) - 1;
        let mut result = String::with_capacity(self.limbs.len() * radix.digits_per_limb());

        for &limb in self.limbs.iter().rev() {
            for digit_idx in (0..radix.digits_per_limb()).rev() {
                let value = (limb >> (digit_idx * bits)) & digit_mask;
                if result.is_empty() && value == 0 {
                    continue;
                }
                result.push(radix.digit_char(value));
            }
        }

        if result.is_empty() {
            result.push('0');
        }
        result
    }

    /// Decode digits written by `to_str_radix`. Leading zeros are accepted.
    pub fn from_str_radix(text: &str, radix: Radix) -> Result<BitVector, BitVectorError> {
        if text.is_empty() {
            return Err(BitVectorError::EmptyInput);
        }

        let bits = radix.bits_per_digit();
        let per_limb = radix.digits_per_limb();
        let digit_count = text.chars().count();

        let mut limbs: SmallVec<[u32; INLINE_LIMBS]> = smallvec![0; digit_count.div_ceil(per_limb)];
        for (position, digit) in text.chars().rev().enumerate() {
            let value = radix
                .digit_value(digit)
                .ok_or(BitVectorError::InvalidDigit { digit, radix })?;
            limbs[position / per_limb] |= value << ((position % per_limb) * bits);
        }

        let mut result = BitVector { limbs };
        result.clamp();
        Ok(result)
    }

    /// Strip trailing zero limbs, keeping at least one.
    fn clamp(&mut self) {
        while self.limbs.len() > 1 && self.limbs.last() == Some(&0) {
            self.limbs.pop();
        }
    }
}

impl Default for BitVector {
    fn default() -> BitVector {
        BitVector::zero()
    }
}

impl Debug for BitVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitVector")
            .field("bits", &self.to_str_radix(Radix::Base64))
            .field("count", &self.bit_count())
            .finish()
    }
}

impl Display for BitVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str_radix(Radix::Base32))
    }
}

/// Iterator returned by `BitVector::active_bits`.
#[derive(Debug, Clone)]
pub struct ActiveBits<'a> {
    limbs: &'a [u32],
    remaining_limbs: usize,
    current: u32,
}

impl Iterator for ActiveBits<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            if self.remaining_limbs == 0 {
                return None;
            }
            self.remaining_limbs -= 1;
            self.current = self.limbs[self.remaining_limbs];
        }

        let bit = 31 - self.current.leading_zeros() as usize;
        self.current &= !(1 << bit);
        Some(self.remaining_limbs * LIMB_BITS + bit)
    }
}
