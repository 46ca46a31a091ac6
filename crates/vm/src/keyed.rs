//! Opcode semantics parameterised by a secret key.
//!
//! Together with [`Tape::crackme`](tape::Tape::crackme) the key implements a
//! small Feistel network: the inputs are whitened, mixed and swapped for
//! `rounds` rounds, whitened again and compared against the expected output.

use std::{fmt, mem, num::ParseIntError, ops::RangeInclusive, str::FromStr};

use rand::Rng;
use tape::OpCode;

use crate::{Fetch, Registers, Semantics, Stride};

//

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("expected 7 fields separated by `:`, got {0}")]
    FieldCount(usize),
    #[error("field {index} is not a number")]
    Field {
        index: usize,
        #[source]
        source: ParseIntError,
    },
    #[error("rounds must be within 16..=32, got {0}")]
    Rounds(u64),
}

//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    /// Added to the round counter by `advance`.
    pub step: u64,
    pub rounds: u64,
    pub whiten_a: u64,
    pub whiten_b: u64,
    pub salt: u64,
    pub expected_a: u64,
    pub expected_b: u64,
}

impl Key {
    /// Round counts a key may have.
    pub const ROUNDS: RangeInclusive<u64> = 16..=32;

    /// The key the crackme ships with. Its answer is
    /// `6c3f1e0b7d2a9458 0d5e8c71a3b64f29`.
    pub const BUILTIN: Key = Key {
        step: 0x9e37_79b9_7f4a_7c15,
        rounds: 24,
        whiten_a: 0x243f_6a88_85a3_08d3,
        whiten_b: 0x1319_8a2e_0370_7344,
        salt: 0xa409_3822_299f_31d0,
        expected_a: 0xa39b_3740_a537_e508,
        expected_b: 0x4526_e2cd_7381_1a61,
    };

    /// Draws a fresh key that accepts exactly the flag `a`, `b`.
    pub fn for_flag<R: Rng + ?Sized>(rng: &mut R, a: u64, b: u64) -> Self {
        let mut key = Key {
            step: rng.gen(),
            rounds: rng.gen_range(Self::ROUNDS),
            whiten_a: rng.gen(),
            whiten_b: rng.gen(),
            salt: rng.gen(),
            expected_a: 0,
            expected_b: 0,
        };
        (key.expected_a, key.expected_b) = key.encrypt(a, b);
        key
    }

    /// Value of the round counter once every round has run.
    pub const fn target(&self) -> u64 {
        self.rounds.wrapping_mul(self.step)
    }

    const fn mix(&self, counter: u64, b: u64) -> u64 {
        counter.wrapping_add(self.salt) ^ (counter >> 30) ^ (b << 24)
    }

    /// What the tape computes from the inputs before the final comparison.
    pub fn encrypt(&self, a: u64, b: u64) -> (u64, u64) {
        let (mut a, mut b) = (a ^ self.whiten_a, b ^ self.whiten_b);
        let target = self.target();
        let mut counter = 0u64;
        while counter != target {
            counter = counter.wrapping_add(self.step);
            a ^= self.mix(counter, b);
            mem::swap(&mut a, &mut b);
        }
        (a ^ self.whiten_a, b ^ self.whiten_b)
    }

    /// Runs the rounds backwards, counting down from the final counter.
    pub fn decrypt(&self, a: u64, b: u64) -> (u64, u64) {
        let (mut a, mut b) = (a ^ self.whiten_a, b ^ self.whiten_b);
        let mut counter = self.target();
        while counter != 0 {
            mem::swap(&mut a, &mut b);
            a ^= self.mix(counter, b);
            counter = counter.wrapping_sub(self.step);
        }
        (a ^ self.whiten_a, b ^ self.whiten_b)
    }

    /// The inputs that make the crackme succeed under this key.
    pub fn solve(&self) -> (u64, u64) {
        self.decrypt(self.expected_a, self.expected_b)
    }
}

impl Semantics for Key {
    fn apply(&self, fetch: Fetch, regs: &mut Registers) -> Stride {
        match OpCode::from_byte(fetch.opcode) {
            OpCode::Advance => {
                regs.check = regs.check.wrapping_add(self.step);
                1
            }
            OpCode::Mix => {
                regs.a ^= self.mix(regs.check, regs.b);
                1
            }
            OpCode::Swap => {
                mem::swap(&mut regs.a, &mut regs.b);
                1
            }
            OpCode::Whiten => {
                regs.a ^= self.whiten_a;
                regs.b ^= self.whiten_b;
                1
            }
            OpCode::Jump => fetch.operand() as Stride,
            OpCode::Branch => {
                if regs.check == self.target() {
                    fetch.operand() as Stride
                } else {
                    2
                }
            }
            OpCode::Verify => {
                regs.check = (regs.a != self.expected_a || regs.b != self.expected_b) as u64;
                0
            }
            OpCode::Halt | OpCode::Invalid => 0,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:016x}:{}:{:016x}:{:016x}:{:016x}:{:016x}:{:016x}",
            self.step,
            self.rounds,
            self.whiten_a,
            self.whiten_b,
            self.salt,
            self.expected_a,
            self.expected_b
        )
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.trim().split(':').collect();
        let [step, rounds, whiten_a, whiten_b, salt, expected_a, expected_b] = fields[..] else {
            return Err(KeyError::FieldCount(fields.len()));
        };

        let hex = |index: usize, field: &str| {
            u64::from_str_radix(field, 16).map_err(|source| KeyError::Field { index, source })
        };

        let rounds: u64 = rounds
            .parse()
            .map_err(|source| KeyError::Field { index: 1, source })?;
        if !Key::ROUNDS.contains(&rounds) {
            return Err(KeyError::Rounds(rounds));
        }

        Ok(Key {
            step: hex(0, step)?,
            rounds,
            whiten_a: hex(2, whiten_a)?,
            whiten_b: hex(3, whiten_b)?,
            salt: hex(4, salt)?,
            expected_a: hex(5, expected_a)?,
            expected_b: hex(6, expected_b)?,
        })
    }
}

//
