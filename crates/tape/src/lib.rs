use std::fmt;

use lalrpop_util::lalrpop_mod;
use num_enum::{FromPrimitive, IntoPrimitive};

//

lalrpop_mod!(pub grammar);

//

/// The program the crackme ships with.
pub const CRACKME: [i8; 11] = [3, 6, 7, 0, 1, 2, 4, -5, 3, 7, 5];

#[derive(Debug, thiserror::Error)]
#[error("invalid tape: {0}")]
pub struct ParseError(String);

//

/// An immutable sequence of signed opcode bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tape(Vec<i8>);

impl Tape {
    pub fn new(code: Vec<i8>) -> Self {
        Self(code)
    }

    pub fn crackme() -> Self {
        Self::new(CRACKME.to_vec())
    }

    /// Parses the text form written by [`Tape`]'s `Display` impl: mnemonics
    /// or signed decimal bytes, separated by whitespace or commas, with `//`
    /// line comments.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        grammar::TapeParser::new()
            .parse(input)
            .map(Self)
            .map_err(|err| ParseError(err.to_string()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, pc: usize) -> Option<i8> {
        self.0.get(pc).copied()
    }

    pub fn as_slice(&self) -> &[i8] {
        &self.0
    }

    /// The eight bytes starting at `pc` as a little endian word, zero padded
    /// past the end of the tape.
    pub fn window(&self, pc: usize) -> u64 {
        let mut bytes = [0u8; 8];
        if let Some(tail) = self.0.get(pc..) {
            for (dst, src) in bytes.iter_mut().zip(tail) {
                *dst = *src as u8;
            }
        }
        u64::from_le_bytes(bytes)
    }
}

impl fmt::Display for Tape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &byte in self.0.iter() {
            match OpCode::from_byte(byte).as_str() {
                Some(name) => writeln!(f, "{name}")?,
                None => writeln!(f, "{byte}")?,
            }
        }

        Ok(())
    }
}

//

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(i8)]
pub enum OpCode {
    Advance = 0,
    Mix,
    Swap,
    Whiten,
    Jump,
    Halt,
    Branch,
    Verify,
    #[default]
    Invalid = -128,
}

impl OpCode {
    pub fn from_byte(b: i8) -> Self {
        Self::from_primitive(b)
    }

    pub fn into_byte(self) -> i8 {
        self.into()
    }

    pub const fn as_str(&self) -> Option<&'static str> {
        match self {
            OpCode::Advance => Some("advance"),
            OpCode::Mix => Some("mix"),
            OpCode::Swap => Some("swap"),
            OpCode::Whiten => Some("whiten"),
            OpCode::Jump => Some("jump"),
            OpCode::Halt => Some("halt"),
            OpCode::Branch => Some("branch"),
            OpCode::Verify => Some("verify"),
            OpCode::Invalid => None,
        }
    }
}

//
