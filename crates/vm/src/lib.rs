use std::fmt;

use log::{debug, info};
use tape::Tape;

pub use keyed::{Key, KeyError};

mod keyed;

//

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error("the tape has no instructions")]
    EmptyTape,
    #[error("ran out of fuel")]
    OutOfFuel,
}

//

/// Number of tape positions to move after an instruction. Zero halts.
pub type Stride = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub a: u64,
    pub b: u64,
    /// Accumulator; the run passes when it ends at zero.
    pub check: u64,
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "a: {:#018x}, b: {:#018x}, check: {:#018x}",
            self.a, self.b, self.check
        )
    }
}

/// One instruction as seen by the opcode semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetch {
    pub pc: usize,
    pub opcode: i8,
    /// The eight tape bytes starting at `pc`, see [`Tape::window`].
    pub window: u64,
}

impl Fetch {
    /// The byte following the opcode, sign extended.
    pub fn operand(&self) -> i8 {
        (self.window >> 8) as u8 as i8
    }
}

/// What each opcode does to the registers and how far it moves the program
/// counter.
pub trait Semantics {
    /// Runs a non-negative opcode.
    fn apply(&self, fetch: Fetch, regs: &mut Registers) -> Stride;

    /// Runs a negative opcode. By default the registers are left alone and
    /// the stride is the raw tape window. That is usually far past the end of
    /// the tape, but a window whose top byte has the high bit set is a
    /// negative stride and may land back inside it.
    fn fall_through(&self, fetch: Fetch, _regs: &mut Registers) -> Stride {
        fetch.window as Stride
    }
}

impl<F> Semantics for F
where
    F: Fn(Fetch, &mut Registers) -> Stride,
{
    fn apply(&self, fetch: Fetch, regs: &mut Registers) -> Stride {
        self(fetch, regs)
    }
}

//

/// How control left the opcode handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Non-negative opcode: the handler bailed out and the loop absorbed it.
    Unwound(Stride),
    /// Negative opcode: the handler returned normally.
    Returned(Stride),
}

impl Signal {
    pub const fn stride(self) -> Stride {
        match self {
            Signal::Unwound(stride) | Signal::Returned(stride) => stride,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Keep going from this tape index.
    Continue(usize),
    Halt,
}

//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// The inputs as they were before any instruction touched them.
    pub input: (u64, u64),
    pub registers: Registers,
    pub steps: usize,
}

impl Run {
    pub fn verdict(&self) -> Verdict {
        if self.registers.check == 0 {
            Verdict::Success {
                a: self.input.0,
                b: self.input.1,
            }
        } else {
            Verdict::Failure
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success { a: u64, b: u64 },
    Failure,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Verdict::Success { a, b } => write!(f, "Success! Your flag is flag{{{a:016x}{b:016x}}}"),
            Verdict::Failure => write!(f, "Error"),
        }
    }
}

//

pub struct Interpreter<S> {
    semantics: S,
    fuel: Option<usize>,
    pc: usize,
    regs: Registers,
}

impl<S: Semantics> Interpreter<S> {
    pub const fn new(semantics: S) -> Self {
        Self {
            semantics,
            fuel: None,
            pc: 0,
            regs: Registers {
                a: 0,
                b: 0,
                check: 0,
            },
        }
    }

    /// Caps the number of instructions each [`Interpreter::run`] may execute.
    /// `None` means unlimited.
    pub fn set_fuel(&mut self, fuel: Option<usize>) {
        self.fuel = fuel;
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn registers(&self) -> Registers {
        self.regs
    }

    pub fn run(&mut self, tape: &Tape, a: u64, b: u64) -> Result<Run, RunError> {
        if tape.is_empty() {
            return Err(RunError::EmptyTape);
        }

        self.pc = 0;
        self.regs = Registers { a, b, check: 0 };

        let mut fuel = self.fuel;
        let mut steps = 0usize;
        loop {
            if let Some(fuel) = fuel.as_mut() {
                if *fuel == 0 {
                    return Err(RunError::OutOfFuel);
                }
                *fuel -= 1;
            }

            steps += 1;
            match self.step(tape) {
                StepOutcome::Continue(pc) => self.pc = pc,
                StepOutcome::Halt => break,
            }
        }

        let run = Run {
            input: (a, b),
            registers: self.regs,
            steps,
        };
        info!("halted after {steps} steps at pc {}: {}", self.pc, run.verdict());

        Ok(run)
    }

    /// Executes the instruction under the program counter and decides where
    /// to go next. Does not move the program counter itself.
    pub fn step(&mut self, tape: &Tape) -> StepOutcome {
        let Some(opcode) = tape.get(self.pc) else {
            return StepOutcome::Halt;
        };
        let fetch = Fetch {
            pc: self.pc,
            opcode,
            window: tape.window(self.pc),
        };

        let signal = self.dispatch(fetch);
        self.debug_state(fetch, signal);

        let stride = signal.stride();
        if stride == 0 {
            return StepOutcome::Halt;
        }

        isize::try_from(stride)
            .ok()
            .and_then(|stride| self.pc.checked_add_signed(stride))
            .filter(|&pc| pc < tape.len())
            .map_or(StepOutcome::Halt, StepOutcome::Continue)
    }

    fn dispatch(&mut self, fetch: Fetch) -> Signal {
        if fetch.opcode >= 0 {
            Signal::Unwound(self.semantics.apply(fetch, &mut self.regs))
        } else {
            Signal::Returned(self.semantics.fall_through(fetch, &mut self.regs))
        }
    }

    fn debug_state(&self, fetch: Fetch, signal: Signal) {
        debug!(
            "pc: {:#04x}, op: {:4}, {:?} | {}",
            fetch.pc, fetch.opcode, signal, self.regs
        );
    }
}

//
