use std::{
    env,
    io::{self, BufRead, Write},
    num::ParseIntError,
    process::ExitCode,
};

use log::debug;
use tape::Tape;
use vm::{Interpreter, Key, KeyError, RunError, Verdict};

//

/// Far more than any generated key needs; only hand written tapes that jump
/// backwards forever should ever hit it.
const FUEL: usize = 1 << 20;

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
    #[error("expected two hex numbers, got {0}")]
    MissingInput(usize),
    #[error("`{token}` is not a 64-bit hex number")]
    InvalidHex {
        token: String,
        #[source]
        source: ParseIntError,
    },
    #[error("CRACKME_KEY: {0}")]
    Key(#[from] KeyError),
    #[error("CRACKME_TAPE: {0}")]
    Tape(#[from] tape::ParseError),
    #[error(transparent)]
    Run(#[from] RunError),
}

//

fn main() -> ExitCode {
    env_logger::init();

    let key = env::var("CRACKME_KEY").ok();
    let tape = env::var("CRACKME_TAPE").ok();

    let result = crackme(io::stdin().lock(), key.as_deref(), tape.as_deref());
    ExitCode::from(report(result, &mut io::stdout(), &mut io::stderr()))
}

/// Prints the verdict line or the error and returns the exit code: 0 for
/// either verdict, 1 when no verdict could be reached.
fn report(result: Result<Verdict, Error>, out: &mut impl Write, err: &mut impl Write) -> u8 {
    match result {
        Ok(verdict) => {
            _ = writeln!(out, "{verdict}");
            0
        }
        Err(e) => {
            _ = writeln!(err, "error: {e}");
            1
        }
    }
}

fn crackme(input: impl BufRead, key: Option<&str>, tape: Option<&str>) -> Result<Verdict, Error> {
    let key = match key {
        Some(text) => text.parse::<Key>()?,
        None => Key::BUILTIN,
    };
    let tape = match tape {
        Some(text) => Tape::parse(text)?,
        None => Tape::crackme(),
    };
    debug!("key {key}, {} instructions", tape.len());

    let (a, b) = read_input(input)?;

    let mut vm = Interpreter::new(key);
    vm.set_fuel(Some(FUEL));
    Ok(vm.run(&tape, a, b)?.verdict())
}

/// Collects the first two whitespace separated hex numbers, which may span
/// several lines.
fn read_input(input: impl BufRead) -> Result<(u64, u64), Error> {
    let mut values = Vec::with_capacity(2);
    for line in input.lines() {
        for token in line?.split_whitespace() {
            values.push(parse_hex(token)?);
            if let [a, b] = values[..] {
                return Ok((a, b));
            }
        }
    }

    Err(Error::MissingInput(values.len()))
}

fn parse_hex(token: &str) -> Result<u64, Error> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);

    u64::from_str_radix(digits, 16).map_err(|source| Error::InvalidHex {
        token: token.to_owned(),
        source,
    })
}

//

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str) -> Result<Verdict, Error> {
        crackme(input.as_bytes(), None, None)
    }

    #[test]
    fn success() {
        let verdict = run("6c3f1e0b7d2a9458 0d5e8c71a3b64f29\n").unwrap();
        insta::assert_snapshot!(verdict, @"Success! Your flag is flag{6c3f1e0b7d2a94580d5e8c71a3b64f29}");
    }

    #[test]
    fn failure() {
        let verdict = run("1 2\n").unwrap();
        insta::assert_snapshot!(verdict, @"Error");
    }

    #[test]
    fn input_formats() {
        assert_eq!(
            read_input("0x6C3F1E0B7D2A9458\n\n   d5e8c71a3b64f29 trailing junk".as_bytes()).unwrap(),
            (0x6c3f_1e0b_7d2a_9458, 0x0d5e_8c71_a3b6_4f29)
        );
        assert_eq!(read_input("0 ffffffffffffffff".as_bytes()).unwrap(), (0, u64::MAX));
    }

    #[test]
    fn missing_input() {
        assert!(matches!(run(""), Err(Error::MissingInput(0))));
        assert!(matches!(run("abc\n"), Err(Error::MissingInput(1))));
    }

    #[test]
    fn invalid_input() {
        let err = run("12 xyz").unwrap_err();
        assert!(matches!(err, Error::InvalidHex { .. }));
        insta::assert_snapshot!(err, @"`xyz` is not a 64-bit hex number");

        // 17 digits
        assert!(matches!(
            run("10000000000000000 1"),
            Err(Error::InvalidHex { .. })
        ));
    }

    #[test]
    fn custom_key() {
        let key = "0000000000000001:16:0:0:0:0000000000000001:0000000000000002";
        let key: Key = key.parse().unwrap();
        let (a, b) = key.solve();

        let input = format!("{a:x} {b:x}");
        let text = key.to_string();
        let verdict = crackme(input.as_bytes(), Some(text.as_str()), None).unwrap();
        assert_eq!(verdict, Verdict::Success { a, b });
    }

    #[test]
    fn bad_config() {
        let err = crackme("1 2".as_bytes(), Some("nope"), None).unwrap_err();
        assert!(matches!(err, Error::Key(_)));

        let err = crackme("1 2".as_bytes(), None, Some("whiten 300")).unwrap_err();
        assert!(matches!(err, Error::Tape(_)));

        let err = crackme("1 2".as_bytes(), Some("1:400000:0:0:0:0:0"), None).unwrap_err();
        assert!(matches!(err, Error::Key(KeyError::Rounds(400000))));
    }

    fn report_to_strings(result: Result<Verdict, Error>) -> (u8, String, String) {
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = report(result, &mut out, &mut err);
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn exit_codes() {
        let (code, out, err) = report_to_strings(run("1 2"));
        assert_eq!((code, out.as_str(), err.as_str()), (0, "Error\n", ""));

        let (code, out, err) = report_to_strings(run("6c3f1e0b7d2a9458 0d5e8c71a3b64f29"));
        assert_eq!(code, 0);
        assert_eq!(out, "Success! Your flag is flag{6c3f1e0b7d2a94580d5e8c71a3b64f29}\n");
        assert!(err.is_empty());

        let (code, out, err) = report_to_strings(run("1"));
        assert_eq!(code, 1);
        assert!(out.is_empty());
        insta::assert_snapshot!(err, @"error: expected two hex numbers, got 1");
    }

    #[test]
    fn custom_tape() {
        // without the rounds the whitening cancels out
        let tape = "whiten whiten verify";
        let key = Key::BUILTIN;
        let input = format!("{:x} {:x}", key.expected_a, key.expected_b);
        let verdict = crackme(input.as_bytes(), None, Some(tape)).unwrap();
        assert!(matches!(verdict, Verdict::Success { .. }));
    }

    #[test]
    fn endless_tape() {
        let err = crackme("1 2".as_bytes(), None, Some("swap jump -1")).unwrap_err();
        assert!(matches!(err, Error::Run(RunError::OutOfFuel)));
    }
}
