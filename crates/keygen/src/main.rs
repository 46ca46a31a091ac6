use std::{
    env,
    io::{self, Write},
    process::ExitCode,
};

use log::info;
use rand::Rng;
use vm::{Key, KeyError};

//

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error("usage: keygen [solve <KEY>]")]
    Usage,
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// Draw a flag and a key accepting it.
    Generate,
    /// Print the inputs that pass this key.
    Solve(Key),
}

//

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let result = parse_args(&args).and_then(|command| {
        execute(
            command,
            &mut rand::thread_rng(),
            &mut io::stdout(),
            &mut io::stderr(),
        )
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: &[String]) -> Result<Command, Error> {
    match args {
        [] => Ok(Command::Generate),
        [cmd, key] if cmd == "solve" => Ok(Command::Solve(key.parse()?)),
        _ => Err(Error::Usage),
    }
}

/// `Generate` prints the flag on stderr and the key accepting it on stdout,
/// ready to be handed to the crackme through `CRACKME_KEY`.
fn execute<R: Rng + ?Sized>(
    command: Command,
    rng: &mut R,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<(), Error> {
    match command {
        Command::Generate => {
            let (a, b) = (rng.gen(), rng.gen());
            let key = Key::for_flag(rng, a, b);
            info!("{} rounds", key.rounds);

            writeln!(err, "flag{{{a:016x}{b:016x}}}")?;
            writeln!(out, "{key}")?;
        }
        Command::Solve(key) => {
            let (a, b) = key.solve();
            writeln!(out, "{a:016x} {b:016x}")?;
        }
    }

    Ok(())
}

//
