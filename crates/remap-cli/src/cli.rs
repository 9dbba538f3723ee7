use clap::{Parser, Subcommand, ValueEnum, ValueHint};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "remap", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level (defaults to the config file, then info)
    #[arg(long, global = true)]
    pub log_level: Option<tracing::Level>,

    /// Configuration file (defaults to ~/.remap/config.toml when present)
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Worker threads for parallel checks ("auto" or a number)
    #[arg(long, global = true)]
    pub threads: Option<ThreadCount>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute the conservative transpose of an operator
    Transpose {
        /// Input operator directory
        #[arg(long = "in", value_hint = ValueHint::DirPath)]
        input: PathBuf,
        /// Output operator directory
        #[arg(long = "out", value_hint = ValueHint::DirPath)]
        output: PathBuf,
        /// Skip consistency and conservation checks on the result
        #[arg(long)]
        nocheck: bool,
        /// Also check monotonicity of the result
        #[arg(long)]
        checkmono: bool,
    },
    /// Run the checks on an existing operator
    Verify {
        /// Operator directory
        #[arg(long = "in", value_hint = ValueHint::DirPath)]
        input: PathBuf,
        /// Also check monotonicity
        #[arg(long)]
        checkmono: bool,
        /// Output format for the report
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
    /// Print size, sparsity and area totals of an operator
    Inspect {
        /// Operator directory
        #[arg(long = "in", value_hint = ValueHint::DirPath)]
        input: PathBuf,
        /// Output format for the summary
        #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
        format: OutputFormat,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Size of the global worker pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ThreadCount {
    /// One worker per logical CPU
    Auto,
    Fixed(NonZeroUsize),
}

impl ThreadCount {
    pub fn get(self) -> usize {
        match self {
            ThreadCount::Auto => num_cpus::get(),
            ThreadCount::Fixed(n) => n.get(),
        }
    }
}

impl FromStr for ThreadCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(ThreadCount::Auto);
        }
        s.parse::<NonZeroUsize>()
            .map(ThreadCount::Fixed)
            .map_err(|_| format!("expected \"auto\" or a positive integer, got '{s}'"))
    }
}

impl fmt::Display for ThreadCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadCount::Auto => f.write_str("auto"),
            ThreadCount::Fixed(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_transpose_flags() {
        let cli = Cli::parse_from([
            "remap",
            "--log-level",
            "debug",
            "transpose",
            "--in",
            "a",
            "--out",
            "b",
            "--checkmono",
        ]);

        assert_eq!(cli.log_level, Some(tracing::Level::DEBUG));
        match cli.command {
            Commands::Transpose {
                input,
                output,
                nocheck,
                checkmono,
            } => {
                assert_eq!(input, PathBuf::from("a"));
                assert_eq!(output, PathBuf::from("b"));
                assert!(!nocheck);
                assert!(checkmono);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_thread_counts() {
        let threads = |arg: &str| {
            Cli::try_parse_from(["remap", "--threads", arg, "inspect", "--in", "a"])
                .map(|cli| cli.threads)
        };

        assert_eq!(threads("auto").unwrap(), Some(ThreadCount::Auto));
        assert_eq!(threads("AUTO").unwrap(), Some(ThreadCount::Auto));
        assert_eq!(
            threads("4").unwrap(),
            Some(ThreadCount::Fixed(NonZeroUsize::new(4).unwrap()))
        );
        assert!(threads("0").is_err());
        assert!(threads("abc").is_err());
        assert!(threads("-2").is_err());
    }

    #[test]
    fn transpose_requires_output() {
        assert!(Cli::try_parse_from(["remap", "transpose", "--in", "a"]).is_err());
    }
}
