//! `-v`/`-q` flags mapped onto a tracing level, INFO when neither is given

use tracing::{level_filters::LevelFilter, Level};

#[derive(clap::Args, Debug, Clone)]
pub struct Verbosity {
    /// More output per occurrence
    #[clap(long, short = 'v', parse(from_occurrences), global = true)]
    verbose: i8,

    /// Less output per occurrence
    #[clap(
        long,
        short = 'q',
        parse(from_occurrences),
        global = true,
        conflicts_with = "verbose"
    )]
    quiet: i8,
}

impl Verbosity {
    pub fn log_level_filter(&self) -> LevelFilter {
        level_enum(level_value(Level::INFO) - self.quiet + self.verbose)
            .map(LevelFilter::from_level)
            .unwrap_or(LevelFilter::OFF)
    }
}

fn level_value(level: Level) -> i8 {
    match level {
        Level::ERROR => 0,
        Level::WARN => 1,
        Level::INFO => 2,
        Level::DEBUG => 3,
        Level::TRACE => 4,
    }
}

fn level_enum(verbosity: i8) -> Option<Level> {
    match verbosity {
        i8::MIN..=-1 => None,
        0 => Some(Level::ERROR),
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        4..=i8::MAX => Some(Level::TRACE),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Cli {
        #[clap(flatten)]
        verbose: Verbosity,
    }

    fn level(args: &[&str]) -> LevelFilter {
        Cli::parse_from(std::iter::once("imhodump").chain(args.iter().copied()))
            .verbose
            .log_level_filter()
    }

    #[test]
    fn defaults_to_info() {
        assert_eq!(level(&[]), LevelFilter::INFO);
    }

    #[test]
    fn flags_move_the_level() {
        assert_eq!(level(&["-v"]), LevelFilter::DEBUG);
        assert_eq!(level(&["-vvv"]), LevelFilter::TRACE);
        assert_eq!(level(&["-q"]), LevelFilter::WARN);
        assert_eq!(level(&["-qqq"]), LevelFilter::OFF);
    }
}
