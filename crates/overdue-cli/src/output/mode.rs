use crate::cli::Cli;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OutputMode {
    Text,
    Json,
}

pub fn mode_for_cli(cli: &Cli) -> OutputMode {
    if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    }
}

/// Used before clap has produced a `Cli`, e.g. for parse errors.
pub fn mode_for_args(args: &[String]) -> OutputMode {
    if args.iter().skip(1).any(|arg| arg == "--json") {
        OutputMode::Json
    } else {
        OutputMode::Text
    }
}
