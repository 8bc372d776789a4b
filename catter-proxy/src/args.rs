// SPDX-License-Identifier: GPL-3.0-or-later

//! Argument grammar: `-p <parent-id> ( -- <resolved-exe> <args…> |
//! <diagnostic-string> )`.
//!
//! `clap` parses the `-p <id>` flag and captures everything after it
//! verbatim into one trailing positional (`trailing_var_arg` disables
//! clap's own `--`-stripping, so the separator survives into `rest`); a
//! short hand-written classification step then reads the first token of
//! `rest` to decide which of the two grammars applies, since that
//! distinction is purely positional and not something `clap` itself can
//! express as a flag.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "catter-proxy", disable_help_flag = true, disable_version_flag = true)]
struct RawArgs {
    /// The command id of the invocation that caused this proxy to run.
    #[arg(short = 'p', required = true)]
    parent_id: String,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Invocation {
    /// `-p <id> -- <exe> <args…>`: a resolved command to hand to the
    /// controller for a decision.
    Run { parent_id: String, executable: String, arguments: Vec<String> },
    /// `-p <id> <diagnostic>`: the hook library could not build a real
    /// command (an invalid session or a resolution failure); report the
    /// message as-is.
    Diagnostic { parent_id: String, message: String },
}

pub fn parse(args: impl IntoIterator<Item = String>) -> anyhow::Result<Invocation> {
    let raw = RawArgs::try_parse_from(args)?;
    match raw.rest.split_first() {
        Some((separator, tail)) if separator == "--" => {
            let (executable, arguments) =
                tail.split_first().ok_or_else(|| anyhow::anyhow!("missing executable after '--'"))?;
            Ok(Invocation::Run {
                parent_id: raw.parent_id,
                executable: executable.clone(),
                arguments: arguments.to_vec(),
            })
        }
        Some(_) => Ok(Invocation::Diagnostic { parent_id: raw.parent_id, message: raw.rest.join(" ") }),
        None => Err(anyhow::anyhow!("expected '--' or a diagnostic string after '-p <id>'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        std::iter::once("catter-proxy".to_string()).chain(words.iter().map(|s| s.to_string())).collect()
    }

    #[test]
    fn parses_the_run_form() {
        let invocation = parse(args(&["-p", "42", "--", "/bin/echo", "hi"])).unwrap();
        assert_eq!(
            invocation,
            Invocation::Run {
                parent_id: "42".to_string(),
                executable: "/bin/echo".to_string(),
                arguments: vec!["hi".to_string()],
            }
        );
    }

    #[test]
    fn parses_the_diagnostic_form() {
        let invocation = parse(args(&["-p", "", "Catter Proxy Error: boom"])).unwrap();
        assert_eq!(
            invocation,
            Invocation::Diagnostic { parent_id: "".to_string(), message: "Catter Proxy Error: boom".to_string() }
        );
    }

    #[test]
    fn a_diagnostic_with_hyphen_looking_tokens_is_not_mistaken_for_run() {
        let invocation = parse(args(&["-p", "1", "-weird", "message"])).unwrap();
        assert_eq!(
            invocation,
            Invocation::Diagnostic { parent_id: "1".to_string(), message: "-weird message".to_string() }
        );
    }

    #[test]
    fn missing_parent_id_is_an_error() {
        assert!(parse(args(&["--", "/bin/echo"])).is_err());
    }
}
