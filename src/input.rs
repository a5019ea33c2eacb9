//! Turning input lines into commands.
//!
//! In direct mode a line is `prefix program [args...]` in shell syntax. In template mode
//! the line is substituted for a placeholder in a fixed argument template and also
//! becomes the prefix.

use std::io::BufRead;

use thiserror::Error;

use crate::process::CommandSpec;

/// Default placeholder substituted in templates.
pub const DEFAULT_PLACEHOLDER: &str = "{}";

/// Errors raised while reading commands from input.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to read input")]
    Read(#[source] std::io::Error),

    #[error("line {line}: {reason}")]
    BadLine { line: usize, reason: String },
}

/// How each input line is turned into a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    /// Each line holds the prefix, the program and its arguments.
    Direct,
    /// Each line fills `placeholder` in `template`.
    Template {
        template: Vec<String>,
        placeholder: String,
    },
}

impl InputMode {
    /// Parses a single non-empty input line.
    pub fn command(&self, line: &str) -> Result<CommandSpec, String> {
        match self {
            InputMode::Direct => parse_command_line(line),
            InputMode::Template {
                template,
                placeholder,
            } => {
                let mut argv = fill_template(template, placeholder, line);
                if argv.is_empty() {
                    return Err("empty template".to_string());
                }
                let program = argv.remove(0);
                Ok(CommandSpec::new(program, argv, line))
            }
        }
    }
}

/// Splits `prefix program [args...]` using shell quoting rules.
pub fn parse_command_line(line: &str) -> Result<CommandSpec, String> {
    let mut words = shell_words::split(line).map_err(|err| err.to_string())?;
    if words.len() < 2 {
        return Err(format!("too few args: {:?}", words));
    }
    let prefix = words.remove(0);
    let program = words.remove(0);
    Ok(CommandSpec::new(program, words, prefix))
}

/// Shell-splits every template piece and concatenates the words.
pub fn parse_template(pieces: &[String]) -> Result<Vec<String>, String> {
    let mut template = Vec::new();
    for piece in pieces {
        let words =
            shell_words::split(piece).map_err(|err| format!("bad arg {:?}: {}", piece, err))?;
        template.extend(words);
    }
    if template.is_empty() {
        return Err("empty template".to_string());
    }
    Ok(template)
}

/// Replaces every occurrence of `placeholder` in every template word.
pub fn fill_template(template: &[String], placeholder: &str, target: &str) -> Vec<String> {
    template
        .iter()
        .map(|word| word.replace(placeholder, target))
        .collect()
}

/// Reads one command per non-empty line until end of input.
pub fn read_commands<R: BufRead>(reader: R, mode: &InputMode) -> Result<Vec<CommandSpec>, InputError> {
    let mut commands = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(InputError::Read)?;
        if line.is_empty() {
            continue;
        }
        let spec = mode
            .command(&line)
            .map_err(|reason| InputError::BadLine {
                line: idx + 1,
                reason,
            })?;
        commands.push(spec);
    }
    Ok(commands)
}
