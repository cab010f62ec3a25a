//! Turning a line of words into a [`CommandInvocation`].
//!
//! The grammar is deliberately flat: there are no pipelines and no nesting.
//!
//! ```text
//! line        := words ['>' target ['&']] ... ['&']
//! ```
//!
//! - A trailing `&` character on the raw line marks the command as background.
//! - The first `>` word ends the argument list; the word after it names the
//!   file that receives standard output. Anything after the target is ignored,
//!   except a `&` word directly after it, which also marks background.

use crate::error::ShellError;
use crate::lexer;

/// One command ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    /// Command name followed by its arguments.
    pub argv: Vec<String>,
    /// Run detached instead of waiting.
    pub background: bool,
    /// File that receives standard output, created or truncated.
    pub redirect: Option<String>,
}

impl CommandInvocation {
    /// Build an invocation from already-tokenized words.
    ///
    /// `background` carries what the caller already knows (e.g. a trailing
    /// `&` on the raw line); a `&` after the redirect target can only set it.
    pub fn from_tokens(tokens: Vec<String>, background: bool) -> Result<Self, ShellError> {
        let mut argv = tokens;
        let mut background = background;
        let mut redirect = None;

        if let Some(pos) = argv.iter().position(|t| t == ">") {
            let mut rest = argv.split_off(pos).into_iter().skip(1);
            let target = rest.next().ok_or(ShellError::MissingRedirectTarget)?;
            if rest.next().as_deref() == Some("&") {
                background = true;
            }
            redirect = Some(target);
        }

        Ok(Self {
            argv,
            background,
            redirect,
        })
    }

    /// The command name, if any.
    pub fn name(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }
}

/// Strip a trailing `&` from a raw line.
///
/// Returns the remaining text and whether the `&` was present. Trailing
/// whitespace and the line terminator are ignored when looking for it.
pub fn split_background(line: &str) -> (&str, bool) {
    let trimmed = line.trim_end_matches(['\n', '\r', ' ', '\t']);
    match trimmed.strip_suffix('&') {
        Some(rest) => (rest, true),
        None => (trimmed, false),
    }
}

/// Parse one raw input line.
///
/// Returns `Ok(None)` for a line with no words (blank or comment only).
pub fn parse_line(line: &str) -> Result<Option<CommandInvocation>, ShellError> {
    let (text, background) = split_background(line);
    let tokens = lexer::tokenize(text);
    if tokens.is_empty() {
        return Ok(None);
    }
    CommandInvocation::from_tokens(tokens, background).map(Some)
}
