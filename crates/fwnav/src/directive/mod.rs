//! Conditional-compilation directives, includes and macro substitution.
//!
//! [`DirectiveEvaluator`] turns a descriptor file into the stream of lines
//! that are active under a [`MacroEnv`]. Blocks are tracked per file on an
//! explicit frame stack and includes on an explicit file stack, so neither
//! deep nesting nor include cycles can overflow the call stack.

mod env;
pub mod expr;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use path_clean::PathClean;
use serde::{Deserialize, Serialize};

pub use env::{DEFAULT_ARCH, DEFAULT_TARGET, DEFAULT_TOOL_CHAIN_TAG, MacroEnv};

use crate::cache::content_hash;
use crate::error::{Location, ParseError, Result};
use crate::runtime::Runtime;

/// Maximum `!include` nesting.
pub const MAX_INCLUDE_DEPTH: usize = 64;

/// One active line of descriptor text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredLine {
    /// Macro-expanded text with any trailing comment removed.
    pub text: String,
    /// Comment text after the first `#`, without the leading `#` characters.
    pub comment: Option<String>,
    pub location: Location,
}

/// A file read during evaluation, with the BLAKE3 hash of the bytes read.
///
/// Search candidates that were tried and missed before the file that won
/// are recorded too, with an empty hash, so that a file later appearing
/// earlier on the search path changes the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputRecord {
    pub path: PathBuf,
    pub hash: String,
}

impl InputRecord {
    pub fn absent(path: PathBuf) -> Self {
        Self {
            path,
            hash: String::new(),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.hash.is_empty()
    }
}

/// Append `record` unless its path is already known.
pub fn record_input(inputs: &mut Vec<InputRecord>, record: InputRecord) {
    if !inputs.iter().any(|known| known.path == record.path) {
        inputs.push(record);
    }
}

/// Output of evaluating one descriptor file and its includes.
#[derive(Debug, Clone)]
pub struct EvaluatedText {
    pub lines: Vec<FilteredLine>,
    /// Environment after every active `DEFINE` and `[Defines]` entry.
    pub env: MacroEnv,
    /// Every file read, the evaluated file first.
    pub inputs: Vec<InputRecord>,
}

#[derive(Debug)]
struct Frame {
    directive: &'static str,
    location: Location,
    parent_active: bool,
    taken: bool,
    active: bool,
    seen_else: bool,
}

struct Evaluation {
    env: MacroEnv,
    lines: Vec<FilteredLine>,
    inputs: Vec<InputRecord>,
    include_stack: Vec<PathBuf>,
    in_defines: bool,
}

/// Evaluates directives in platform and module descriptors.
#[derive(Debug, Clone, Copy)]
pub struct DirectiveEvaluator<'a> {
    runtime: &'a dyn Runtime,
    search_roots: &'a [PathBuf],
}

impl<'a> DirectiveEvaluator<'a> {
    /// `search_roots` are tried, in order, for includes that do not resolve
    /// next to the including file.
    pub fn new(runtime: &'a dyn Runtime, search_roots: &'a [PathBuf]) -> Self {
        Self {
            runtime,
            search_roots,
        }
    }

    pub fn evaluate(&self, path: &Path, env: MacroEnv) -> Result<EvaluatedText> {
        let mut state = Evaluation {
            env,
            lines: Vec::new(),
            inputs: Vec::new(),
            include_stack: Vec::new(),
            in_defines: false,
        };
        self.evaluate_file(&path.clean(), &mut state)?;
        Ok(EvaluatedText {
            lines: state.lines,
            env: state.env,
            inputs: state.inputs,
        })
    }

    fn evaluate_file(&self, path: &Path, state: &mut Evaluation) -> Result<()> {
        let bytes = self.runtime.read_file(path)?;
        record_input(
            &mut state.inputs,
            InputRecord {
                path: path.to_path_buf(),
                hash: content_hash(&bytes),
            },
        );
        let text = String::from_utf8_lossy(&bytes);
        let file = Arc::new(path.to_path_buf());
        state.include_stack.push(path.to_path_buf());

        let mut frames: Vec<Frame> = Vec::new();
        for line in logical_lines(&text) {
            let location = Location::new(Arc::clone(&file), line.number);
            let comment = line.comment;
            let code = line.code.trim();
            let active = frames.last().is_none_or(|f| f.active);

            if let Some(directive) = code.strip_prefix('!') {
                self.directive(directive, location, active, &mut frames, state)?;
                continue;
            }
            if !active || code.is_empty() {
                continue;
            }

            if let Some(rest) = strip_keyword(code, "DEFINE").or_else(|| strip_keyword(code, "EDK_GLOBAL")) {
                let (name, value) = rest.split_once('=').ok_or_else(|| ParseError::Syntax {
                    location: location.clone(),
                    message: format!("malformed DEFINE '{code}'"),
                })?;
                let value = state.env.expand(value.trim());
                state.env = state.env.define(name.trim(), value);
                continue;
            }

            let expanded = state.env.expand(code);
            if expanded.starts_with('[') {
                state.in_defines = expanded[1..].trim_start().to_ascii_lowercase().starts_with("defines");
            } else if state.in_defines {
                if let Some((key, value)) = expanded.split_once('=') {
                    state.env = state.env.define(key.trim(), value.trim());
                }
            }

            state.lines.push(FilteredLine {
                text: expanded,
                comment: comment.map(str::to_string),
                location,
            });
        }

        if let Some(open) = frames.into_iter().next_back() {
            return Err(ParseError::UnterminatedBlock {
                location: open.location,
                directive: open.directive.to_string(),
            }
            .into());
        }

        state.include_stack.pop();
        Ok(())
    }

    fn directive(
        &self,
        text: &str,
        location: Location,
        active: bool,
        frames: &mut Vec<Frame>,
        state: &mut Evaluation,
    ) -> Result<()> {
        let text = text.trim();
        let (keyword, rest) = match text.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (text, ""),
        };

        match keyword.to_ascii_lowercase().as_str() {
            "if" => {
                let cond = active && self.condition(rest, &location, state)?;
                frames.push(open_frame("!if", location, active, cond));
            }
            "ifdef" | "ifndef" => {
                let name = macro_name(rest);
                if name.is_empty() {
                    return Err(ParseError::Syntax {
                        location,
                        message: format!("!{keyword} needs a macro name"),
                    }
                    .into());
                }
                let defined = state.env.is_defined(name);
                let cond = active && (defined == keyword.eq_ignore_ascii_case("ifdef"));
                let directive = if keyword.eq_ignore_ascii_case("ifdef") {
                    "!ifdef"
                } else {
                    "!ifndef"
                };
                frames.push(open_frame(directive, location, active, cond));
            }
            "elseif" => {
                let Some(frame) = frames.last_mut() else {
                    return Err(unmatched(location, "!elseif"));
                };
                if frame.seen_else {
                    return Err(ParseError::Syntax {
                        location,
                        message: "!elseif after !else".to_string(),
                    }
                    .into());
                }
                if frame.parent_active && !frame.taken {
                    let cond = self.condition(rest, &location, state)?;
                    frame.active = cond;
                    frame.taken = cond;
                } else {
                    frame.active = false;
                }
            }
            "else" => {
                let Some(frame) = frames.last_mut() else {
                    return Err(unmatched(location, "!else"));
                };
                if frame.seen_else {
                    return Err(ParseError::Syntax {
                        location,
                        message: "duplicate !else".to_string(),
                    }
                    .into());
                }
                frame.active = frame.parent_active && !frame.taken;
                frame.taken = true;
                frame.seen_else = true;
            }
            "endif" => {
                if frames.pop().is_none() {
                    return Err(unmatched(location, "!endif"));
                }
            }
            "include" if active => self.include(rest, location, state)?,
            "error" if active => {
                return Err(ParseError::ErrorDirective {
                    location,
                    message: state.env.expand(rest),
                }
                .into());
            }
            "include" | "error" => {}
            _ if active => {
                return Err(ParseError::Syntax {
                    location,
                    message: format!("unknown directive '!{keyword}'"),
                }
                .into());
            }
            _ => {}
        }
        Ok(())
    }

    fn condition(&self, text: &str, location: &Location, state: &Evaluation) -> Result<bool> {
        expr::evaluate(text, &state.env).map_err(|e| {
            ParseError::Expression {
                location: location.clone(),
                expression: text.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn include(&self, raw: &str, location: Location, state: &mut Evaluation) -> Result<()> {
        let expanded = state.env.expand(raw.trim());
        let target = expanded.trim_matches('"').trim();
        let Some(path) = self.resolve_include(target, &location, &mut state.inputs) else {
            return Err(ParseError::IncludeNotFound {
                location,
                path: target.to_string(),
            }
            .into());
        };

        if let Some(start) = state.include_stack.iter().position(|p| *p == path) {
            let mut chain = state.include_stack[start..].to_vec();
            chain.push(path);
            return Err(ParseError::IncludeCycle { location, chain }.into());
        }
        if state.include_stack.len() >= MAX_INCLUDE_DEPTH {
            return Err(ParseError::IncludeDepth {
                location,
                limit: MAX_INCLUDE_DEPTH,
            }
            .into());
        }

        tracing::trace!(include = %path.display(), from = %location, "evaluating include");
        self.evaluate_file(&path, state)
    }

    /// First existing candidate for `target`; the misses before it go to `inputs`.
    fn resolve_include(&self, target: &str, location: &Location, inputs: &mut Vec<InputRecord>) -> Option<PathBuf> {
        let relative = Path::new(target);
        if relative.is_absolute() {
            let path = relative.clean();
            return self.runtime.is_file(&path).then_some(path);
        }

        let local = location.file.parent().map(|dir| dir.join(relative).clean());
        let mut misses = Vec::new();
        let found = local
            .into_iter()
            .chain(self.search_roots.iter().map(|root| root.join(relative).clean()))
            .find(|candidate| {
                let exists = self.runtime.is_file(candidate);
                if !exists {
                    misses.push(candidate.clone());
                }
                exists
            })?;
        for miss in misses {
            record_input(inputs, InputRecord::absent(miss));
        }
        Some(found)
    }
}

fn open_frame(directive: &'static str, location: Location, parent_active: bool, cond: bool) -> Frame {
    Frame {
        directive,
        location,
        parent_active,
        taken: cond,
        active: cond,
        seen_else: false,
    }
}

fn unmatched(location: Location, directive: &str) -> crate::NavError {
    ParseError::UnmatchedDirective {
        location,
        directive: directive.to_string(),
    }
    .into()
}

/// `NAME` from `NAME` or `$(NAME)`.
fn macro_name(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix("$(")
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(text)
        .trim()
}

/// Rest of `line` after a case-insensitive leading keyword and whitespace.
fn strip_keyword<'l>(line: &'l str, keyword: &str) -> Option<&'l str> {
    let head = line.get(..keyword.len())?;
    let rest = &line[keyword.len()..];
    (head.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace)).then_some(rest)
}

/// Split a raw line at the first `#` outside a quoted string.
/// A statement after `\` continuations are joined, numbered by its first line.
struct LogicalLine<'t> {
    number: usize,
    code: String,
    comment: Option<&'t str>,
}

fn logical_lines(text: &str) -> Vec<LogicalLine<'_>> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    for (index, raw) in text.lines().enumerate() {
        let (code, comment) = split_comment(raw);
        let code = code.trim();
        let (number, mut joined) = pending.take().unwrap_or_else(|| (index + 1, String::new()));
        if let Some(head) = code.strip_suffix('\\') {
            joined.push_str(head.trim_end());
            joined.push(' ');
            pending = Some((number, joined));
            continue;
        }
        joined.push_str(code);
        out.push(LogicalLine {
            number,
            code: joined,
            comment,
        });
    }
    if let Some((number, code)) = pending {
        out.push(LogicalLine {
            number,
            code,
            comment: None,
        });
    }
    out
}

fn split_comment(raw: &str) -> (&str, Option<&str>) {
    let mut in_quote = false;
    for (i, c) in raw.char_indices() {
        match c {
            '"' => in_quote = !in_quote,
            '#' if !in_quote => {
                let comment = raw[i..].trim_start_matches('#').trim();
                return (&raw[..i], Some(comment));
            }
            _ => {}
        }
    }
    (raw, None)
}
