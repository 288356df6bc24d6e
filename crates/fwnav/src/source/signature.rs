//! Token-level grammar for function signatures and call sites.
//!
//! Only file-scope constructs are considered. A signature is
//!
//! ```text
//! [storage class ...] <return type tokens> [calling convention] NAME ( params ) { body }
//! [storage class ...] <return type tokens> [calling convention] NAME ( params ) ;
//! ```
//!
//! where every token before `NAME` is an identifier or `*`. Type definitions,
//! function-pointer declarators and initialized data never match.

use super::lexer::{Token, TokenKind, tokenize};

/// Calling conventions recognized between the return type and the name.
pub const CALLING_CONVENTIONS: &[&str] = &["EFIAPI", "WINAPI", "__cdecl", "__stdcall", "__fastcall"];

const STORAGE_CLASSES: &[&str] = &[
    "STATIC", "static", "INLINE", "inline", "__inline", "__inline__", "EXTERN", "extern",
];

const INLINE: &[&str] = &["INLINE", "inline", "__inline", "__inline__"];

/// EDK2 parameter direction markers.
const QUALIFIERS: &[&str] = &["IN", "OUT", "OPTIONAL"];

/// Words that look like calls or names when followed by `(` but are not functions.
const KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "return", "sizeof", "do", "else", "case", "goto", "typedef",
    "typeof", "__typeof__", "__typeof", "alignof", "_Alignof", "__alignof__", "_Static_assert",
    "static_assert", "_Generic", "asm", "__asm", "__asm__", "__attribute__", "__declspec",
    "defined", "struct", "union", "enum",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FunctionKind {
    Definition,
    Declaration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CallKind {
    /// `Name (...)`
    Direct,
    /// Through a member (`This->Fn (...)`, `Obj.Fn (...)`) or a
    /// parenthesized pointer (`(*Fn) (...)`).
    Indirect,
}

/// One parameter of a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Parameter {
    /// `IN`, `OUT` and `OPTIONAL` markers, in source order.
    pub qualifiers: Vec<String>,
    #[serde(rename = "type")]
    pub ty: String,
    /// Empty for unnamed prototype parameters and `...`.
    pub name: String,
    pub full: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedCall {
    pub callee: String,
    pub line: usize,
    pub kind: CallKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedFunction {
    pub name: String,
    pub kind: FunctionKind,
    pub line: usize,
    /// Line of the closing `}`, or of the `;` ending a declaration.
    pub end_line: usize,
    pub return_type: String,
    pub calling_convention: Option<String>,
    /// Normalized text from the first return-type token to the closing `)`.
    pub signature: String,
    pub parameters: Vec<Parameter>,
    pub is_static: bool,
    pub is_inline: bool,
    /// Comment block directly above the first signature line, markers stripped.
    pub documentation: Option<String>,
    /// Call sites in the body, in source order. Empty for declarations.
    pub calls: Vec<ParsedCall>,
}

pub(crate) fn parse_functions(src: &str) -> Vec<ParsedFunction> {
    let tokens = tokenize(src);
    let lines: Vec<&str> = src.lines().collect();
    let mut functions = Vec::new();
    // first token of the current file-scope statement
    let mut start = 0;
    let mut i = 0;

    while let Some(token) = tokens.get(i) {
        match token.text {
            ";" | "}" => {
                i += 1;
                start = i;
            }
            "{" if is_extern_c(&tokens, i) => {
                i += 1;
                start = i;
            }
            "{" => {
                // struct body or initializer; the statement continues after it
                i = matching(&tokens, i, "{", "}") + 1;
            }
            "(" => {
                let close = matching(&tokens, i, "(", ")");
                let Some(mut function) = candidate(&tokens, start, i, close) else {
                    i = close + 1;
                    continue;
                };
                match tokens.get(close + 1).map(|t| t.text) {
                    Some("{") => {
                        let body_end = matching(&tokens, close + 1, "{", "}");
                        let body = tokens.get(close + 2..body_end).unwrap_or_default();
                        function.calls = calls_in(body);
                        function.end_line = tokens[body_end].line;
                        function.documentation = documentation(&lines, tokens[start].line);
                        functions.push(function);
                        i = body_end + 1;
                        start = i;
                    }
                    Some(";") => {
                        function.kind = FunctionKind::Declaration;
                        function.end_line = tokens[close + 1].line;
                        function.documentation = documentation(&lines, tokens[start].line);
                        functions.push(function);
                        i = close + 2;
                        start = i;
                    }
                    _ => i = close + 1,
                }
            }
            _ => i += 1,
        }
    }

    functions
}

/// Index of the token closing the group opened at `open`, or the last index.
fn matching(tokens: &[Token<'_>], open: usize, opener: &str, closer: &str) -> usize {
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate().skip(open) {
        if token.is(opener) {
            depth += 1;
        } else if token.is(closer) {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return index;
            }
        }
    }
    tokens.len().saturating_sub(1).max(open)
}

fn is_extern_c(tokens: &[Token<'_>], brace: usize) -> bool {
    brace >= 2
        && tokens[brace - 1].kind == TokenKind::Literal
        && tokens[brace - 1].text == "\"C\""
        && tokens[brace - 2].is("extern")
}

fn candidate(tokens: &[Token<'_>], start: usize, open: usize, close: usize) -> Option<ParsedFunction> {
    if open <= start {
        return None;
    }
    let name = &tokens[open - 1];
    if !name.is_ident() || is_reserved(name.text) {
        return None;
    }

    let prefix = &tokens[start..open - 1];
    if prefix.is_empty()
        || prefix.iter().any(|t| t.is("typedef"))
        || !prefix.iter().all(|t| t.is_ident() || t.is("*"))
    {
        return None;
    }
    // `T (*Name) (...)` declares a pointer, not a function
    if tokens.get(open + 1).is_some_and(|t| t.is("*")) {
        return None;
    }

    let calling_convention = prefix
        .iter()
        .rev()
        .find(|t| CALLING_CONVENTIONS.contains(&t.text))
        .map(|t| t.text.to_string());
    let return_type = render(
        prefix
            .iter()
            .filter(|t| !STORAGE_CLASSES.contains(&t.text) && !CALLING_CONVENTIONS.contains(&t.text)),
    );
    if return_type.is_empty() {
        return None;
    }

    let close = close.min(tokens.len() - 1);
    Some(ParsedFunction {
        name: name.text.to_string(),
        kind: FunctionKind::Definition,
        line: name.line,
        end_line: tokens[close].line,
        return_type,
        calling_convention,
        signature: render(tokens[start..=close].iter()),
        parameters: parameters(tokens.get(open + 1..close).unwrap_or_default()),
        is_static: prefix.iter().any(|t| t.is("STATIC") || t.is("static")),
        is_inline: prefix.iter().any(|t| INLINE.contains(&t.text)),
        documentation: None,
        calls: Vec::new(),
    })
}

/// Split a parameter list at its top-level commas. A lone `VOID` is no parameter.
fn parameters(list: &[Token<'_>]) -> Vec<Parameter> {
    let mut groups: Vec<&[Token<'_>]> = Vec::new();
    let mut depth = 0usize;
    let mut from = 0;
    for (index, token) in list.iter().enumerate() {
        match token.text {
            "(" | "[" => depth += 1,
            ")" | "]" => depth = depth.saturating_sub(1),
            "," if depth == 0 => {
                groups.push(&list[from..index]);
                from = index + 1;
            }
            _ => {}
        }
    }
    groups.push(&list[from..]);

    groups
        .into_iter()
        .filter(|g| !g.is_empty() && !(g.len() == 1 && (g[0].is("VOID") || g[0].is("void"))))
        .map(parameter)
        .collect()
}

fn parameter(tokens: &[Token<'_>]) -> Parameter {
    let full = render(tokens.iter());
    if tokens.iter().all(|t| t.is(".")) {
        return Parameter {
            qualifiers: Vec::new(),
            ty: "...".to_string(),
            name: String::new(),
            full: "...".to_string(),
        };
    }

    let mut qualifiers = Vec::new();
    let mut depth = 0usize;
    for token in tokens {
        match token.text {
            "(" => depth += 1,
            ")" => depth = depth.saturating_sub(1),
            text if depth == 0 && QUALIFIERS.contains(&text) => qualifiers.push(text.to_string()),
            _ => {}
        }
    }
    let name = parameter_name(tokens);
    let ty = render(
        tokens
            .iter()
            .enumerate()
            .filter(|&(index, t)| Some(index) != name && !QUALIFIERS.contains(&t.text))
            .map(|(_, t)| t),
    );
    Parameter {
        qualifiers,
        ty,
        name: name.map_or_else(String::new, |index| tokens[index].text.to_string()),
        full,
    }
}

/// Index of the declarator name: the identifier inside `( * Name )` for a
/// function pointer, otherwise the last identifier before any array suffix.
/// A parameter of a single type word has no name.
fn parameter_name(tokens: &[Token<'_>]) -> Option<usize> {
    if let Some(open) = tokens.windows(2).position(|w| w[0].is("(") && w[1].is("*")) {
        let close = matching(tokens, open, "(", ")");
        return (open..close).rev().find(|&i| tokens[i].is_ident());
    }

    let end = tokens.iter().position(|t| t.is("[")).unwrap_or(tokens.len());
    let words: Vec<usize> = (0..end)
        .filter(|&i| tokens[i].is_ident() && !QUALIFIERS.contains(&tokens[i].text))
        .collect();
    let named = words.len() > 1 || tokens[..end].iter().any(|t| t.is("*"));
    match words.last() {
        Some(&last) if named && tokens[..end].last().is_some_and(|t| t.is_ident()) => Some(last),
        _ => None,
    }
}

/// The comment block ending on the line right above `first_line` (1-based).
fn documentation(lines: &[&str], first_line: usize) -> Option<String> {
    let mut index = first_line.checked_sub(2)?;
    let mut block = Vec::new();

    let closing = lines.get(index)?.trim();
    if closing.ends_with("*/") {
        loop {
            let line = lines[index].trim();
            block.push(line);
            match line.find("/*") {
                Some(0) => break,
                // trailing comment of a code line
                Some(_) => return None,
                None => index = index.checked_sub(1)?,
            }
        }
    } else if closing.starts_with("//") {
        while let Some(line) = lines.get(index).map(|l| l.trim()) {
            if !line.starts_with("//") {
                break;
            }
            block.push(line);
            let Some(previous) = index.checked_sub(1) else {
                break;
            };
            index = previous;
        }
    } else {
        return None;
    }

    block.reverse();
    let text: Vec<&str> = block
        .iter()
        .map(|&line| {
            let line = line.strip_prefix("/**").or_else(|| line.strip_prefix("/*")).unwrap_or(line);
            let line = line.strip_suffix("*/").unwrap_or(line);
            let line = line.strip_prefix("//").unwrap_or(line);
            line.trim_start().strip_prefix('*').unwrap_or(line).trim()
        })
        .skip_while(|l| l.is_empty())
        .collect();
    let end = text.iter().rposition(|l| !l.is_empty())?;
    Some(text[..=end].join("\n"))
}

fn is_reserved(word: &str) -> bool {
    KEYWORDS.contains(&word) || STORAGE_CLASSES.contains(&word) || CALLING_CONVENTIONS.contains(&word)
}

/// Join tokens with single spaces, tight inside parentheses and before commas.
fn render<'t, 's: 't>(tokens: impl Iterator<Item = &'t Token<'s>>) -> String {
    let mut out = String::new();
    let mut previous: Option<&str> = None;
    for token in tokens {
        let tight = matches!(token.text, ")" | ",") || previous == Some("(");
        if previous.is_some() && !tight {
            out.push(' ');
        }
        out.push_str(token.text);
        previous = Some(token.text);
    }
    out
}

fn calls_in(body: &[Token<'_>]) -> Vec<ParsedCall> {
    let mut calls = Vec::new();
    let mut opens: Vec<usize> = Vec::new();
    let mut last_group: Option<(usize, usize)> = None;

    for (index, token) in body.iter().enumerate() {
        match token.text {
            "(" => {
                if let Some((open, close)) = last_group {
                    let pointer_call = close + 1 == index && body.get(open + 1).is_some_and(|t| t.is("*"));
                    if pointer_call {
                        let callee = body[open + 1..close]
                            .iter()
                            .rev()
                            .find(|t| t.is_ident())
                            .map_or("", |t| t.text);
                        calls.push(ParsedCall {
                            callee: callee.to_string(),
                            line: body[open].line,
                            kind: CallKind::Indirect,
                        });
                    }
                }
                opens.push(index);
            }
            ")" => {
                if let Some(open) = opens.pop() {
                    last_group = Some((open, index));
                }
            }
            _ if token.is_ident()
                && !is_reserved(token.text)
                && body.get(index + 1).is_some_and(|t| t.is("(")) =>
            {
                let via_member = index > 0 && matches!(body[index - 1].text, "->" | ".");
                calls.push(ParsedCall {
                    callee: token.text.to_string(),
                    line: token.line,
                    kind: if via_member { CallKind::Indirect } else { CallKind::Direct },
                });
            }
            _ => {}
        }
    }

    calls
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"
#include <Uefi.h>

typedef EFI_STATUS (EFIAPI *EFI_HOOK)(IN UINTN Value);

STATIC UINTN mCounter = 0;
STATIC VOID (*mCallback)(VOID) = NULL;
GLOBAL_REMOVE_IF_UNREFERENCED EFI_GUID gDemoGuid = { 0x1, 0x2, 0x3, { 0 } };

typedef struct {
  UINTN  Size;
  VOID   (*Notify)(VOID);
} DEMO_CONTEXT;

EFI_STATUS
EFIAPI
DemoHelper (
  IN UINTN  Value
  );

STATIC
UINTN
Twice (
  IN UINTN  Value
  )
{
  return Value * 2;
}

EFI_STATUS
EFIAPI
DemoEntry (
  IN EFI_HANDLE        ImageHandle,
  IN EFI_SYSTEM_TABLE  *SystemTable
  )
{
  UINTN  Index;

  for (Index = 0; Index < 4; Index++) {
    mCounter += Twice (Index);
  }
  if (mCallback != NULL) {
    (*mCallback) ();
  }
  gBS->LocateProtocol (&gDemoGuid, NULL, NULL);
  DEBUG ((DEBUG_INFO, "done %d\n", sizeof (UINTN)));
  return DemoHelper (mCounter);
}
"#;

    #[test]
    fn finds_definitions_and_declarations() {
        let functions = parse_functions(SOURCE);
        let names: Vec<_> = functions.iter().map(|f| (f.name.as_str(), f.kind)).collect();
        assert_eq!(
            names,
            [
                ("DemoHelper", FunctionKind::Declaration),
                ("Twice", FunctionKind::Definition),
                ("DemoEntry", FunctionKind::Definition),
            ]
        );

        let entry = &functions[2];
        assert_eq!(entry.line, 32);
        assert_eq!(entry.return_type, "EFI_STATUS");
        assert_eq!(entry.calling_convention.as_deref(), Some("EFIAPI"));
        assert_eq!(
            entry.signature,
            "EFI_STATUS EFIAPI DemoEntry (IN EFI_HANDLE ImageHandle, IN EFI_SYSTEM_TABLE * SystemTable)"
        );
        assert_eq!(functions[1].return_type, "UINTN");
        assert_eq!(functions[1].calling_convention, None);
    }

    #[test]
    fn extracts_call_sites() {
        let functions = parse_functions(SOURCE);
        let calls: Vec<_> = functions[2]
            .calls
            .iter()
            .map(|c| (c.callee.as_str(), c.kind))
            .collect();
        assert_eq!(
            calls,
            [
                ("Twice", CallKind::Direct),
                ("mCallback", CallKind::Indirect),
                ("LocateProtocol", CallKind::Indirect),
                ("DEBUG", CallKind::Direct),
                ("DemoHelper", CallKind::Direct),
            ]
        );
        assert!(functions[1].calls.is_empty());
    }

    #[test]
    fn records_extent_and_storage_class() {
        let functions = parse_functions(SOURCE);
        assert_eq!((functions[0].line, functions[0].end_line), (17, 19));
        assert_eq!((functions[1].line, functions[1].end_line), (23, 28));
        assert_eq!((functions[2].line, functions[2].end_line), (32, 48));
        assert!(functions[1].is_static);
        assert!(!functions[1].is_inline);
        assert!(!functions[2].is_static);

        let inline = parse_functions("STATIC INLINE\nUINTN\nFast (VOID)\n{\n  return 1;\n}\n");
        assert!(inline[0].is_static && inline[0].is_inline);
        assert_eq!(inline[0].return_type, "UINTN");
    }

    #[test]
    fn splits_parameters_at_top_level_commas() {
        let src = "VOID\nCopy (\n  OUT CHAR8 *Buffer,\n  IN UINTN Size,\n  IN VOID (*Done)(IN UINTN, IN VOID *),\n  IN VOID *Context OPTIONAL\n  );\n";
        let functions = parse_functions(src);
        let params: Vec<_> = functions[0]
            .parameters
            .iter()
            .map(|p| (p.qualifiers.join(" "), p.ty.as_str(), p.name.as_str()))
            .collect();
        assert_eq!(
            params,
            [
                ("OUT".to_string(), "CHAR8 *", "Buffer"),
                ("IN".to_string(), "UINTN", "Size"),
                ("IN".to_string(), "VOID (*) (UINTN, VOID *)", "Done"),
                ("IN OPTIONAL".to_string(), "VOID *", "Context"),
            ]
        );
        assert_eq!(functions[0].parameters[0].full, "OUT CHAR8 * Buffer");

        let functions = parse_functions(SOURCE);
        assert!(parse_functions("VOID\nNone (VOID)\n{\n}\n")[0].parameters.is_empty());
        assert_eq!(functions[2].parameters.len(), 2);
        assert_eq!(functions[2].parameters[1].ty, "EFI_SYSTEM_TABLE *");
    }

    #[test]
    fn unnamed_and_variadic_parameters() {
        let functions = parse_functions("VOID\nLog (UINTN, CONST CHAR8 *Format, ...);\n");
        let params: Vec<_> = functions[0]
            .parameters
            .iter()
            .map(|p| (p.ty.as_str(), p.name.as_str()))
            .collect();
        assert_eq!(params, [("UINTN", ""), ("CONST CHAR8 *", "Format"), ("...", "")]);
    }

    #[test]
    fn documentation_is_the_comment_block_above() {
        let src = r#"
/**
  Doubles a value.

  @param Value  The input.
  @return Twice the input.
**/
UINTN
Twice (
  IN UINTN  Value
  )
{
  return Value * 2;
}

// Returns zero.
// Always.
UINTN Zero (VOID) { return 0; }

UINTN mLast = 0; /* trailing */
UINTN Undocumented (VOID) { return mLast; }
"#;
        let functions = parse_functions(src);
        assert_eq!(
            functions[0].documentation.as_deref(),
            Some("Doubles a value.\n\n@param Value  The input.\n@return Twice the input.")
        );
        assert_eq!(functions[1].documentation.as_deref(), Some("Returns zero.\nAlways."));
        assert_eq!(functions[2].documentation, None);
        assert_eq!(parse_functions(SOURCE)[2].documentation, None);
    }

    #[test]
    fn extern_c_blocks_are_transparent() {
        let src = "extern \"C\" {\nVOID Foo (VOID);\n}\n";
        let functions = parse_functions(src);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].kind, FunctionKind::Declaration);
    }

    #[test]
    fn macro_invocations_without_return_type_are_skipped() {
        let src = "ASSERT_COMPILE (sizeof (UINT32) == 4);\nVOID\nDone (VOID) { }\n";
        let functions = parse_functions(src);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "Done");
        assert_eq!(functions[0].line, 3);
    }
}
