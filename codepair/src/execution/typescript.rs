//! Lossy TypeScript to JavaScript conversion.
//!
//! This is a best-effort text transformation, not a compiler. It removes the
//! common annotation forms seen in interview snippets (type-only imports,
//! interfaces, type aliases, parameter/return/binding annotations, generic
//! parameter lists, access modifiers, `as` assertions and class field types)
//! and leaves everything else untouched. Constructs it does not recognize,
//! such as `enum`, namespaces or parameter properties, pass through and
//! usually surface as JavaScript syntax or runtime errors.
//!
//! Removed declarations are replaced by the same number of newlines so line
//! numbers in error messages still match the source.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

/// Characters allowed inside a generic argument list, one nesting level deep.
const GENERIC_INNER: &str =
    r#"[\w$\s,.|&=\[\]'"]*(?:<[\w$\s,.|&=\[\]'"]*>[\w$\s,.|&=\[\]'"]*)*"#;

const CONTROL_KEYWORDS: [&str; 5] = ["if", "while", "for", "switch", "with"];

static STRIPPER: LazyLock<Result<Stripper, regex::Error>> = LazyLock::new(Stripper::new);

/// Strip TypeScript type syntax from `source`, producing JavaScript.
pub fn strip_types(source: &str) -> String {
    match &*STRIPPER {
        Ok(stripper) => stripper.strip(source),
        Err(e) => {
            warn!(error = %e, "TypeScript stripper unavailable; running source unchanged");
            source.to_string()
        }
    }
}

struct Stripper {
    type_imports: Regex,
    type_exports: Regex,
    ambient: Regex,
    declaration: Regex,
    class_generics: Regex,
    heritage_generics: Regex,
    implements: Regex,
    call_generics: Regex,
    arrow_generics: Regex,
    modifiers: Regex,
    binding: Regex,
    class_field: Regex,
    assertion: Regex,
}

impl Stripper {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            type_imports: Regex::new(r"(?m)^[ \t]*import[ \t]+type\b[^;\n]*;?[ \t]*$")?,
            type_exports: Regex::new(r"(?m)^[ \t]*export[ \t]+type[ \t]*\{[^}]*\}[^;\n]*;?[ \t]*$")?,
            ambient: Regex::new(
                r"(?m)^[ \t]*declare[ \t]+(?:const|let|var|function|module|namespace|global)\b[^\n]*$",
            )?,
            declaration: Regex::new(
                r"(?m)^[ \t]*(?:export[ \t]+)?(?:declare[ \t]+)?(interface|type)[ \t]+[A-Za-z_$][\w$]*",
            )?,
            class_generics: Regex::new(&format!(
                r"\b(class[ \t]+[A-Za-z_$][\w$]*)[ \t]*<{GENERIC_INNER}>"
            ))?,
            heritage_generics: Regex::new(&format!(
                r"\b(extends[ \t]+[A-Za-z_$][\w$.]*)<{GENERIC_INNER}>"
            ))?,
            implements: Regex::new(r"[ \t]+implements[ \t]+[A-Za-z_$][\w$.,<>\s]*?([ \t]*\{)")?,
            call_generics: Regex::new(&format!(
                r"([A-Za-z_$][\w$]*)<[A-Za-z_$]{GENERIC_INNER}>\s*\("
            ))?,
            arrow_generics: Regex::new(&format!(
                r"([=(,:][ \t]*)<[A-Za-z_$]{GENERIC_INNER}>\s*\("
            ))?,
            modifiers: Regex::new(r"\b(?:public|private|protected|readonly)[ \t]+")?,
            binding: Regex::new(r"\b(?:let|const|var)\s+[A-Za-z_$][\w$]*\s*!?\s*:")?,
            class_field: Regex::new(
                r"(?m)^([ \t]*)((?:static[ \t]+)?#?[A-Za-z_$][\w$]*)[?!]?[ \t]*:[ \t]*[^=;{}()\n]+(=[^;\n]*)?;[ \t]*$",
            )?,
            assertion: Regex::new(&format!(
                r"\s+as\s+(?:const\b|[A-Za-z_$][\w$.]*(?:<{GENERIC_INNER}>)?(?:\[\])*)"
            ))?,
        })
    }

    fn strip(&self, source: &str) -> String {
        let out = replace_code(&self.type_imports, source, |_| String::new());
        let out = replace_code(&self.type_exports, &out, |_| String::new());
        let out = replace_code(&self.ambient, &out, |_| String::new());
        let out = self.remove_declarations(&out);

        let out = replace_code(&self.class_generics, &out, |caps| caps[1].to_string());
        let out = replace_code(&self.heritage_generics, &out, |caps| caps[1].to_string());
        let out = replace_code(&self.implements, &out, |caps| caps[1].to_string());
        let out = replace_code(&self.call_generics, &out, |caps| format!("{}(", &caps[1]));
        let out = replace_code(&self.arrow_generics, &out, |caps| format!("{}(", &caps[1]));
        let out = replace_code(&self.modifiers, &out, |_| String::new());

        let out = strip_signatures(&out);
        let out = self.strip_bindings(&out);
        let out = replace_code(&self.class_field, &out, |caps| {
            let name = caps[2].trim_start_matches("static").trim();
            if matches!(name, "default" | "case") {
                return caps[0].to_string();
            }
            match caps.get(3) {
                Some(init) => format!("{}{} {};", &caps[1], &caps[2], init.as_str().trim_end()),
                None => format!("{}{};", &caps[1], &caps[2]),
            }
        });
        replace_code(&self.assertion, &out, |_| String::new())
    }

    /// Remove `interface` blocks and `type` aliases.
    fn remove_declarations(&self, src: &str) -> String {
        let b = src.as_bytes();
        let literals = literal_spans(b);
        let mut out = String::with_capacity(src.len());
        let mut copied = 0;

        for caps in self.declaration.captures_iter(src) {
            let (Some(whole), Some(keyword)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() < copied || in_literal(&literals, whole.start()) {
                continue;
            }
            let end = if keyword.as_str() == "interface" {
                src[whole.end()..]
                    .find('{')
                    .map(|offset| whole.end() + offset)
                    .and_then(|open| matching_close(b, open))
                    .map(|close| close + 1)
            } else {
                alias_body_start(b, whole.end()).and_then(|body| {
                    let end = type_end(b, body, TypeContext::Alias)?;
                    Some(if b.get(end) == Some(&b';') { end + 1 } else { end })
                })
            };
            let Some(end) = end else {
                continue;
            };

            out.push_str(&src[copied..whole.start()]);
            out.extend(std::iter::repeat_n('\n', newlines(&src[whole.start()..end])));
            copied = end;
        }

        out.push_str(&src[copied..]);
        out
    }

    /// Remove annotations from `let`/`const`/`var` bindings.
    fn strip_bindings(&self, src: &str) -> String {
        let b = src.as_bytes();
        let literals = literal_spans(b);
        let mut out = String::with_capacity(src.len());
        let mut copied = 0;

        for found in self.binding.find_iter(src) {
            if found.start() < copied || in_literal(&literals, found.start()) {
                continue;
            }
            let colon = found.end() - 1;
            let end = type_end(b, found.end(), TypeContext::Binding).unwrap_or(b.len());
            let head = src[found.start()..colon].trim_end();
            let head = head.strip_suffix('!').unwrap_or(head).trim_end();

            out.push_str(&src[copied..found.start()]);
            out.push_str(head);
            if b.get(end) == Some(&b'=') {
                out.push(' ');
            }
            copied = end;
        }

        out.push_str(&src[copied..]);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeContext {
    Parameter,
    Return,
    Binding,
    Alias,
}

/// End of the type expression starting at `start`.
///
/// Returns `None` for a return-position type that is not followed by a
/// function body, meaning the colon was not an annotation after all.
fn type_end(b: &[u8], start: usize, ctx: TypeContext) -> Option<usize> {
    let mut depth = 0usize;
    let mut seen = false;
    let mut i = start;

    while i < b.len() {
        if let Some(next) = skip_literal(b, i) {
            i = next;
            seen = true;
            continue;
        }
        let c = b[i];
        if c == b'=' && b.get(i + 1) == Some(&b'>') {
            if depth == 0 && ctx == TypeContext::Return && seen {
                return Some(i);
            }
            i += 2;
            continue;
        }
        if depth == 0 {
            match (ctx, c) {
                (TypeContext::Parameter, b',' | b')' | b'=')
                | (TypeContext::Binding, b'=' | b';' | b',' | b'\n' | b')')
                | (TypeContext::Alias, b';' | b'}') => return Some(i),
                (TypeContext::Return, b'{') if seen => return Some(i),
                (TypeContext::Return, b';' | b'\n' | b')' | b',' | b'}' | b'=') => return None,
                (TypeContext::Alias, b'\n') => {
                    let next = b[i..].iter().copied().find(|ch| !ch.is_ascii_whitespace());
                    if !matches!(next, Some(b'|' | b'&')) {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        match c {
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b')' | b']' | b'}' | b'>' => {
                if depth == 0 {
                    return (ctx != TypeContext::Return).then_some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
        if !c.is_ascii_whitespace() {
            seen = true;
        }
        i += 1;
    }

    (ctx != TypeContext::Return).then_some(b.len())
}

/// Remove parameter and return annotations from function signatures.
fn strip_signatures(src: &str) -> String {
    let b = src.as_bytes();
    let mut out = String::with_capacity(src.len());
    let mut copied = 0;
    let mut i = 0;

    while i < b.len() {
        if let Some(next) = skip_literal(b, i) {
            i = next;
            continue;
        }
        if b[i] == b'(' && !follows_control_keyword(b, i) {
            if let Some(close) = matching_close(b, i) {
                if let Some(resume) = signature_tail(b, close) {
                    out.push_str(&src[copied..i]);
                    out.push('(');
                    out.push_str(&strip_signatures(&strip_params(&src[i + 1..close])));
                    out.push(')');
                    if resume > close + 1 {
                        out.push(' ');
                    }
                    copied = resume;
                    i = resume;
                    continue;
                }
            }
        }
        i += 1;
    }

    out.push_str(&src[copied..]);
    out
}

/// If the parenthesized list closing at `close` is a signature, where to
/// resume copying: right after `)`, or after the return annotation.
fn signature_tail(b: &[u8], close: usize) -> Option<usize> {
    let j = skip_whitespace(b, close + 1);
    match b.get(j) {
        Some(b'{') => Some(close + 1),
        Some(b'=') if b.get(j + 1) == Some(&b'>') => Some(close + 1),
        Some(b':') => {
            let end = type_end(b, j + 1, TypeContext::Return)?;
            Some(end)
        }
        _ => None,
    }
}

fn strip_params(params: &str) -> String {
    split_top_level(params, b',')
        .into_iter()
        .map(strip_param)
        .collect::<Vec<_>>()
        .join(",")
}

fn strip_param(param: &str) -> String {
    let b = param.as_bytes();
    let Some(colon) = annotation_colon(b) else {
        return param.to_string();
    };
    let head = param[..colon].trim_end();
    let head = head.strip_suffix('?').unwrap_or(head).trim_end();
    let end = type_end(b, colon + 1, TypeContext::Parameter).unwrap_or(b.len());
    format!("{head}{}", &param[end..])
}

/// Depth-zero `:` preceding any default-value `=`.
fn annotation_colon(b: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < b.len() {
        if let Some(next) = skip_literal(b, i) {
            i = next;
            continue;
        }
        match b[i] {
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b')' | b']' | b'}' | b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 => return Some(i),
            b'=' if depth == 0 && b.get(i + 1) != Some(&b'>') => return None,
            _ => {}
        }
        i += 1;
    }
    None
}

fn split_top_level(s: &str, sep: u8) -> Vec<&str> {
    let b = s.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;
    while i < b.len() {
        if let Some(next) = skip_literal(b, i) {
            i = next;
            continue;
        }
        match b[i] {
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            // `=>` inside a default value is not a closing angle bracket.
            b'>' if i == 0 || b[i - 1] != b'=' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&s[start..]);
    parts
}

/// Replace matches of `re` that start outside string literals and comments.
fn replace_code(re: &Regex, src: &str, mut rep: impl FnMut(&Captures<'_>) -> String) -> String {
    let literals = literal_spans(src.as_bytes());
    re.replace_all(src, |caps: &Captures<'_>| match caps.get(0) {
        Some(found) if !in_literal(&literals, found.start()) => rep(caps),
        _ => caps[0].to_string(),
    })
    .into_owned()
}

/// Byte ranges of the string literals and comments in `b`, in order.
fn literal_spans(b: &[u8]) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut i = 0;
    while i < b.len() {
        match skip_literal(b, i) {
            Some(next) => {
                spans.push(i..next);
                i = next;
            }
            None => i += 1,
        }
    }
    spans
}

fn in_literal(spans: &[Range<usize>], at: usize) -> bool {
    let after = spans.partition_point(|span| span.end <= at);
    spans.get(after).is_some_and(|span| span.start <= at)
}

/// Index just past the string literal or comment starting at `i`, if one does.
fn skip_literal(b: &[u8], i: usize) -> Option<usize> {
    match b[i] {
        quote @ (b'"' | b'\'' | b'`') => {
            let mut j = i + 1;
            while j < b.len() {
                match b[j] {
                    b'\\' => j += 2,
                    c if c == quote => return Some(j + 1),
                    _ => j += 1,
                }
            }
            Some(b.len())
        }
        b'/' if b.get(i + 1) == Some(&b'/') => Some(
            b[i..]
                .iter()
                .position(|&c| c == b'\n')
                .map_or(b.len(), |p| i + p),
        ),
        b'/' if b.get(i + 1) == Some(&b'*') => Some(
            b[i + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map_or(b.len(), |p| i + 2 + p + 2),
        ),
        _ => None,
    }
}

fn matching_close(b: &[u8], open: usize) -> Option<usize> {
    let (opener, closer) = match b[open] {
        b'(' => (b'(', b')'),
        b'{' => (b'{', b'}'),
        b'[' => (b'[', b']'),
        _ => return None,
    };
    let mut depth = 0usize;
    let mut i = open;
    while i < b.len() {
        if let Some(next) = skip_literal(b, i) {
            i = next;
            continue;
        }
        if b[i] == opener {
            depth += 1;
        } else if b[i] == closer {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Start of the body of a `type Name<...> =` alias whose name ends at `from`.
fn alias_body_start(b: &[u8], from: usize) -> Option<usize> {
    let mut i = skip_whitespace(b, from);
    if b.get(i) == Some(&b'<') {
        let mut depth = 0usize;
        while i < b.len() {
            match b[i] {
                b'<' => depth += 1,
                b'>' if i > 0 && b[i - 1] != b'=' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        i = skip_whitespace(b, i + 1);
    }
    (b.get(i) == Some(&b'=') && b.get(i + 1) != Some(&b'>')).then_some(i + 1)
}

fn follows_control_keyword(b: &[u8], open: usize) -> bool {
    let end = b[..open]
        .iter()
        .rposition(|c| !c.is_ascii_whitespace())
        .map_or(0, |p| p + 1);
    let start = b[..end]
        .iter()
        .rposition(|&c| !(c.is_ascii_alphanumeric() || c == b'_' || c == b'$'))
        .map_or(0, |p| p + 1);
    std::str::from_utf8(&b[start..end]).is_ok_and(|word| CONTROL_KEYWORDS.contains(&word))
}

fn skip_whitespace(b: &[u8], from: usize) -> usize {
    b[from.min(b.len())..]
        .iter()
        .position(|c| !c.is_ascii_whitespace())
        .map_or(b.len(), |p| from + p)
}

fn newlines(s: &str) -> usize {
    s.bytes().filter(|&c| c == b'\n').count()
}
