//! # Template Dialect
//!
//! Declared bodies are written with Go-template style actions
//! (`{{ .Values.x }}`, `{{ if }}`, `{{ range }}`, pipelines). This module
//! rewrites them into the handlebars syntax the renderer executes:
//!
//! | Go-template                     | handlebars                      |
//! |---------------------------------|---------------------------------|
//! | `{{ .Values.a.b }}`             | `{{Values.a.b}}`                |
//! | `{{ . }}` / `{{ $ }}`           | `{{this}}` / `{{@root}}`        |
//! | `{{ .x \| upper }}`             | `{{upper x}}`                   |
//! | `{{ if eq .x "a" }}`            | `{{#if (eq x "a")}}`            |
//! | `{{ range .list }}..{{ end }}`  | `{{#each list}}..{{/each}}`     |
//! | `{{ range $k, $v := .m }}`      | `{{#each m as \|$v $k\|}}`     |
//! | `{{ with .x }}..{{ end }}`      | `{{#with x}}..{{/with}}`        |
//! | `{{- x -}}`                     | `{{~x~}}`                       |
//! | `{{/* note */}}`                | `{{!-- note --}}`               |
//!
//! Range variables become block parameters, so a key variable holds the
//! index when ranging over a list and the key when ranging over a map.
//! Actions already written in handlebars block syntax (`#`, `/`, `!`, `>`)
//! pass through unchanged.

use regex::Regex;
use std::sync::LazyLock;

static ACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\{\{(.*?)\}\}").expect("action pattern is a valid regex")
});

/// Errors raised while rewriting a template
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DialectError {
    #[error("unexpected {{{{ end }}}} at offset {offset}")]
    UnexpectedEnd { offset: usize },
    #[error("unexpected {{{{ else }}}} at offset {offset}")]
    UnexpectedElse { offset: usize },
    #[error("unclosed {{{{ {block} }}}} block")]
    UnclosedBlock { block: String },
    #[error("invalid action '{action}': {reason}")]
    InvalidAction { action: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    If,
    Each {
        key_var: Option<String>,
        value_var: Option<String>,
    },
    With,
}

impl Block {
    fn helper(&self) -> &'static str {
        match self {
            Block::If => "if",
            Block::Each { .. } => "each",
            Block::With => "with",
        }
    }
}

/// Rewrite a Go-template style template into handlebars syntax
pub fn translate(template: &str) -> Result<String, DialectError> {
    let mut out = String::with_capacity(template.len());
    let mut blocks: Vec<Block> = Vec::new();
    let mut last = 0;

    for captures in ACTION.captures_iter(template) {
        let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        let raw = body.as_str();
        let (trim_left, raw) = strip_trim_marker_left(raw);
        let (trim_right, raw) = strip_trim_marker_right(raw);
        let open = if trim_left { "{{~" } else { "{{" };
        let close = if trim_right { "~}}" } else { "}}" };
        let inner = raw.trim();

        if let Some(comment) = inner.strip_prefix("/*").and_then(|c| c.strip_suffix("*/")) {
            out.push_str(&format!("{open}!-- {} --{close}", comment.trim()));
            continue;
        }
        if inner.starts_with(['#', '/', '!', '>', '^']) {
            out.push_str(whole.as_str());
            continue;
        }

        let (keyword, rest) = split_keyword(inner);
        let translated = match keyword {
            "if" => {
                let arg = block_argument(rest, &blocks, inner)?;
                blocks.push(Block::If);
                format!("{open}#if {arg}{close}")
            }
            "with" => {
                let arg = block_argument(rest, &blocks, inner)?;
                blocks.push(Block::With);
                format!("{open}#with {arg}{close}")
            }
            "range" => {
                let (key_var, value_var, source) = parse_range(rest, inner)?;
                let arg = block_argument(source, &blocks, inner)?;
                let params = match (&value_var, &key_var) {
                    (Some(value), Some(key)) => format!(" as |{value} {key}|"),
                    (Some(value), None) => format!(" as |{value}|"),
                    _ => String::new(),
                };
                blocks.push(Block::Each { key_var, value_var });
                format!("{open}#each {arg}{params}{close}")
            }
            "else" => {
                if blocks.is_empty() {
                    return Err(DialectError::UnexpectedElse {
                        offset: whole.start(),
                    });
                }
                let (next, condition) = split_keyword(rest);
                match next {
                    "" => format!("{open}else{close}"),
                    "if" => {
                        let arg = block_argument(condition, &blocks, inner)?;
                        format!("{open}else if {arg}{close}")
                    }
                    _ => {
                        return Err(DialectError::InvalidAction {
                            action: inner.to_string(),
                            reason: "only 'else' and 'else if' are supported".to_string(),
                        })
                    }
                }
            }
            "end" => {
                let block = blocks.pop().ok_or(DialectError::UnexpectedEnd {
                    offset: whole.start(),
                })?;
                format!("{open}/{}{close}", block.helper())
            }
            _ => {
                let expr = translate_pipeline(inner, &blocks, inner)?;
                format!("{open}{expr}{close}")
            }
        };
        out.push_str(&translated);
    }

    if let Some(block) = blocks.last() {
        return Err(DialectError::UnclosedBlock {
            block: block.helper().to_string(),
        });
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn strip_trim_marker_left(raw: &str) -> (bool, &str) {
    match raw.strip_prefix('-') {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => (true, rest),
        _ => (false, raw),
    }
}

fn strip_trim_marker_right(raw: &str) -> (bool, &str) {
    match raw.strip_suffix('-') {
        Some(rest) if rest.is_empty() || rest.ends_with(char::is_whitespace) => (true, rest),
        _ => (false, raw),
    }
}

fn split_keyword(inner: &str) -> (&str, &str) {
    let inner = inner.trim();
    match inner.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (inner, ""),
    }
}

/// `range $i, $v := .list` / `range $v := .list` / `range .list`
fn parse_range<'a>(
    rest: &'a str,
    action: &str,
) -> Result<(Option<String>, Option<String>, &'a str), DialectError> {
    let Some((vars, source)) = rest.split_once(":=") else {
        return Ok((None, None, rest));
    };
    let names: Vec<&str> = vars.split(',').map(str::trim).collect();
    let invalid = |reason: &str| DialectError::InvalidAction {
        action: action.to_string(),
        reason: reason.to_string(),
    };
    if names.iter().any(|n| !n.starts_with('$') || n.len() < 2) {
        return Err(invalid("range variables must be named like $name"));
    }
    match names.as_slice() {
        [value] => Ok((None, Some((*value).to_string()), source.trim())),
        [key, value] => Ok((
            Some((*key).to_string()),
            Some((*value).to_string()),
            source.trim(),
        )),
        _ => Err(invalid("range declares at most two variables")),
    }
}

fn block_argument(src: &str, blocks: &[Block], action: &str) -> Result<String, DialectError> {
    if src.trim().is_empty() {
        return Err(DialectError::InvalidAction {
            action: action.to_string(),
            reason: "missing argument".to_string(),
        });
    }
    Ok(parenthesize(translate_pipeline(src, blocks, action)?))
}

fn parenthesize(expr: String) -> String {
    if split_top_level(&expr, char::is_whitespace).len() > 1 {
        format!("({expr})")
    } else {
        expr
    }
}

/// Translate `a | f x | g` into `g (f x a)`
fn translate_pipeline(src: &str, blocks: &[Block], action: &str) -> Result<String, DialectError> {
    let mut acc: Option<String> = None;
    for stage in split_top_level(src, |c| c == '|') {
        let tokens = split_top_level(stage, char::is_whitespace);
        if tokens.is_empty() {
            return Err(DialectError::InvalidAction {
                action: action.to_string(),
                reason: "empty pipeline stage".to_string(),
            });
        }
        let mut parts = tokens
            .iter()
            .map(|token| translate_operand(token, blocks, action))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(previous) = acc.take() {
            parts.push(parenthesize(previous));
        }
        acc = Some(parts.join(" "));
    }
    acc.ok_or_else(|| DialectError::InvalidAction {
        action: action.to_string(),
        reason: "empty action".to_string(),
    })
}

fn translate_operand(token: &str, blocks: &[Block], action: &str) -> Result<String, DialectError> {
    if let Some(inner) = token.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        return Ok(parenthesize(translate_pipeline(inner, blocks, action)?));
    }
    if let Some(raw) = token.strip_prefix('`').and_then(|t| t.strip_suffix('`')) {
        return serde_json::to_string(raw).map_err(|e| DialectError::InvalidAction {
            action: action.to_string(),
            reason: e.to_string(),
        });
    }
    if token.starts_with('"') {
        return Ok(token.to_string());
    }
    if token == "." {
        return Ok("this".to_string());
    }
    if let Some(path) = token.strip_prefix('.') {
        return Ok(path.to_string());
    }
    if token == "$" {
        return Ok("@root".to_string());
    }
    if let Some(path) = token.strip_prefix("$.") {
        return Ok(format!("@root.{path}"));
    }
    if token.starts_with('$') {
        return translate_variable(token, blocks, action);
    }
    Ok(match token {
        "nil" => "null".to_string(),
        "le" => "lte".to_string(),
        "ge" => "gte".to_string(),
        other => other.to_string(),
    })
}

/// Range variables are visible inside the declaring `range` and its nested blocks
fn translate_variable(token: &str, blocks: &[Block], action: &str) -> Result<String, DialectError> {
    let name = token.split('.').next().unwrap_or(token);
    let declared = blocks.iter().any(|block| match block {
        Block::Each { key_var, value_var } => {
            key_var.as_deref() == Some(name) || value_var.as_deref() == Some(name)
        }
        _ => false,
    });
    if !declared {
        return Err(DialectError::InvalidAction {
            action: action.to_string(),
            reason: format!("variable {name} is not declared by an enclosing range"),
        });
    }
    Ok(token.to_string())
}

/// Split on `is_separator` outside quotes, backticks and parentheses
fn split_top_level(src: &str, is_separator: impl Fn(char) -> bool) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (index, c) in src.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' && q == '"' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '`' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && is_separator(c) => {
                let part = src[start..index].trim();
                if !part.is_empty() {
                    parts.push(part);
                }
                start = index + c.len_utf8();
            }
            _ => {}
        }
    }
    let tail = src[start..].trim();
    if !tail.is_empty() {
        parts.push(tail);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_field_access() {
        assert_eq!(
            translate(r#"{"title": "{{ .Values.teamA.title }}"}"#).unwrap(),
            r#"{"title": "{{Values.teamA.title}}"}"#
        );
        assert_eq!(translate("{{ . }}{{ $ }}").unwrap(), "{{this}}{{@root}}");
        assert_eq!(translate("{{ $.Values.x }}").unwrap(), "{{@root.Values.x}}");
        assert_eq!(
            translate("{{ upper (lower .Values.x) }}").unwrap(),
            "{{upper (lower Values.x)}}"
        );
    }

    #[test]
    fn test_translate_pipelines() {
        assert_eq!(translate("{{ .Values.x | upper }}").unwrap(), "{{upper Values.x}}");
        assert_eq!(
            translate(r#"{{ .Values.x | default "n/a" | quote }}"#).unwrap(),
            r#"{{quote (default "n/a" Values.x)}}"#
        );
        assert_eq!(
            translate(r#"{{ join "," (.Values.list) }}"#).unwrap(),
            r#"{{join "," Values.list}}"#
        );
    }

    #[test]
    fn test_translate_blocks() {
        let go =
            r#"[{{ range $i, $v := .Values.items }}{{ if $i }},{{ end }}"{{ $v.name }}"{{ end }}]"#;
        assert_eq!(
            translate(go).unwrap(),
            r#"[{{#each Values.items as |$v $i|}}{{#if $i}},{{/if}}"{{$v.name}}"{{/each}}]"#
        );
        assert_eq!(
            translate(
                r#"{{ if eq .Values.env "prod" }}a{{ else if .Values.x }}b{{ else }}c{{ end }}"#
            )
            .unwrap(),
            r#"{{#if (eq Values.env "prod")}}a{{else if Values.x}}b{{else}}c{{/if}}"#
        );
        assert_eq!(
            translate("{{ with .Values.a }}{{ .b }}{{ end }}").unwrap(),
            "{{#with Values.a}}{{b}}{{/with}}"
        );
    }

    #[test]
    fn test_translate_range_variables() {
        assert_eq!(
            translate("{{ range $k, $v := .Values.m }}{{ $k }}={{ $v }};{{ end }}").unwrap(),
            "{{#each Values.m as |$v $k|}}{{$k}}={{$v}};{{/each}}"
        );
        assert_eq!(
            translate("{{ range $v := .Values.list }}{{ $v.name }}{{ end }}").unwrap(),
            "{{#each Values.list as |$v|}}{{$v.name}}{{/each}}"
        );
        let nested = "{{ range $g := .groups }}{{ range .members }}{{ $g.id }}{{ end }}{{ end }}";
        assert_eq!(
            translate(nested).unwrap(),
            "{{#each groups as |$g|}}{{#each members}}{{$g.id}}{{/each}}{{/each}}"
        );
    }

    #[test]
    fn test_translate_trim_markers_and_comments() {
        assert_eq!(translate("a {{- .x -}} b").unwrap(), "a {{~x~}} b");
        assert_eq!(translate("{{/* note */}}x").unwrap(), "{{!-- note --}}x");
        assert_eq!(translate("{{ -1 }}").unwrap(), "{{-1}}");
    }

    #[test]
    fn test_translate_passes_handlebars_blocks_through() {
        let hbs = "{{#each Values.items}}{{this}}{{/each}}";
        assert_eq!(translate(hbs).unwrap(), hbs);
    }

    #[test]
    fn test_translate_rejects_unbalanced_blocks() {
        assert!(matches!(
            translate("{{ if .x }}a"),
            Err(DialectError::UnclosedBlock { .. })
        ));
        assert!(matches!(
            translate("a{{ end }}"),
            Err(DialectError::UnexpectedEnd { offset: 1 })
        ));
        assert!(matches!(
            translate("{{ $v }}"),
            Err(DialectError::InvalidAction { .. })
        ));
    }
}
