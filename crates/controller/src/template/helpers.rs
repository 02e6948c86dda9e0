//! # Template Helpers
//!
//! String, collection and encoding helpers available to body templates, on
//! top of the handlebars built-ins (`eq`, `ne`, `gt`, `gte`, `lt`, `lte`,
//! `and`, `or`, `not`, `len`). Argument order follows the pipeline
//! convention: the piped value is always the last argument.

use base64::Engine as _;
use handlebars::{
    Context, Handlebars, Helper, HelperDef, RenderContext, RenderError, RenderErrorReason,
    ScopedJson,
};
use serde_json::Value;

type HelperFn = fn(&[Value]) -> Result<Value, String>;

/// Helper evaluating a plain function over its (already resolved) arguments
///
/// Missing values arrive as `null`, so `default` and friends can handle
/// absent fields without tripping strict mode.
struct FnHelper {
    name: &'static str,
    min_args: usize,
    func: HelperFn,
}

impl HelperDef for FnHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'reg Handlebars<'reg>,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let args: Vec<Value> = h.params().iter().map(|p| p.value().clone()).collect();
        if args.len() < self.min_args {
            return Err(RenderErrorReason::Other(format!(
                "{} expects at least {} argument(s), got {}",
                self.name,
                self.min_args,
                args.len()
            ))
            .into());
        }
        (self.func)(&args)
            .map(ScopedJson::Derived)
            .map_err(|message| RenderErrorReason::Other(format!("{}: {message}", self.name)).into())
    }
}

const HELPERS: &[(&str, usize, HelperFn)] = &[
    ("upper", 1, |a| Ok(text(last(a)).to_uppercase().into())),
    ("lower", 1, |a| Ok(text(last(a)).to_lowercase().into())),
    ("title", 1, |a| Ok(title(&text(last(a))).into())),
    ("camelcase", 1, |a| Ok(camelcase(&text(last(a))).into())),
    ("snakecase", 1, |a| Ok(words(&text(last(a))).join("_").into())),
    ("kebabcase", 1, |a| Ok(words(&text(last(a))).join("-").into())),
    ("trim", 1, |a| Ok(text(last(a)).trim().into())),
    ("trimPrefix", 2, |a| {
        let s = text(&a[1]);
        let prefix = text(&a[0]);
        Ok(s.strip_prefix(prefix.as_str()).unwrap_or(&s).into())
    }),
    ("trimSuffix", 2, |a| {
        let s = text(&a[1]);
        let suffix = text(&a[0]);
        Ok(s.strip_suffix(suffix.as_str()).unwrap_or(&s).into())
    }),
    ("replace", 3, |a| {
        Ok(text(&a[2]).replace(&text(&a[0]), &text(&a[1])).into())
    }),
    ("default", 1, |a| match a {
        [fallback, given, ..] if is_empty(given) => Ok(fallback.clone()),
        [_, given, ..] => Ok(given.clone()),
        [only] => Ok(only.clone()),
        [] => Ok(Value::Null),
    }),
    ("required", 2, |a| {
        if is_empty(&a[1]) {
            Err(text(&a[0]))
        } else {
            Ok(a[1].clone())
        }
    }),
    ("empty", 1, |a| Ok(is_empty(last(a)).into())),
    ("ternary", 3, |a| {
        Ok(if is_empty(&a[2]) { a[1].clone() } else { a[0].clone() })
    }),
    ("coalesce", 0, |a| {
        Ok(a.iter().find(|v| !is_empty(v)).cloned().unwrap_or(Value::Null))
    }),
    ("quote", 1, |a| {
        let quoted: Result<Vec<String>, String> = a
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| serde_json::to_string(&text(v)).map_err(|e| e.to_string()))
            .collect();
        Ok(quoted?.join(" ").into())
    }),
    ("squote", 1, |a| {
        Ok(a.iter()
            .filter(|v| !v.is_null())
            .map(|v| format!("'{}'", text(v)))
            .collect::<Vec<_>>()
            .join(" ")
            .into())
    }),
    ("toJson", 1, |a| {
        serde_json::to_string(last(a))
            .map(Value::from)
            .map_err(|e| e.to_string())
    }),
    ("b64enc", 1, |a| {
        Ok(base64::engine::general_purpose::STANDARD
            .encode(text(last(a)))
            .into())
    }),
    ("b64dec", 1, |a| {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(text(last(a)))
            .map_err(|e| e.to_string())?;
        String::from_utf8(bytes)
            .map(Value::from)
            .map_err(|e| e.to_string())
    }),
    ("join", 2, |a| match &a[1] {
        Value::Array(items) => Ok(items
            .iter()
            .map(text)
            .collect::<Vec<_>>()
            .join(&text(&a[0]))
            .into()),
        Value::Null => Ok("".into()),
        other => Ok(text(other).into()),
    }),
    ("contains", 2, |a| Ok(text(&a[1]).contains(&text(&a[0])).into())),
    ("hasPrefix", 2, |a| Ok(text(&a[1]).starts_with(&text(&a[0])).into())),
    ("hasSuffix", 2, |a| Ok(text(&a[1]).ends_with(&text(&a[0])).into())),
    ("indent", 2, |a| Ok(indent(&a[0], &text(&a[1]))?.into())),
    ("nindent", 2, |a| Ok(format!("\n{}", indent(&a[0], &text(&a[1]))?).into())),
    ("index", 1, |a| {
        let mut current = &a[0];
        for key in &a[1..] {
            current = match (current, key) {
                (Value::Object(map), key) => map.get(&text(key)).unwrap_or(&Value::Null),
                (Value::Array(items), Value::Number(n)) => n
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .and_then(|i| items.get(i))
                    .unwrap_or(&Value::Null),
                _ => &Value::Null,
            };
        }
        Ok(current.clone())
    }),
    ("printf", 1, |a| Ok(printf(&text(&a[0]), &a[1..]).into())),
];

/// Register every helper on `registry`
pub fn register(registry: &mut Handlebars<'static>) {
    for &(name, min_args, func) in HELPERS {
        registry.register_helper(
            name,
            Box::new(FnHelper {
                name,
                min_args,
                func,
            }),
        );
    }
}

fn last(args: &[Value]) -> &Value {
    args.last().unwrap_or(&Value::Null)
}

/// Textual form of a value: strings verbatim, `null` empty, others as JSON
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Go-template emptiness: null, false, 0, "", [] and {}
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn title(s: &str) -> String {
    s.split(' ').map(capitalize).collect::<Vec<_>>().join(" ")
}

/// Lower-cased words, split on non-alphanumerics and lower-to-upper transitions
fn words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;
    for c in s.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            previous_lower = false;
            continue;
        }
        if c.is_uppercase() && previous_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        previous_lower = c.is_lowercase() || c.is_numeric();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn camelcase(s: &str) -> String {
    words(s).iter().map(|w| capitalize(w)).collect()
}

fn indent(width: &Value, s: &str) -> Result<String, String> {
    let width = width
        .as_u64()
        .and_then(|w| usize::try_from(w).ok())
        .ok_or_else(|| format!("indent width must be a non-negative integer, got {width}"))?;
    let pad = " ".repeat(width);
    Ok(s.split('\n')
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// `%s`, `%v`, `%d` and `%q` substitution; `%%` is a literal percent
fn printf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('q') => {
                let arg = args.next().map(text).unwrap_or_default();
                out.push_str(&serde_json::Value::from(arg).to_string());
            }
            Some('s' | 'v' | 'd') => out.push_str(&args.next().map(text).unwrap_or_default()),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(template: &str, data: &Value) -> String {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        register(&mut registry);
        registry.render_template(template, data).unwrap()
    }

    #[test]
    fn test_case_helpers() {
        let data = json!({"s": "firstName value"});
        assert_eq!(render("{{upper s}}", &data), "FIRSTNAME VALUE");
        assert_eq!(render("{{title s}}", &data), "FirstName Value");
        assert_eq!(render("{{snakecase s}}", &data), "first_name_value");
        assert_eq!(render("{{kebabcase s}}", &data), "first-name-value");
        assert_eq!(render("{{camelcase \"http_server\"}}", &data), "HttpServer");
    }

    #[test]
    fn test_default_and_coalesce_tolerate_missing_values() {
        let data = json!({"present": "x", "blank": ""});
        assert_eq!(render(r#"{{default "d" missing}}"#, &data), "d");
        assert_eq!(render(r#"{{default "d" blank}}"#, &data), "d");
        assert_eq!(render(r#"{{default "d" present}}"#, &data), "x");
        assert_eq!(render(r#"{{coalesce missing blank present}}"#, &data), "x");
    }

    #[test]
    fn test_required_fails_on_missing_value() {
        let mut registry = Handlebars::new();
        register(&mut registry);
        let err = registry
            .render_template(r#"{{required "team is required" team}}"#, &json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("team is required"));
    }

    #[test]
    fn test_encoding_helpers() {
        let data = json!({"list": ["a", "b"], "obj": {"k": 1}, "s": "hi"});
        assert_eq!(render(r#"{{join "," list}}"#, &data), "a,b");
        assert_eq!(render("{{toJson obj}}", &data), r#"{"k":1}"#);
        assert_eq!(render("{{toJson list}}", &data), r#"["a","b"]"#);
        assert_eq!(render("{{quote s}}", &data), r#""hi""#);
        assert_eq!(render("{{b64enc s}}", &data), "aGk=");
        assert_eq!(render("{{b64dec (b64enc s)}}", &data), "hi");
    }

    #[test]
    fn test_string_predicates_and_transforms() {
        let data = json!({"s": "logs-app"});
        assert_eq!(render(r#"{{trimPrefix "logs-" s}}"#, &data), "app");
        assert_eq!(render(r#"{{replace "-" "_" s}}"#, &data), "logs_app");
        assert_eq!(render(r#"{{#if (hasPrefix "logs" s)}}y{{/if}}"#, &data), "y");
        assert_eq!(render(r#"{{ternary "a" "b" (contains "app" s)}}"#, &data), "a");
        assert_eq!(render(r#"{{printf "%s-%d" s 3}}"#, &data), "logs-app-3");
        assert_eq!(render("{{indent 2 s}}", &data), "  logs-app");
    }

    #[test]
    fn test_words_splits_on_case_and_separators() {
        assert_eq!(words("HTTPServer_v2"), vec!["httpserver", "v2"]);
        assert_eq!(words("myField-name"), vec!["my", "field", "name"]);
    }
}
