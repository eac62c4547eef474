//! Conditional blocks: `if_empty`, `if_match`, `if_existing`, `else`, `endif`

use std::path::PathBuf;

use crate::provider::{
    BlockRole, BuildContext, Construct, NodeKind, Print, ProviderError, ProviderSpec, Test,
};
use crate::renderer::Eval;

pub(super) fn specs() -> Vec<ProviderSpec> {
    vec![
        ProviderSpec::new("if_empty", NodeKind::IfTest, if_empty)
            .with_role(BlockRole::If)
            .with_usage("${if_empty text}"),
        ProviderSpec::new("if_match", NodeKind::IfTest, if_match)
            .with_role(BlockRole::If)
            .with_usage("${if_match lhs OP rhs}"),
        ProviderSpec::new("if_existing", NodeKind::IfTest, if_existing)
            .with_role(BlockRole::If)
            .with_usage("${if_existing path [text]}"),
        ProviderSpec::new("else", NodeKind::IfTest, |_, _| Ok(Construct::test(Else)))
            .with_role(BlockRole::Else),
        ProviderSpec::new("endif", NodeKind::Print, |_, _| Ok(Construct::print(Endif)))
            .with_role(BlockRole::Endif),
    ]
}

/// True when the child renders to nothing
struct IfEmpty;

impl Test for IfEmpty {
    fn test(&self, ctx: &Eval<'_>) -> bool {
        ctx.render_sub().is_empty()
    }
}

fn if_empty(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    let sub = ctx.parse_sub(ctx.require(arg)?)?;
    Ok(Construct::test(IfEmpty).with_sub(sub))
}

struct IfMatch;

impl Test for IfMatch {
    fn test(&self, ctx: &Eval<'_>) -> bool {
        let expr = ctx.render_sub();
        match compare(&expr) {
            Some(result) => result,
            None => {
                tracing::debug!(expression = %expr, "compare failed");
                false
            }
        }
    }
}

fn if_match(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    let sub = ctx.parse_sub(ctx.require(arg)?)?;
    Ok(Construct::test(IfMatch).with_sub(sub))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Op {
    const TOKENS: [(&'static str, Op); 6] = [
        ("==", Op::Eq),
        ("!=", Op::Ne),
        ("<=", Op::Le),
        (">=", Op::Ge),
        ("<", Op::Lt),
        (">", Op::Gt),
    ];

    fn apply<T: PartialOrd + ?Sized>(self, a: &T, b: &T) -> bool {
        match self {
            Op::Eq => a == b,
            Op::Ne => a != b,
            Op::Lt => a < b,
            Op::Gt => a > b,
            Op::Le => a <= b,
            Op::Ge => a >= b,
        }
    }
}

/// Split at the first operator outside double quotes
fn split_operator(expr: &str) -> Option<(&str, Op, &str)> {
    let mut quoted = false;
    for (i, c) in expr.char_indices() {
        if c == '"' {
            quoted = !quoted;
            continue;
        }
        if quoted {
            continue;
        }
        let rest = &expr[i..];
        if let Some((token, op)) = Op::TOKENS.iter().find(|(t, _)| rest.starts_with(t)) {
            return Some((&expr[..i], *op, &expr[i + token.len()..]));
        }
    }
    None
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Evaluate `lhs OP rhs`. Two numbers compare numerically, two strings as strings.
/// A number against a string is false whatever the operator.
fn compare(expr: &str) -> Option<bool> {
    let (lhs, op, rhs) = split_operator(expr)?;
    let (lhs, rhs) = (lhs.trim(), rhs.trim());
    if lhs.is_empty() || rhs.is_empty() {
        return None;
    }
    match (lhs.parse::<f64>(), rhs.parse::<f64>()) {
        (Ok(a), Ok(b)) => Some(op.apply(&a, &b)),
        (Ok(_), Err(_)) | (Err(_), Ok(_)) => {
            tracing::warn!(expression = %expr, "mixed numeric and string operands");
            Some(false)
        }
        (Err(_), Err(_)) => Some(op.apply(unquote(lhs), unquote(rhs))),
    }
}

struct IfExisting {
    path: PathBuf,
    needle: Option<String>,
}

impl Test for IfExisting {
    fn test(&self, _ctx: &Eval<'_>) -> bool {
        match &self.needle {
            None => self.path.exists(),
            Some(needle) => std::fs::read_to_string(&self.path)
                .map(|content| content.contains(needle.as_str()))
                .unwrap_or(false),
        }
    }
}

fn if_existing(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    let arg = ctx.require(arg)?.trim();
    let (path, needle) = match arg.split_once(char::is_whitespace) {
        Some((path, needle)) => (path, Some(needle.trim().to_string())),
        None => (arg, None),
    };
    Ok(Construct::test(IfExisting {
        path: PathBuf::from(path),
        needle: needle.filter(|n| !n.is_empty()),
    }))
}

/// Always false; its jump target is the block's `endif`
struct Else;

impl Test for Else {
    fn test(&self, _ctx: &Eval<'_>) -> bool {
        false
    }
}

struct Endif;

impl Print for Endif {
    fn print(&self, _ctx: &Eval<'_>, _out: &mut String) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_compare() {
        assert_eq!(compare("10 > 9"), Some(true));
        assert_eq!(compare("1.5 <= 1.5"), Some(true));
        assert_eq!(compare("2==3"), Some(false));
        assert_eq!(compare("2 != 3"), Some(true));
    }

    #[test]
    fn test_string_compare() {
        assert_eq!(compare("\"abc\" == \"abc\""), Some(true));
        assert_eq!(compare("abc == abd"), Some(false));
        assert_eq!(compare("abc < abd"), Some(true));
        // quoting keeps a number a string
        assert_eq!(compare("\"10\" < \"9\""), Some(true));
    }

    #[test]
    fn test_mixed_operands_are_false() {
        assert_eq!(compare("N/A > 50"), Some(false));
        assert_eq!(compare("N/A <= 50"), Some(false));
        assert_eq!(compare("10 != x9"), Some(false));
        assert_eq!(compare("x9 == 10"), Some(false));
    }

    #[test]
    fn test_operator_inside_quotes_is_ignored() {
        assert_eq!(compare("\"a<b\" == \"a<b\""), Some(true));
    }

    #[test]
    fn test_malformed_expression() {
        assert_eq!(compare("no operator"), None);
        assert_eq!(compare("== 3"), None);
    }
}
