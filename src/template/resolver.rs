//! Template expansion - substitutes `$templateN` references before tokenizing

use super::registry::{slot_index, TemplateError, TemplateRegistry};

/// Expand every template reference in `text`, repeating until none remain.
///
/// A body may itself reference templates, so expansion runs in passes. At most `max_passes`
/// passes are made; text that still holds a reference after that fails with
/// [`TemplateError::ExpansionLimit`].
pub fn expand_templates(
    text: &str,
    registry: &TemplateRegistry,
    max_passes: usize,
) -> Result<String, TemplateError> {
    let mut current = text.to_string();
    for pass in 0..max_passes {
        if !contains_template_reference(&current) {
            return Ok(current);
        }
        current = expand_once(&current, registry)?;
        tracing::trace!(pass, len = current.len(), "template pass");
    }
    if contains_template_reference(&current) {
        return Err(TemplateError::ExpansionLimit { passes: max_passes });
    }
    Ok(current)
}

/// Whether `text` holds a `$templateN` or `${templateN ...}` reference
pub fn contains_template_reference(text: &str) -> bool {
    next_reference(text, 0).is_some()
}

/// Byte offset of the next reference at or after `from`. `$$` is skipped as an escape.
fn next_reference(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        let here = &text[i..];
        if here.starts_with("$$") {
            i += 2;
        } else if here.starts_with("$template") || here.starts_with("${template") {
            return Some(i);
        } else {
            i += 1;
        }
    }
    None
}

/// One substitution pass over `text`
pub fn expand_once(text: &str, registry: &TemplateRegistry) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(start) = next_reference(text, cursor) {
        out.push_str(&text[cursor..start]);
        let (name, args, end) = split_reference(text, start)?;
        cursor = end;

        let body = slot_index(name).and_then(|i| registry.get(i).map(|b| (i, b)));
        match body {
            Some((index, body)) => {
                let args = args.map(split_args).unwrap_or_default();
                out.push_str(&substitute(body, Some((index, args.as_slice())))?);
            }
            None => {
                tracing::warn!(template = name, "failed to handle template; reference removed");
            }
        }
    }
    out.push_str(&text[cursor..]);
    Ok(out)
}

/// Split the reference at `start` into name, raw argument text and the end offset
fn split_reference(
    text: &str,
    start: usize,
) -> Result<(&str, Option<&str>, usize), TemplateError> {
    let bytes = text.as_bytes();

    if text[start..].starts_with("${") {
        let name_start = start + 2;
        let mut i = name_start;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'{'
            && bytes[i] != b'}'
        {
            i += 1;
        }
        let name_end = i;

        let mut depth = 1usize;
        while i < bytes.len() {
            match bytes[i] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            i += 1;
        }
        if depth != 0 {
            return Err(TemplateError::Unterminated { offset: start });
        }

        let args = (name_end < i).then(|| &text[name_end..i]);
        return Ok((&text[name_start..name_end], args, i + 1));
    }

    // the whole identifier goes, so `$template_dir` is one (invalid) reference
    let name_start = start + 1;
    let mut i = start + "$template".len();
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    Ok((&text[name_start..i], None, i))
}

/// Split template arguments on spaces that are not preceded by a backslash.
/// Escapes inside each argument are resolved.
fn split_args(args: &str) -> Vec<String> {
    let mut raw = Vec::new();
    let mut current = String::new();
    let mut chars = args.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ' ' => {
                if !current.is_empty() {
                    raw.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        raw.push(current);
    }

    raw.iter()
        .map(|arg| substitute(arg, None).unwrap_or_else(|_| arg.clone()))
        .collect()
}

/// Resolve backslash escapes in `src`.
///
/// `\\`, `\ ` and `\n` are always recognized. With `args`, `\N` is replaced by argument N
/// (1-based). An index past the last argument drops the backslash and keeps the digits, as
/// does any other escape with its character.
pub fn substitute(src: &str, args: Option<(usize, &[String])>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(&(at, next)) = chars.peek() else {
            break;
        };
        match next {
            '\\' | ' ' => {
                out.push(next);
                chars.next();
            }
            'n' => {
                out.push('\n');
                chars.next();
            }
            d if d.is_ascii_digit() => {
                let Some((index, args)) = args else {
                    continue;
                };
                let digits: String = src[at..].chars().take_while(char::is_ascii_digit).collect();
                let n: usize = digits.parse().unwrap_or(usize::MAX);
                if n == 0 {
                    return Err(TemplateError::ZeroArgument { index });
                }
                match args.get(n - 1) {
                    Some(arg) => out.push_str(arg),
                    None => out.push_str(&digits),
                }
                for _ in 0..digits.len() {
                    chars.next();
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> TemplateRegistry {
        TemplateRegistry::new()
            .with(1, "$\\1\\2")
            .with(2, "\\1: ${fs_used \\2} / ${fs_size \\2}")
            .with(3, "[$template1]")
    }

    #[test]
    fn test_no_references_is_unchanged() {
        let text = "plain ${exec date} $$template1";
        assert_eq!(expand_templates(text, &registry(), 32).unwrap(), text);
    }

    #[test]
    fn test_braced_reference_with_args() {
        let out = expand_templates("${template2 root /}", &registry(), 32).unwrap();
        assert_eq!(out, "root: ${fs_used /} / ${fs_size /}");
    }

    #[test]
    fn test_escaped_space_keeps_argument_together() {
        let out = expand_templates("${template2 my\\ disk /mnt}", &registry(), 32).unwrap();
        assert_eq!(out, "my disk: ${fs_used /mnt} / ${fs_size /mnt}");
    }

    #[test]
    fn test_bare_reference_without_args() {
        // no arguments, so `\1\2` keeps its digits
        let out = expand_templates("<$template1>", &registry(), 32).unwrap();
        assert_eq!(out, "<$12>");
    }

    #[test]
    fn test_nested_reference_expands_in_later_pass() {
        let out = expand_templates("${template3}", &registry(), 32).unwrap();
        assert_eq!(out, "[$12]");
    }

    #[test]
    fn test_undefined_template_is_removed() {
        let out = expand_templates("a${template7 x}b$template12c", &registry(), 32).unwrap();
        assert_eq!(out, "ab");
    }

    #[test]
    fn test_bare_reference_takes_whole_identifier() {
        let out = expand_templates("x $template_dir y", &registry(), 32).unwrap();
        assert_eq!(out, "x  y");
    }

    #[test]
    fn test_zero_argument_is_an_error() {
        let reg = TemplateRegistry::new().with(4, "\\0");
        let err = expand_templates("$template4", &reg, 32).unwrap_err();
        assert_eq!(err, TemplateError::ZeroArgument { index: 4 });
    }

    #[test]
    fn test_unterminated_reference_is_an_error() {
        let err = expand_templates("ok ${template1 a", &registry(), 32).unwrap_err();
        assert_eq!(err, TemplateError::Unterminated { offset: 3 });
    }

    #[test]
    fn test_self_reference_hits_pass_limit() {
        let reg = TemplateRegistry::new().with(0, "x$template0");
        let err = expand_templates("$template0", &reg, 5).unwrap_err();
        assert_eq!(err, TemplateError::ExpansionLimit { passes: 5 });
    }

    #[test]
    fn test_expansion_reaches_fixed_point() {
        let reg = registry();
        let once = expand_templates("${template2 a b} $template3", &reg, 32).unwrap();
        assert_eq!(expand_once(&once, &reg).unwrap(), once);
        assert_eq!(expand_templates(&once, &reg, 32).unwrap(), once);
    }

    #[test]
    fn test_substitute_escapes() {
        let args = vec!["A".to_string()];
        assert_eq!(substitute("\\1\\n\\\\\\ ", Some((0, args.as_slice()))).unwrap(), "A\n\\ ");
        assert_eq!(substitute("<\\2>", Some((0, args.as_slice()))).unwrap(), "<2>");
        assert_eq!(substitute("\\q", None).unwrap(), "q");
    }

    #[test]
    fn test_missing_argument_keeps_digits() {
        let reg = TemplateRegistry::new().with(1, "<\\3>");
        let out = expand_templates("${template1 a b}", &reg, 32).unwrap();
        assert_eq!(out, "<3>");
    }
}
