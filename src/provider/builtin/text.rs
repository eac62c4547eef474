//! Text providers: file contents, re-evaluation and case transforms

use std::path::PathBuf;

use crate::provider::{BuildContext, Construct, NodeKind, Print, ProviderError, ProviderSpec};
use crate::renderer::{truncate_str, Eval};

use super::{chomp, Reparsed};

pub(super) fn specs() -> Vec<ProviderSpec> {
    vec![
        ProviderSpec::new("cat", NodeKind::Print, cat).with_usage("${cat path}"),
        ProviderSpec::new("catp", NodeKind::Print, catp).with_usage("${catp path}"),
        ProviderSpec::new("eval", NodeKind::Print, eval).with_usage("${eval text}"),
        ProviderSpec::new("lowercase", NodeKind::Print, |ctx, arg| {
            case(ctx, arg, Case::Lower)
        })
        .with_usage("${lowercase text}"),
        ProviderSpec::new("uppercase", NodeKind::Print, |ctx, arg| {
            case(ctx, arg, Case::Upper)
        })
        .with_usage("${uppercase text}"),
        ProviderSpec::new("startcase", NodeKind::Print, |ctx, arg| {
            case(ctx, arg, Case::Start)
        })
        .with_usage("${startcase text}"),
    ]
}

/// A file read every time the field is drawn
struct FileText {
    path: PathBuf,
    max_len: usize,
}

impl FileText {
    fn new(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Self, ProviderError> {
        Ok(Self {
            path: PathBuf::from(ctx.require(arg)?.trim()),
            max_len: ctx.limits().text_buffer_size,
        })
    }

    fn read(&self) -> String {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => truncate_str(&chomp(content), self.max_len).to_string(),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), error = %e, "cannot read file");
                String::new()
            }
        }
    }
}

struct Cat(FileText);

impl Print for Cat {
    fn print(&self, _ctx: &Eval<'_>, out: &mut String) {
        out.push_str(&self.0.read());
    }
}

fn cat(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    Ok(Construct::print(Cat(FileText::new(ctx, arg)?)))
}

struct CatParsed {
    file: FileText,
    parsed: Reparsed,
}

impl Print for CatParsed {
    fn print(&self, ctx: &Eval<'_>, out: &mut String) {
        self.parsed.render(ctx, self.file.read(), out);
    }
}

fn catp(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    Ok(Construct::print(CatParsed {
        file: FileText::new(ctx, arg)?,
        parsed: Reparsed::default(),
    }))
}

/// Renders its argument, then renders the result again
struct EvalText {
    parsed: Reparsed,
}

impl Print for EvalText {
    fn print(&self, ctx: &Eval<'_>, out: &mut String) {
        self.parsed.render(ctx, ctx.render_sub(), out);
    }
}

fn eval(ctx: &BuildContext<'_>, arg: Option<&str>) -> Result<Construct, ProviderError> {
    let sub = ctx.parse_sub(ctx.require(arg)?)?;
    Ok(Construct::print(EvalText {
        parsed: Reparsed::default(),
    })
    .with_sub(sub))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Case {
    Lower,
    Upper,
    /// First letter of every word upper case, the rest untouched
    Start,
}

impl Case {
    fn apply(self, text: &str) -> String {
        match self {
            Case::Lower => text.to_lowercase(),
            Case::Upper => text.to_uppercase(),
            Case::Start => {
                let mut out = String::with_capacity(text.len());
                let mut word_start = true;
                for c in text.chars() {
                    if word_start {
                        out.extend(c.to_uppercase());
                    } else {
                        out.push(c);
                    }
                    word_start = c == ' ';
                }
                out
            }
        }
    }
}

struct CaseText(Case);

impl Print for CaseText {
    fn print(&self, ctx: &Eval<'_>, out: &mut String) {
        out.push_str(&self.0.apply(&ctx.render_sub()));
    }
}

fn case(ctx: &BuildContext<'_>, arg: Option<&str>, case: Case) -> Result<Construct, ProviderError> {
    let sub = ctx.parse_sub(ctx.require(arg)?)?;
    Ok(Construct::print(CaseText(case)).with_sub(sub))
}
