//! Error types for template parsing

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::provider::ProviderError;
use crate::template::TemplateError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug)]
pub enum ParseError {
    /// `$else` with no open `$if_*` block
    #[error("got an else without matching if at {span:?}")]
    UnmatchedElse { span: Span },

    /// `$endif` with no open `$if_*` block
    #[error("got an endif without matching if at {span:?}")]
    UnmatchedEndif { span: Span },

    /// A provider rejected its arguments
    #[error("failed to construct '${name}' at {span:?}: {source}")]
    Provider {
        name: String,
        span: Span,
        #[source]
        source: ProviderError,
    },

    /// Template macro expansion failed before tokenizing
    #[error("template expansion failed: {0}")]
    Template(#[from] TemplateError),
}

impl ParseError {
    /// Source span of the offending construct, if it has one
    pub fn span(&self) -> Option<&Span> {
        match self {
            Self::UnmatchedElse { span }
            | Self::UnmatchedEndif { span }
            | Self::Provider { span, .. } => Some(span),
            Self::Template(_) => None,
        }
    }

    fn label(&self) -> String {
        match self {
            Self::UnmatchedElse { .. } => "this else has no matching if".to_string(),
            Self::UnmatchedEndif { .. } => "this endif has no matching if".to_string(),
            Self::Provider { source, .. } => source.to_string(),
            Self::Template(e) => e.to_string(),
        }
    }

    /// Format the error with source context using ariadne
    ///
    /// `source` must be the text the span refers to (the template after macro expansion).
    pub fn format(&self, source: &str, filename: &str) -> String {
        let Some(span) = self.span() else {
            return self.to_string();
        };
        let span = span.start.min(source.len())..span.end.min(source.len());

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, filename, span.start)
            .with_message(self.to_string())
            .with_label(
                Label::new((filename, span))
                    .with_message(self.label())
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}
