//! User-defined template macros
//!
//! Configuration may define up to ten macro bodies, `template0` through `template9`. A
//! reference is replaced by the body with `\1`..`\9` substituted by its arguments, before
//! the text reaches the lexer.
//!
//! # Example
//!
//! ```text
//! template1 = '\1: ${exec df -h \2 | tail -1}'
//!
//! ${template1 root /}
//! ${template1 boot /boot}
//! ```

mod registry;
mod resolver;

pub use registry::{slot_index, TemplateError, TemplateRegistry, MAX_TEMPLATES};
pub use resolver::{contains_template_reference, expand_once, expand_templates, substitute};
