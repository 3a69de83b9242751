//! Code-block syntax highlighting via syntect.
//!
//! Blocks are emitted with CSS classes (prefixed `hl-`) rather than inline
//! colours; [`theme_css`] produces the matching stylesheet for the
//! configured theme so the composer can inline it once per document.

use crate::error::RenderError;
use once_cell::sync::Lazy;
use syntect::highlighting::ThemeSet;
use syntect::html::{css_for_theme_with_class_style, ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use tracing::{debug, warn};

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEMES: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "hl-" };

/// Whether syntect ships a theme with this name.
pub fn has_theme(name: &str) -> bool {
    THEMES.themes.contains_key(name)
}

/// Names of the bundled themes, sorted.
pub fn theme_names() -> Vec<&'static str> {
    THEMES.themes.keys().map(String::as_str).collect()
}

/// CSS rules for the `hl-` classes under the given theme.
///
/// Unknown themes yield an empty string; code is then shown uncoloured.
pub fn theme_css(name: &str) -> String {
    let Some(theme) = THEMES.themes.get(name) else {
        warn!("Unknown code theme '{}', code will be uncoloured", name);
        return String::new();
    };
    css_for_theme_with_class_style(theme, CLASS_STYLE).unwrap_or_else(|e| {
        warn!("Failed to build CSS for theme '{}': {}", name, e);
        String::new()
    })
}

/// Highlight one fenced block into a complete `codehilite` container.
///
/// Never fails: an unknown or empty language uses the plain-text grammar,
/// and a highlighter error falls back to escaped text.
pub fn highlight_block(language: &str, source: &str) -> String {
    let inner = match highlight_spans(language, source) {
        Ok(html) => html,
        Err(e) => {
            warn!("{}; rendering block as plain text", e);
            html_escape::encode_text(source).into_owned()
        }
    };
    let class = if language.is_empty() {
        String::new()
    } else {
        format!(
            " class=\"language-{}\"",
            html_escape::encode_double_quoted_attribute(language)
        )
    };
    format!("<div class=\"codehilite\"><pre><code{class}>{inner}</code></pre></div>\n")
}

fn highlight_spans(language: &str, source: &str) -> Result<String, RenderError> {
    let syntax = SYNTAXES
        .find_syntax_by_token(language)
        .filter(|_| !language.is_empty())
        .unwrap_or_else(|| {
            if !language.is_empty() {
                debug!("No grammar for '{}', using plain text", language);
            }
            SYNTAXES.find_syntax_plain_text()
        });

    let mut generator = ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAXES, CLASS_STYLE);
    for line in LinesWithEndings::from(source) {
        generator
            .parse_html_for_line_which_includes_newline(line)
            .map_err(|e| RenderError::Highlight {
                language: language.to_string(),
                detail: e.to_string(),
            })?;
    }
    Ok(generator.finalize())
}
