//! Fixed pieces of the composed HTML document.
//!
//! Callers can override the stylesheet via
//! [`crate::config::ArchiveConfig::stylesheet_path`]; the constants here are
//! used when no override is provided.

/// Stylesheet compiled into the crate.
pub const DEFAULT_STYLESHEET: &str = include_str!("../assets/style.css");

/// Title of every composed page.
pub const PAGE_TITLE: &str = "PDF Page";

/// Web fonts and MathJax, loaded by the rasterizer at render time.
///
/// MathJax is configured for the `\(…\)` / `\[…\]` delimiters the renderer
/// leaves inside `arithmatex` containers.
pub const EXTERNAL_ASSETS: &str = r#"<link rel="preconnect" href="https://fonts.googleapis.com">
<link rel="preconnect" href="https://fonts.gstatic.com" crossorigin>
<link href="https://fonts.googleapis.com/css2?family=Noto+Color+Emoji&family=Roboto:wght@400;700&display=swap" rel="stylesheet">
<script>
window.MathJax = {
  tex: { inlineMath: [['\\(', '\\)']], displayMath: [['\\[', '\\]']] },
  options: { processHtmlClass: 'arithmatex' }
};
</script>
<script id="MathJax-script" async src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>"#;

/// Assemble the final document around an already-built `<body>` content.
pub fn document(css: &str, head_extra: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{PAGE_TITLE}</title>\n{head_extra}\n<style>\n{css}\n</style>\n</head>\n<body>\n{body}</body>\n</html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stylesheet_is_bundled() {
        assert!(DEFAULT_STYLESHEET.contains(".codehilite"));
        assert!(DEFAULT_STYLESHEET.contains("body"));
    }

    #[test]
    fn document_declares_utf8() {
        let html = document("p{}", "", "<p>x</p>\n");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<meta charset=\"UTF-8\">"));
        assert!(html.contains("<style>\np{}\n</style>"));
        assert!(html.ends_with("</html>\n"));
    }

    #[test]
    fn mathjax_uses_arithmatex_delimiters() {
        assert!(EXTERNAL_ASSETS.contains("mathjax@3"));
        assert!(EXTERNAL_ASSETS.contains("arithmatex"));
    }
}
