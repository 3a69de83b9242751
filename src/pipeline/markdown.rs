//! Content renderer: Markdown with fenced code and TeX math → HTML.
//!
//! ## Passes
//!
//! 1. Normalise line endings and strip shield delimiters from the input.
//! 2. Cut `\[…\]` and `\(…\)` spans out of ordinary text, wrap them in
//!    `arithmatex` containers with their delimiters intact for MathJax, and
//!    leave markers. Code, inline HTML, `$` math and link destinations are
//!    located with a first pulldown-cmark pass and left alone.
//! 3. Run pulldown-cmark over the rest (tables, strikethrough, footnotes,
//!    `$…$` / `$$…$$` math). Code blocks are highlighted from their events,
//!    math events become `arithmatex` containers, and soft breaks become
//!    `<br />`.
//! 4. Restore the markers.

use crate::pipeline::highlight;
use crate::pipeline::shield::Shield;
use once_cell::sync::Lazy;
use pulldown_cmark::{html, CodeBlockKind, Event, LinkType, Options, Parser, Tag, TagEnd};
use regex::Regex;
use std::ops::Range;

static RE_BRACKET_MATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\A\\(?:\[(?s:(.+?))\\\]|\((?s:(.+?))\\\))").expect("valid math regex")
});

/// Render Markdown text to an HTML fragment.
pub fn render_markdown(markdown: &str) -> String {
    let normalised = markdown.replace("\r\n", "\n").replace('\r', "\n");
    let text = Shield::sanitize(&normalised);

    let mut shield = Shield::new();
    let literal = literal_ranges(&text);
    let text = protect_bracket_math(&text, &literal, &mut shield);

    let events = html_events(Parser::new_ext(&text, markdown_options()));

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events.into_iter());

    shield.restore(&out)
}

fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_MATH);
    options
}

// ── Event rewriting ──────────────────────────────────────────────────────────

struct CodeBuffer {
    language: String,
    body: String,
}

/// An open paragraph: where it starts in the output and what it holds so far.
struct OpenParagraph {
    start: usize,
    only_display_math: bool,
    has_display_math: bool,
}

fn html_events<'a>(parser: Parser<'a>) -> Vec<Event<'a>> {
    let mut events = Vec::new();
    let mut code: Option<CodeBuffer> = None;
    let mut paragraph: Option<OpenParagraph> = None;

    for event in parser {
        let event = match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let language = match kind {
                    CodeBlockKind::Fenced(info) => fence_language(&info),
                    CodeBlockKind::Indented => String::new(),
                };
                code = Some(CodeBuffer { language, body: String::new() });
                continue;
            }
            Event::Text(text) if code.is_some() => {
                if let Some(block) = code.as_mut() {
                    block.body.push_str(&text);
                }
                continue;
            }
            Event::End(TagEnd::CodeBlock) => match code.take() {
                Some(block) => Event::Html(
                    highlight::highlight_block(&block.language, block.body.trim_end_matches('\n'))
                        .into(),
                ),
                None => continue,
            },
            Event::InlineMath(tex) => Event::InlineHtml(Math::Inline(&tex).to_html().into()),
            Event::DisplayMath(tex) => {
                if let Some(open) = paragraph.as_mut() {
                    open.has_display_math = true;
                }
                events.push(Event::Html(Math::Display(&tex).to_html().into()));
                continue;
            }
            Event::SoftBreak => Event::HardBreak,
            other => other,
        };

        match &event {
            Event::Start(Tag::Paragraph) => {
                paragraph = Some(OpenParagraph {
                    start: events.len(),
                    only_display_math: true,
                    has_display_math: false,
                });
            }
            // A paragraph holding nothing but display math loses its `<p>`.
            Event::End(TagEnd::Paragraph) => {
                if let Some(open) = paragraph.take() {
                    if open.only_display_math && open.has_display_math {
                        events.remove(open.start);
                        continue;
                    }
                }
            }
            Event::HardBreak => {}
            Event::Text(text) if text.trim().is_empty() => {}
            _ => {
                if let Some(open) = paragraph.as_mut() {
                    open.only_display_math = false;
                }
            }
        }
        events.push(event);
    }
    events
}

/// First word of the info string, lower-cased; `{.lang}` style is unwrapped.
fn fence_language(info: &str) -> String {
    info.split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c| c == '{' || c == '}' || c == '.')
        .to_lowercase()
}

// ── Math ─────────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Math<'a> {
    Display(&'a str),
    Inline(&'a str),
}

impl Math<'_> {
    fn to_html(&self) -> String {
        match self {
            Math::Display(tex) => format!(
                "<div class=\"arithmatex\">\\[{}\\]</div>\n",
                html_escape::encode_text(tex.trim())
            ),
            Math::Inline(tex) => format!(
                "<span class=\"arithmatex\">\\({}\\)</span>",
                html_escape::encode_text(tex.trim())
            ),
        }
    }
}

/// Byte ranges of `text` whose characters must reach the output literally:
/// code, raw HTML, `$` math, autolinks and link or image destinations.
fn literal_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    // Open links and images with the end of their last child so far.
    let mut links: Vec<(Range<usize>, usize)> = Vec::new();

    for (event, range) in Parser::new_ext(text, markdown_options()).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(_))
            | Event::Code(_)
            | Event::InlineMath(_)
            | Event::DisplayMath(_)
            | Event::Html(_)
            | Event::InlineHtml(_) => ranges.push(range.clone()),
            Event::Start(Tag::Link { link_type: LinkType::Autolink | LinkType::Email, .. }) => {
                ranges.push(range.clone());
                links.push((range.clone(), range.end));
                continue;
            }
            Event::Start(Tag::Link { .. } | Tag::Image { .. }) => {
                links.push((range.clone(), range.start));
                continue;
            }
            Event::End(TagEnd::Link | TagEnd::Image) => {
                if let Some((link, text_end)) = links.pop() {
                    ranges.push(text_end..link.end);
                    if let Some(parent) = links.last_mut() {
                        parent.1 = parent.1.max(link.end);
                    }
                }
                continue;
            }
            _ => {}
        }
        if let Some(open) = links.last_mut() {
            open.1 = open.1.max(range.end);
        }
    }
    ranges
}

fn overlaps(ranges: &[Range<usize>], span: &Range<usize>) -> bool {
    ranges.iter().any(|r| r.start < span.end && span.start < r.end)
}

/// Replace `\[…\]` and `\(…\)` outside `literal` ranges with shield markers.
fn protect_bracket_math(text: &str, literal: &[Range<usize>], shield: &mut Shield) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut pos = 0;

    while let Some(found) = text[pos..].find('\\') {
        let start = pos + found;
        pos = start + 1;

        // `\\(` is an escaped backslash followed by a plain parenthesis.
        let preceding = text[..start].len() - text[..start].trim_end_matches('\\').len();
        if preceding % 2 == 1 {
            continue;
        }
        let Some((math, len)) = match_bracket_math(&text[start..]) else {
            continue;
        };
        let span = start..start + len;
        if overlaps(literal, &span) {
            continue;
        }

        out.push_str(&text[copied..start]);
        out.push_str(&shield.protect(math.to_html()));
        copied = span.end;
        pos = span.end;
    }
    out.push_str(&text[copied..]);
    out
}

/// Match `\[…\]` or `\(…\)` at the start of `s`, returning it and its byte length.
fn match_bracket_math(s: &str) -> Option<(Math<'_>, usize)> {
    let caps = RE_BRACKET_MATH.captures(s)?;
    let (tex, display) = match (caps.get(1), caps.get(2)) {
        (Some(tex), _) => (tex.as_str(), true),
        (None, Some(tex)) => (tex.as_str(), false),
        (None, None) => return None,
    };
    if tex.trim().is_empty() || tex.contains("\n\n") {
        return None;
    }
    let math = if display { Math::Display(tex) } else { Math::Inline(tex) };
    Some((math, caps.get(0)?.end()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_and_line_breaks() {
        let html = render_markdown("Hello\nworld\n\nSecond");
        assert!(html.contains("<p>Hello<br />\nworld</p>"), "got: {html}");
        assert!(html.contains("<p>Second</p>"));
    }

    #[test]
    fn tables_are_rendered() {
        let html = render_markdown("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
    }

    #[test]
    fn fenced_code_is_highlighted_not_paragraph_wrapped() {
        let md = "Intro\n\n```python\ndef f(x):\n    return x < 1\n```\n\nAfter";
        let html = render_markdown(md);
        assert!(html.contains("<div class=\"codehilite\">"), "got: {html}");
        assert!(html.contains("language-python"));
        assert!(!html.contains("<p><div"), "code block leaked into a paragraph: {html}");
        assert!(html.contains("&lt;"));
        assert!(html.contains("<p>After</p>"));
    }

    #[test]
    fn unknown_language_falls_back_to_plain_text() {
        let html = render_markdown("```notalanguage\n<b>keep me</b>\n```");
        assert!(html.contains("&lt;b&gt;keep me&lt;/b&gt;"), "got: {html}");
        assert!(!html.contains("<b>keep me</b>"));
    }

    #[test]
    fn multiple_blocks_keep_their_order() {
        let md = "```rust\nlet first = 1;\n```\n\ntext\n\n```\nsecond block\n```";
        let html = render_markdown(md);
        let a = html.find("first").expect("first block");
        let b = html.find("second block").expect("second block");
        assert!(a < b);
        assert_eq!(html.matches("codehilite").count(), 2);
    }

    #[test]
    fn indented_fence_is_recognised() {
        let html = render_markdown("  ```js\n  let a = 1;\n  ```");
        assert!(html.contains("language-js"), "got: {html}");
    }

    #[test]
    fn marker_lookalikes_in_input_are_stripped() {
        let html = render_markdown("x \u{E000}0\u{E001} y\n\n```\ncode\n```");
        assert_eq!(html.matches("codehilite").count(), 1);
        assert!(html.contains("x 0 y"), "got: {html}");
    }

    #[test]
    fn display_math_keeps_delimiters() {
        let html = render_markdown("$$\na_1 < b^2\n$$");
        assert!(
            html.contains("<div class=\"arithmatex\">\\[a_1 &lt; b^2\\]</div>"),
            "got: {html}"
        );
    }

    #[test]
    fn inline_math_both_syntaxes() {
        let html = render_markdown("Euler: $e^{i\\pi}+1=0$ and \\(x_1\\).");
        assert!(html.contains("<span class=\"arithmatex\">\\(e^{i\\pi}+1=0\\)</span>"), "got: {html}");
        assert!(html.contains("<span class=\"arithmatex\">\\(x_1\\)</span>"));
    }

    #[test]
    fn prices_are_not_math() {
        let html = render_markdown("It costs $5 and $10 today.");
        assert!(!html.contains("arithmatex"), "got: {html}");
        assert!(html.contains("$5 and $10"));
    }

    #[test]
    fn dollars_in_inline_code_are_literal() {
        let html = render_markdown("Run `echo $HOME$` now");
        assert!(!html.contains("arithmatex"));
        assert!(html.contains("<code>echo $HOME$</code>"));
    }

    #[test]
    fn emphasis_inside_math_is_untouched() {
        let html = render_markdown("\\(a*b*c\\)");
        assert!(html.contains("a*b*c"), "got: {html}");
        assert!(!html.contains("<em>"));
    }

    #[test]
    fn crlf_input_is_normalised() {
        let html = render_markdown("```rust\r\nlet x = 1;\r\n```\r\n");
        assert!(html.contains("language-rust"), "got: {html}");
    }

    #[test]
    fn fence_language_parsing() {
        assert_eq!(fence_language(" Python title=\"x\""), "python");
        assert_eq!(fence_language("{.rust}"), "rust");
        assert_eq!(fence_language(""), "");
    }

    #[test]
    fn unclosed_math_is_plain_text() {
        let html = render_markdown("open \\( but never closed");
        assert!(!html.contains("arithmatex"));
    }

    #[test]
    fn tilde_fence_keeps_dollars_literal() {
        let html = render_markdown("~~~\nprice $x$ here\n\\(y\\)\n~~~");
        assert!(!html.contains("arithmatex"), "got: {html}");
        assert!(html.contains("price $x$ here"), "got: {html}");
        assert!(html.contains("\\(y\\)"));
        assert_eq!(html.matches("codehilite").count(), 1);
    }

    #[test]
    fn indented_code_keeps_dollars_literal() {
        let html = render_markdown("Shell:\n\n    echo $a$b");
        assert!(!html.contains("arithmatex"), "got: {html}");
        assert!(html.contains("echo $a$b"), "got: {html}");
        assert!(html.contains("codehilite"));
    }

    #[test]
    fn link_destinations_are_not_math() {
        let html = render_markdown("[pay](https://example.com/q?a=$x$) and [b](https://x.org/\\(y\\))");
        assert!(!html.contains("arithmatex"), "got: {html}");
        assert!(!html.contains("%EE%80"), "marker leaked into a URL: {html}");
        assert!(html.contains("a=$x$") || html.contains("a=%24x%24"), "got: {html}");
        assert!(html.contains(">pay</a>"));
    }

    #[test]
    fn math_in_link_text_is_rendered() {
        let html = render_markdown("[see \\(x^2\\)](https://example.com)");
        assert!(html.contains("<span class=\"arithmatex\">\\(x^2\\)</span></a>"), "got: {html}");
    }

    #[test]
    fn bracket_display_math_is_not_paragraph_wrapped() {
        let html = render_markdown("Before\n\n\\[\nx < y\n\\]\n\nAfter");
        assert!(html.contains("<div class=\"arithmatex\">\\[x &lt; y\\]</div>"), "got: {html}");
        assert!(!html.contains("<p><div"), "got: {html}");
    }

    #[test]
    fn escaped_backslash_is_not_math() {
        let html = render_markdown("path \\\\(a\\\\)");
        assert!(!html.contains("arithmatex"), "got: {html}");
    }
}
