//! Page composer: request + images + stylesheet → one HTML document.

use crate::config::ArchiveConfig;
use crate::error::ComposeError;
use crate::pipeline::input::LoadedImage;
use crate::pipeline::{highlight, markdown};
use crate::request::PageRequest;
use crate::template;
use std::borrow::Cow;
use tracing::debug;

/// One rendered block (user or model) of the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSection {
    /// Heading text, unescaped. `None` when headings are off or blank.
    pub heading: Option<String>,
    pub html: String,
}

impl RenderedSection {
    fn push_to(&self, body: &mut String) {
        if let Some(ref heading) = self.heading {
            body.push_str("<h1>");
            body.push_str(&html_escape::encode_text(heading));
            body.push_str("</h1>\n");
        }
        body.push_str("<div class=\"content\">\n");
        body.push_str(&self.html);
        body.push_str("</div>\n");
    }
}

/// The complete HTML page handed to the rasterizer.
#[derive(Debug, Clone)]
pub struct ComposedDocument {
    pub html: String,
    pub image_count: usize,
}

/// Render one section, or `None` if its text is blank.
pub fn render_section(text: &str, show_headings: bool, heading: &str) -> Option<RenderedSection> {
    if text.trim().is_empty() {
        return None;
    }
    let heading = heading.trim();
    let heading = (show_headings && !heading.is_empty()).then(|| heading.to_string());
    Some(RenderedSection {
        heading,
        html: markdown::render_markdown(text),
    })
}

/// Read the stylesheet override, or fall back to the bundled one.
pub async fn load_stylesheet(config: &ArchiveConfig) -> Result<Cow<'static, str>, ComposeError> {
    match config.stylesheet_path {
        Some(ref path) => tokio::fs::read_to_string(path)
            .await
            .map(Cow::Owned)
            .map_err(|source| ComposeError::StylesheetUnreadable {
                path: path.clone(),
                source,
            }),
        None => Ok(Cow::Borrowed(template::DEFAULT_STYLESHEET)),
    }
}

/// Build the full document. Sections come first (user, then model), then
/// every image in request order.
pub fn compose(
    request: &PageRequest,
    images: &[LoadedImage],
    stylesheet: &str,
    config: &ArchiveConfig,
) -> ComposedDocument {
    let sections = [
        render_section(&request.user_text, request.show_headings, &request.user_heading),
        render_section(&request.model_text, request.show_headings, &request.model_heading),
    ];

    let mut body = String::new();
    for section in sections.iter().flatten() {
        section.push_to(&mut body);
    }

    for (i, image) in images.iter().enumerate() {
        body.push_str("<div class=\"image\"><img src=\"");
        body.push_str(&image.data_uri());
        body.push_str("\" alt=\"");
        body.push_str(&html_escape::encode_double_quoted_attribute(&format!(
            "image {}",
            i + 1
        )));
        body.push_str("\"></div>\n");
    }

    let css = format!("{stylesheet}\n{}", highlight::theme_css(&config.code_theme));
    let head_extra = if config.external_assets {
        template::EXTERNAL_ASSETS
    } else {
        ""
    };

    let html = template::document(&css, head_extra, &body);
    debug!(
        "Composed page: {} sections, {} images, {} bytes",
        sections.iter().flatten().count(),
        images.len(),
        html.len()
    );

    ComposedDocument {
        html,
        image_count: images.len(),
    }
}
