//! The page request submitted to the pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default heading shown above the user's text.
pub const DEFAULT_USER_HEADING: &str = "User Message";
/// Default heading shown above the model's text.
pub const DEFAULT_MODEL_HEADING: &str = "Model Response";

/// One page to append: user text, model text and optional images.
///
/// Immutable once handed to [`crate::append_page`].
///
/// ```rust
/// use chat_archiver::PageRequest;
///
/// let req = PageRequest::new("What is 2+2?", "**4**")
///     .image("chart.png")
///     .headings("Q", "A");
/// assert_eq!(req.user_heading, "Q");
/// assert_eq!(req.image_paths.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub user_text: String,
    pub model_text: String,
    /// Images appended after the text sections, in this order.
    pub image_paths: Vec<PathBuf>,
    pub show_headings: bool,
    pub user_heading: String,
    pub model_heading: String,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            user_text: String::new(),
            model_text: String::new(),
            image_paths: Vec::new(),
            show_headings: true,
            user_heading: DEFAULT_USER_HEADING.to_string(),
            model_heading: DEFAULT_MODEL_HEADING.to_string(),
        }
    }
}

impl PageRequest {
    pub fn new(user_text: impl Into<String>, model_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            model_text: model_text.into(),
            ..Self::default()
        }
    }

    pub fn image(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_paths.push(path.into());
        self
    }

    pub fn images<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.image_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn show_headings(mut self, v: bool) -> Self {
        self.show_headings = v;
        self
    }

    pub fn headings(mut self, user: impl Into<String>, model: impl Into<String>) -> Self {
        self.user_heading = user.into();
        self.model_heading = model.into();
        self
    }

    /// True when there is no text in either section and no image.
    ///
    /// The pipeline still produces a blank page for such a request; callers
    /// that want to refuse it check this first.
    pub fn is_blank(&self) -> bool {
        self.user_text.trim().is_empty()
            && self.model_text.trim().is_empty()
            && self.image_paths.is_empty()
    }
}
