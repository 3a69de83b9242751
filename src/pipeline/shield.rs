//! Region shield: hide finished HTML fragments from the Markdown pass.
//!
//! Bracket-delimited math must reach the final HTML untouched, but it sits
//! in the middle of text that pulldown-cmark will rewrite. Each such
//! fragment is swapped for a marker before the Markdown pass and swapped back
//! afterwards.
//!
//! A marker is `U+E000 <index> U+E001`. Both delimiters are Private Use Area
//! code points that [`Shield::sanitize`] strips from every input first, so a
//! marker can only ever come from [`Shield::protect`]. pulldown-cmark treats
//! them as ordinary text and passes them through unchanged.

use std::borrow::Cow;

const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

/// Holds the protected fragments for one rendering pass.
#[derive(Debug, Default)]
pub struct Shield {
    fragments: Vec<String>,
}

impl Shield {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove marker delimiters from untrusted input.
    pub fn sanitize(input: &str) -> Cow<'_, str> {
        if input.contains([OPEN, CLOSE]) {
            Cow::Owned(input.replace([OPEN, CLOSE], ""))
        } else {
            Cow::Borrowed(input)
        }
    }

    /// Store `html` and return the marker that stands in for it.
    pub fn protect(&mut self, html: String) -> String {
        let marker = marker(self.fragments.len());
        self.fragments.push(html);
        marker
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Put every fragment back into `rendered`.
    ///
    /// A marker that ended up alone in a paragraph is replaced together with
    /// its `<p>` wrapper; otherwise the bare marker is replaced.
    pub fn restore(&self, rendered: &str) -> String {
        let mut out = rendered.to_string();
        for (i, fragment) in self.fragments.iter().enumerate() {
            let bare = marker(i);
            let wrapped = format!("<p>{bare}</p>");
            if out.contains(&wrapped) {
                out = out.replace(&wrapped, fragment);
            } else {
                out = out.replace(&bare, fragment);
            }
        }
        out
    }
}

fn marker(index: usize) -> String {
    format!("{OPEN}{index}{CLOSE}")
}
