//! Markdown to HTML conversion for post bodies and feed descriptions.

use pulldown_cmark::{html, Options, Parser};

/// Renders `markdown` to an HTML fragment. Raw HTML in the source is passed
/// through, since only the admin writes posts.
pub fn to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, Parser::new_ext(markdown, options));
    output
}
