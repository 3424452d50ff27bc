//! # Rendering - Markdown to HTML with Highlighted Code Blocks
//!
//! Turns assistant Markdown into a standalone HTML document suitable for an
//! embedded browser view or a file on disk.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Renderer                           │
//! │  ┌────────────────────┐   ┌───────────────────────────┐   │
//! │  │  pulldown-cmark    │   │  Fenced code blocks       │   │
//! │  │  event stream      │──►│  (syntect + theme,        │   │
//! │  │  (CommonMark+GFM)  │   │   language header,        │   │
//! │  │                    │   │   Copy button)            │   │
//! │  └─────────┬──────────┘   └─────────────┬─────────────┘   │
//! │            ▼                            ▼                 │
//! │  ┌────────────────────────────────────────────────────┐   │
//! │  │  HTML document: CSS (font prefs) + body + script   │   │
//! │  └────────────────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Supported Markdown
//!
//! CommonMark as parsed by `pulldown-cmark`: headings of every level,
//! paragraphs, emphasis, links, images, blockquotes, nested lists, inline code
//! and rules, plus the GFM tables, strikethrough and task lists extensions.
//!
//! Raw HTML in the input is shown as text, never passed through.
//!
//! ## Code blocks
//!
//! Fenced blocks are highlighted with `syntect`. The language is the first word
//! of the fence's info string; fences without one are labelled `plaintext`.
//! Each block gets a unique container id and a header:
//!
//! ```html
//! <div class="code-block-container" id="...">
//!   <div class="code-header">
//!     <span class="language">rust</span>
//!     <button class="copy-button" onclick="copyToClipboard(this)">Copy</button>
//!   </div>
//!   <div class="codehilite"><pre ...>...</pre></div>
//! </div>
//! ```
//!
//! Indented code blocks keep the plain `<pre><code>` rendering.
//!
//! ## Usage
//!
//! ```no_run
//! use mdchat::render::{RenderOptions, Renderer};
//!
//! let renderer = Renderer::new();
//! let html = renderer.render_html("# Hi\n\n```rust\nfn main() {}\n```\n", &RenderOptions::default());
//! std::fs::write("reply.html", html).unwrap();
//! ```

use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html};
use serde::{Deserialize, Serialize};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::{SyntaxReference, SyntaxSet};
use tracing::warn;
use uuid::Uuid;

use crate::preferences::Preferences;

/// Label used for fences without a language token.
pub const PLAINTEXT: &str = "plaintext";

/// Code highlighting palette.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    /// Name of the bundled syntect theme.
    pub fn syntect_name(&self) -> &'static str {
        match self {
            Theme::Dark => "base16-ocean.dark",
            Theme::Light => "InspiredGitHub",
        }
    }
}

/// Presentation knobs for [`Renderer::render_html`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub theme: Theme,
    pub font_family: String,
    pub font_size: i32,
}

impl RenderOptions {
    pub fn new(preferences: &Preferences, theme: Theme) -> Self {
        Self {
            theme,
            font_family: preferences.font_family.clone(),
            font_size: preferences.font_size,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::new(&Preferences::default(), Theme::default())
    }
}

fn parser(markdown: &str) -> Parser<'_> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    Parser::new_ext(markdown, options)
}

/// Languages of every fenced code block, in order; `plaintext` when unlabelled.
pub fn extract_languages(markdown: &str) -> Vec<String> {
    parser(markdown)
        .filter_map(|event| match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                Some(language_label(&info))
            }
            _ => None,
        })
        .collect()
}

fn language_label(info: &str) -> String {
    info.split_whitespace()
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| PLAINTEXT.to_string())
}

/// HTML-escape `text` the same way body text is escaped.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    html::push_html(&mut out, std::iter::once(Event::Text(CowStr::Borrowed(text))));
    out
}

/// Font family as it may appear inside a double-quoted CSS string.
fn css_string(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '"' | '\\' | '<' | '>' | '{' | '}' | ';'))
        .collect()
}

/// Markdown → HTML renderer. Syntax definitions and themes are loaded once.
pub struct Renderer {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
        }
    }

    /// Render `markdown` as a complete HTML document.
    pub fn render_html(&self, markdown: &str, options: &RenderOptions) -> String {
        let body = self.render_body(markdown, options.theme);
        wrap_document(&body, options)
    }

    /// Render `markdown` to an HTML fragment (no `<html>`/`<head>`).
    ///
    /// Fenced code blocks are collected from the event stream and replaced by
    /// their highlighted container; everything else goes to `push_html`.
    pub fn render_body(&self, markdown: &str, theme: Theme) -> String {
        let mut events = Vec::new();
        let mut fence: Option<(String, String)> = None;

        for event in parser(markdown) {
            if let Some((language, mut code)) = fence.take() {
                match event {
                    Event::End(TagEnd::CodeBlock) => {
                        let block = self.code_block(&code, &language, theme);
                        events.push(Event::Html(block.into()));
                    }
                    Event::Text(text) => {
                        code.push_str(&text);
                        fence = Some((language, code));
                    }
                    _ => fence = Some((language, code)),
                }
                continue;
            }

            match event {
                Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                    fence = Some((language_label(&info), String::new()));
                }
                Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
                other => events.push(other),
            }
        }

        let mut html = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut html, events.into_iter());
        html
    }

    fn find_syntax(&self, language: &str) -> &SyntaxReference {
        let ps = &self.syntax_set;
        ps.find_syntax_by_token(language)
            .or_else(|| ps.find_syntax_by_extension(language))
            .or_else(|| match language.to_lowercase().as_str() {
                "py" | "python3" => ps.find_syntax_by_extension("py"),
                "js" | "javascript" | "ts" | "typescript" => ps.find_syntax_by_extension("js"),
                "rs" => ps.find_syntax_by_extension("rs"),
                "sh" | "bash" | "shell" | "zsh" => ps.find_syntax_by_extension("sh"),
                "yml" => ps.find_syntax_by_extension("yaml"),
                "md" => ps.find_syntax_by_extension("md"),
                _ => None,
            })
            .unwrap_or_else(|| ps.find_syntax_plain_text())
    }

    fn code_block(&self, code: &str, language: &str, theme: Theme) -> String {
        let syntax = self.find_syntax(language);
        let highlighted = match self.theme_set.themes.get(theme.syntect_name()) {
            Some(syntect_theme) => {
                highlighted_html_for_string(code, &self.syntax_set, syntax, syntect_theme)
                    .map_err(|err| warn!("Highlighting {} block failed: {}", language, err))
                    .ok()
            }
            None => {
                warn!("Theme {} is not bundled", theme.syntect_name());
                None
            }
        };
        let pre = highlighted.unwrap_or_else(|| format!("<pre>{}</pre>", escape_text(code)));

        let id = Uuid::new_v4();
        format!(
            "<div class=\"code-block-container\" id=\"{id}\">\
             <div class=\"code-header\"><span class=\"language\">{}</span>\
             <button class=\"copy-button\" onclick=\"copyToClipboard(this)\">Copy</button></div>\
             <div class=\"codehilite\">{pre}</div></div>\n",
            escape_text(language)
        )
    }
}

fn wrap_document(body: &str, options: &RenderOptions) -> String {
    let font_family = css_string(&options.font_family);
    let font_size = options.font_size;
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
body {{
    font-family: "{font_family}", sans-serif;
    font-size: {font_size}pt;
}}
.code-block-container {{
    position: relative;
    margin-bottom: 20px;
    border: 1px solid #e1e4e8;
    border-radius: 6px;
    overflow: hidden;
}}
.code-header {{
    display: flex;
    justify-content: space-between;
    align-items: center;
    background: #333333;
    padding: 8px;
    font-size: 12px;
    font-family: Arial, sans-serif;
    color: #ffffff;
    border-bottom: 1px solid #e1e4e8;
}}
.code-header .language {{
    font-weight: bold;
}}
.code-header button.copy-button {{
    background: none;
    border: none;
    color: #58a6ff;
    cursor: pointer;
    font-size: 12px;
}}
.codehilite pre {{
    border-radius: 0 0 6px 6px;
    padding: 10px;
    overflow: auto;
    margin: 0;
}}
</style>
</head>
<body>
{body}
<script>
function copyToClipboard(button) {{
    var codeBlock = button.parentNode.nextElementSibling;
    var text = codeBlock.innerText || codeBlock.textContent;
    var tempTextArea = document.createElement("textarea");
    tempTextArea.value = text;
    document.body.appendChild(tempTextArea);
    tempTextArea.select();
    document.execCommand("copy");
    document.body.removeChild(tempTextArea);
    button.innerText = "Copied";
    setTimeout(function() {{
        button.innerText = "Copy";
    }}, 10000);
}}
</script>
</body>
</html>
"#
    )
}
