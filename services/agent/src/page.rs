//! Page Surface
//!
//! The local document the color tools act on. Styles set by the remote agent
//! are applied to the `<body>` element whenever the document is rendered.

use anyhow::{Context, bail};
use std::path::Path;
use tokio::sync::Mutex;

const DEFAULT_DOCUMENT: &str = "<html>\
<head><title>Realtime agent</title></head>\
<body>\
<h1>Realtime agent</h1>\
<p>Ask the agent to change the colors of this page, or to read it back to you.</p>\
</body>\
</html>";

/// Inline styles the agent has applied to the page body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageStyle {
    pub background_color: Option<String>,
    pub color: Option<String>,
}

impl PageStyle {
    fn declarations(&self) -> String {
        let mut decls = Vec::new();
        if let Some(c) = &self.background_color {
            decls.push(format!("background-color: {};", c));
        }
        if let Some(c) = &self.color {
            decls.push(format!("color: {};", c));
        }
        decls.join(" ")
    }
}

pub struct PageSurface {
    document: String,
    style: Mutex<PageStyle>,
}

impl Default for PageSurface {
    fn default() -> Self {
        Self::new(DEFAULT_DOCUMENT)
    }
}

impl PageSurface {
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            style: Mutex::new(PageStyle::default()),
        }
    }

    /// Reads the document from an HTML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let document = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read page from {}", path.display()))?;
        Ok(Self::new(document))
    }

    pub async fn set_background_color(&self, color: &str) -> anyhow::Result<()> {
        let color = checked_color(color)?;
        self.style.lock().await.background_color = Some(color);
        Ok(())
    }

    pub async fn set_text_color(&self, color: &str) -> anyhow::Result<()> {
        let color = checked_color(color)?;
        self.style.lock().await.color = Some(color);
        Ok(())
    }

    pub async fn style(&self) -> PageStyle {
        self.style.lock().await.clone()
    }

    /// The document as currently styled.
    pub async fn outer_html(&self) -> String {
        let style = self.style.lock().await;
        render(&self.document, &style)
    }
}

/// Accepts any CSS color token that cannot break out of a style attribute.
fn checked_color(color: &str) -> anyhow::Result<String> {
    let color = color.trim();
    if color.is_empty() {
        bail!("color must not be empty");
    }
    if color.chars().any(|c| matches!(c, '"' | '\'' | '<' | '>' | ';' | '{' | '}')) {
        bail!("'{}' is not a valid color", color);
    }
    Ok(color.to_string())
}

fn render(document: &str, style: &PageStyle) -> String {
    let decls = style.declarations();
    if decls.is_empty() {
        return document.to_string();
    }

    let lower = document.to_ascii_lowercase();
    let Some(start) = lower.find("<body") else {
        return document.to_string();
    };
    let Some(end) = lower[start..].find('>').map(|i| start + i) else {
        return document.to_string();
    };

    // Append to an existing style attribute so ours take precedence. Only a
    // whole `style` attribute counts, not a suffix like `data-style`.
    let tag = &lower[start..end];
    let style_attr = tag
        .match_indices("style=\"")
        .map(|(i, _)| i)
        .find(|&i| tag.as_bytes()[i - 1].is_ascii_whitespace());
    if let Some(attr) = style_attr {
        let value_start = start + attr + "style=\"".len();
        if let Some(value_end) = lower[value_start..end].find('"').map(|i| value_start + i) {
            let existing = document[value_start..value_end].trim_end();
            let value = match existing {
                "" => decls,
                e if e.ends_with(';') => format!("{} {}", e, decls),
                e => format!("{}; {}", e, decls),
            };
            return format!(
                "{}{}{}",
                &document[..value_start],
                value,
                &document[value_end..]
            );
        }
    }

    format!("{} style=\"{}\"{}", &document[..end], decls, &document[end..])
}
