//! The three editable source buffers and the tab that selects between them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which buffer the editor currently shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    #[serde(alias = "html")]
    Markup,
    #[serde(alias = "css")]
    Style,
    #[serde(alias = "js")]
    Script,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::Markup, Tab::Style, Tab::Script];

    pub fn as_str(self) -> &'static str {
        match self {
            Tab::Markup => "markup",
            Tab::Style => "style",
            Tab::Script => "script",
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markup" | "html" => Ok(Tab::Markup),
            "style" | "css" => Ok(Tab::Style),
            "script" | "js" => Ok(Tab::Script),
            other => Err(format!("Unknown tab '{}'. Expected markup, style or script", other)),
        }
    }
}

/// Markup, style and script text. No slot validates against another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceBuffers {
    pub markup: String,
    pub style: String,
    pub script: String,
}

impl SourceBuffers {
    pub fn new(
        markup: impl Into<String>,
        style: impl Into<String>,
        script: impl Into<String>,
    ) -> Self {
        Self {
            markup: markup.into(),
            style: style.into(),
            script: script.into(),
        }
    }

    pub fn get(&self, tab: Tab) -> &str {
        match tab {
            Tab::Markup => &self.markup,
            Tab::Style => &self.style,
            Tab::Script => &self.script,
        }
    }

    pub fn get_mut(&mut self, tab: Tab) -> &mut String {
        match tab {
            Tab::Markup => &mut self.markup,
            Tab::Style => &mut self.style,
            Tab::Script => &mut self.script,
        }
    }

    /// Replace one slot, leaving the other two untouched.
    pub fn set(&mut self, tab: Tab, text: impl Into<String>) {
        *self.get_mut(tab) = text.into();
    }
}

/// Line and character counts shown under the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub lines: usize,
    pub chars: usize,
}

impl BufferStats {
    /// An empty buffer still counts as one line.
    pub fn of(text: &str) -> Self {
        Self {
            lines: text.split('\n').count(),
            chars: text.chars().count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editing_script_leaves_other_slots() {
        let mut buffers = SourceBuffers::new("<p>a</p>", "p{}", "let x = 1;");
        buffers.set(Tab::Script, "let y = 2;");

        assert_eq!(buffers.markup, "<p>a</p>");
        assert_eq!(buffers.style, "p{}");
        assert_eq!(buffers.script, "let y = 2;");
    }

    #[test]
    fn test_tab_aliases() {
        assert_eq!("html".parse::<Tab>().unwrap(), Tab::Markup);
        assert_eq!("CSS".parse::<Tab>().unwrap(), Tab::Style);
        assert_eq!("js".parse::<Tab>().unwrap(), Tab::Script);
        assert!("python".parse::<Tab>().is_err());

        let tab: Tab = serde_json::from_str("\"css\"").unwrap();
        assert_eq!(tab, Tab::Style);
        assert_eq!(serde_json::to_string(&Tab::Script).unwrap(), "\"script\"");
    }

    #[test]
    fn test_stats() {
        assert_eq!(BufferStats::of(""), BufferStats { lines: 1, chars: 0 });
        assert_eq!(BufferStats::of("a\nbé"), BufferStats { lines: 2, chars: 4 });
    }
}
