use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Keyword of the style directive that a user may already have written.
pub const STYLE_DIRECTIVE: &str = "skinparam";

static OPENING_MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)@startuml").unwrap());
static DIRECTIVE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^[ \t]*skinparam\b").unwrap());

#[derive(Debug, Clone, Copy)]
pub struct StyleEntry {
    pub id: &'static str,
    pub label: &'static str,
    pub code: &'static str,
}

pub const STYLES: &[StyleEntry] = &[
    StyleEntry {
        id: "default",
        label: "Default",
        code: "",
    },
    StyleEntry {
        id: "blueprint",
        label: "Blueprint",
        code: "skinparam backgroundColor #EEEBDC
skinparam sequenceArrowThickness 2
skinparam roundcorner 20
skinparam maxmessagesize 60
skinparam sequenceParticipant underline",
    },
    StyleEntry {
        id: "modern",
        label: "Modern Dark",
        code: "skinparam backgroundColor #1e1e1e
skinparam sequenceMessageAlign center
skinparam sequenceArrowThickness 2
skinparam participant {
  BackgroundColor #2d2d2d
  BorderColor #6366f1
  FontColor #ffffff
}
skinparam sequence {
  ArrowColor #6366f1
  LifeLineBorderColor #6366f1
}",
    },
    StyleEntry {
        id: "minimal",
        label: "Minimal",
        code: "skinparam monochrome true
skinparam shadowing false
skinparam defaultFontName Arial
skinparam defaultFontSize 14",
    },
    StyleEntry {
        id: "vibrant",
        label: "Vibrant",
        code: "skinparam backgroundColor #f0f0f0
skinparam participant {
  BackgroundColor gradient {
    #FF6B6B
    #4ECDC4
  }
  BorderColor #333333
  FontColor #ffffff
  FontStyle bold
}
skinparam sequenceArrowThickness 2
skinparam sequenceArrowColor #333333",
    },
];

/// Returns the style block for `id`; unknown ids fall back to no style.
pub fn select_style(id: &str) -> &'static str {
    STYLES
        .iter()
        .find(|entry| entry.id == id)
        .map(|entry| entry.code)
        .unwrap_or("")
}

/// Finds the catalog id whose block is exactly `code`.
pub fn style_id_for(code: &str) -> Option<&'static str> {
    STYLES
        .iter()
        .find(|entry| entry.code == code)
        .map(|entry| entry.id)
}

/// Id following `current` in catalog order, wrapping around.
pub fn next_style(current: &str) -> &'static str {
    let idx = STYLES
        .iter()
        .position(|entry| entry.id == current)
        .map(|idx| (idx + 1) % STYLES.len())
        .unwrap_or(0);
    STYLES[idx].id
}

/// How a source is checked for style directives the user already wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "camelCase")]
pub enum StyleDetection {
    /// Case-insensitive match of the keyword anywhere in the text.
    #[default]
    Substring,
    /// Only lines that start with the keyword count.
    LineStart,
}

impl StyleDetection {
    pub fn has_directive(self, source: &str) -> bool {
        match self {
            StyleDetection::Substring => source.to_ascii_lowercase().contains(STYLE_DIRECTIVE),
            StyleDetection::LineStart => DIRECTIVE_LINE_RE.is_match(source),
        }
    }
}

/// Source as sent to the server: `style` spliced in on the line after the
/// first `@startuml`, unless the source already styles itself.
pub fn effective_source<'a>(source: &'a str, style: &str, detection: StyleDetection) -> Cow<'a, str> {
    if style.is_empty() || detection.has_directive(source) {
        return Cow::Borrowed(source);
    }
    let Some(marker) = OPENING_MARKER_RE.find(source) else {
        return Cow::Borrowed(source);
    };
    let line_end = source[marker.end()..]
        .find('\n')
        .map(|offset| marker.end() + offset)
        .unwrap_or(source.len());
    let line_end = if source[..line_end].ends_with('\r') {
        line_end - 1
    } else {
        line_end
    };

    let mut out = String::with_capacity(source.len() + style.len() + 1);
    out.push_str(&source[..line_end]);
    out.push('\n');
    out.push_str(style);
    out.push_str(&source[line_end..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HI: &str = "@startuml\nAlice -> Bob: Hi\n@enduml";

    #[test]
    fn blueprint_lines_follow_opening_marker() {
        let style = select_style("blueprint");
        let out = effective_source(HI, style, StyleDetection::Substring);
        assert!(out.starts_with(&format!("@startuml\n{style}\n")));
        assert!(out.ends_with("Alice -> Bob: Hi\n@enduml"));
    }

    #[test]
    fn marker_match_ignores_case() {
        let source = "@StartUML\nA -> B\n@enduml";
        let out = effective_source(source, "skinparam monochrome true", StyleDetection::Substring);
        assert_eq!(out, "@StartUML\nskinparam monochrome true\nA -> B\n@enduml");
    }

    #[test]
    fn splices_after_first_marker_only() {
        let source = "@startuml\nA -> B\n@enduml\n@startuml\nC -> D\n@enduml";
        let out = effective_source(source, "skinparam shadowing false", StyleDetection::Substring);
        assert_eq!(out.matches("skinparam").count(), 1);
        assert!(out.starts_with("@startuml\nskinparam shadowing false\nA -> B"));
    }

    #[test]
    fn keeps_named_marker_line_intact() {
        let source = "@startuml checkout\r\nA -> B\r\n@enduml";
        let out = effective_source(source, "skinparam roundcorner 20", StyleDetection::Substring);
        assert_eq!(out, "@startuml checkout\nskinparam roundcorner 20\r\nA -> B\r\n@enduml");
    }

    #[test]
    fn existing_directive_wins_over_selected_style() {
        let source = "@startuml\nSKINPARAM monochrome true\nA -> B\n@enduml";
        for entry in STYLES {
            let out = effective_source(source, entry.code, StyleDetection::Substring);
            assert_eq!(out, source);
        }
    }

    #[test]
    fn empty_style_or_missing_marker_leaves_source_alone() {
        assert!(matches!(
            effective_source(HI, "", StyleDetection::Substring),
            Cow::Borrowed(_)
        ));
        let no_marker = "Alice -> Bob: Hi";
        assert_eq!(
            effective_source(no_marker, select_style("minimal"), StyleDetection::Substring),
            no_marker
        );
    }

    #[test]
    fn line_start_detection_ignores_keyword_inside_messages() {
        let source = "@startuml\nAlice -> Bob: what is a skinparam?\n@enduml";
        let style = select_style("minimal");
        assert_eq!(
            effective_source(source, style, StyleDetection::Substring),
            source
        );
        let out = effective_source(source, style, StyleDetection::LineStart);
        assert!(out.starts_with(&format!("@startuml\n{style}\n")));

        let styled = "@startuml\n  skinparam monochrome true\nA -> B\n@enduml";
        assert!(StyleDetection::LineStart.has_directive(styled));
    }

    #[test]
    fn unknown_and_default_styles_are_empty() {
        assert_eq!(select_style("default"), "");
        assert_eq!(select_style("no-such-style"), "");
        assert!(select_style("modern").contains("#6366f1"));
    }

    #[test]
    fn style_cycle_wraps_and_recovers_ids() {
        assert_eq!(next_style("default"), "blueprint");
        assert_eq!(next_style("vibrant"), "default");
        assert_eq!(next_style("bogus"), "default");
        assert_eq!(style_id_for(select_style("vibrant")), Some("vibrant"));
        assert_eq!(style_id_for(""), Some("default"));
        assert_eq!(style_id_for("skinparam custom 1"), None);
    }
}
