//! Plain-text rendering of tabs and results.

use serde_json::Value;
use shared::result::{ChatRole, StudyResult};
use shared::study::StudyMode;
use shared::tabs::Tab;
use std::fmt::Write;

pub fn tabs(tabs: &[Tab], active: Option<(usize, usize)>, selected: &[usize]) -> String {
    if tabs.is_empty() {
        return "(no open studies)".to_string();
    }
    let mut out = String::new();
    for (index, tab) in tabs.iter().enumerate() {
        let marker = match active {
            Some((tab_index, _)) if tab_index == index => '*',
            _ => ' ',
        };
        let check = if selected.contains(&index) { "[x] " } else { "" };
        let _ = writeln!(out, "{} {:>2}  {}{}", marker, index, check, tab.label());
        if let Tab::Group(group) = tab {
            for (sub, item) in group.items.iter().enumerate() {
                let marker = if active == Some((index, sub)) { '>' } else { ' ' };
                let _ = writeln!(out, "      {} {}. {}", marker, sub, item.title());
            }
        }
    }
    out.trim_end().to_string()
}

pub fn result(result: &StudyResult, mode: StudyMode) -> String {
    let mut out = String::new();
    match result {
        StudyResult::Sections(sections) => {
            for section in &sections.sections {
                let _ = writeln!(out, "## {}\n{}\n", heading(&section.name), payload(&section.payload));
            }
            if !sections.complete {
                let percent = (sections.progress(mode) * 100.0).round();
                let _ = writeln!(out, "(still loading... {}%)", percent);
            }
        }
        StudyResult::Chat(transcript) => {
            for message in &transcript.messages {
                let who = match message.role {
                    ChatRole::User => "you",
                    ChatRole::Model => "guide",
                    ChatRole::System => "--",
                };
                let _ = writeln!(out, "{}: {}", who, message.text.trim());
            }
        }
        StudyResult::Guided(plan) => {
            let _ = writeln!(
                out,
                "{} ({}) - {}/{} sessions\n",
                plan.topic,
                plan.level,
                plan.sessions.len(),
                plan.total_sessions
            );
            if !plan.introduction.is_empty() {
                let _ = writeln!(out, "{}\n", plan.introduction.trim());
            }
            for session in &plan.sessions {
                let _ = writeln!(out, "## Session {}: {}\n{}\n", session.number, session.title, payload(&session.content));
            }
            if !plan.is_finished() && !plan.sessions.is_empty() {
                out.push_str("(type `continue` for the next session)\n");
            }
        }
    }
    out.trim_end().to_string()
}

fn heading(name: &str) -> String {
    let mut words = name.split('_').map(|word| {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        }
    });
    let mut heading = words.next().unwrap_or_default();
    for word in words {
        heading.push(' ');
        heading.push_str(&word);
    }
    heading
}

fn payload(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(map) if map.len() == 1 => match map.values().next() {
            Some(Value::String(text)) => text.clone(),
            _ => pretty(value),
        },
        _ => pretty(value),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::result::{ChatMessage, ChatTranscript, SectionChunk, SectionedResult};
    use shared::study::StudyItem;
    use shared::tabs::TabGroup;

    #[test]
    fn test_sections_render_in_order() {
        let mut sections = SectionedResult::default();
        sections.merge(SectionChunk::new("original_text", json!({ "text": "In the beginning" })));
        sections.merge(SectionChunk::new("cross_references", json!(["John 1:1"])));

        let text = result(&StudyResult::Sections(sections), StudyMode::Reference);
        let original = text.find("## Original Text").unwrap();
        let cross = text.find("## Cross References").unwrap();
        assert!(original < cross);
        assert!(text.contains("In the beginning"));
        // Two of the five reference sections
        assert!(text.ends_with("(still loading... 40%)"));
    }

    #[test]
    fn test_chat_roles() {
        let mut transcript = ChatTranscript::default();
        transcript.push(ChatMessage::user("hello"));
        transcript.push(ChatMessage::model("peace"));
        assert_eq!(
            result(&StudyResult::Chat(transcript), StudyMode::Chat),
            "you: hello\nguide: peace"
        );
    }

    #[test]
    fn test_tab_strip_marks_active_member() {
        let strip = vec![
            Tab::Single(StudyItem::topic("faith")),
            Tab::Group(TabGroup::new(vec![
                StudyItem::topic("hope"),
                StudyItem::topic("love"),
            ])),
        ];
        let text = tabs(&strip, Some((1, 1)), &[0]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("[x] faith"));
        assert!(lines[1].starts_with('*'));
        assert!(lines[3].contains("> 1. love"));
    }
}
