//! Turns a contact's notes into the plain-text context handed to the model.

use std::sync::OnceLock;

use chrono::DateTime;
use regex::Regex;

use crate::types::Note;

fn re_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag regex should compile"))
}

/// Strip tags and decode the handful of entities HubSpot note bodies carry.
pub fn plain_text(html: &str) -> String {
    re_tag()
        .replace_all(html, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn note_date(created_at: &str) -> String {
    DateTime::parse_from_rfc3339(created_at)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|_| created_at.to_string())
}

/// One line per note, separated by a blank line. Empty input gives "".
pub fn build_notes_context(notes: &[Note]) -> String {
    notes
        .iter()
        .map(|note| {
            format!(
                "Note by {} on {}: {}",
                note.created_by,
                note_date(&note.created_at),
                plain_text(&note.text).trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(text: &str, created_at: &str) -> Note {
        Note {
            id: "1".into(),
            contact_id: "1".into(),
            text: text.into(),
            created_at: created_at.into(),
            created_by: "Sabine".into(),
        }
    }

    #[test]
    fn strips_tags_and_entities() {
        assert_eq!(
            plain_text("<p>Call&nbsp;back <b>Monday</b> &amp; send &lt;quote&gt;</p>"),
            "Call back Monday & send <quote>"
        );
    }

    #[test]
    fn amp_is_decoded_last() {
        assert_eq!(plain_text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn formats_each_note_with_author_and_date() {
        let context = build_notes_context(&[
            note("<div>Wants a demo</div>", "2023-03-10T10:30:00Z"),
            note("Budget approved", "yesterday"),
        ]);
        assert_eq!(
            context,
            "Note by Sabine on 2023-03-10: Wants a demo\n\nNote by Sabine on yesterday: Budget approved"
        );
    }

    #[test]
    fn no_notes_is_empty() {
        assert_eq!(build_notes_context(&[]), "");
    }
}
