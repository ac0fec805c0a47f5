//! crates/vocab_tutor_core/src/greeting.rs
//!
//! Opening line for a new session, chosen from where the learner left off.

use std::collections::BTreeMap;

/// Builds the greeting for a learner from their recorded progress.
///
/// Looks only at the most recently introduced word. Unknown or missing stage
/// tags fall through to the generic invitation.
pub fn greet(
    name: &str,
    target_language: &str,
    word_initiated: &[String],
    word_progress: &BTreeMap<String, String>,
) -> String {
    let Some(word) = word_initiated.last() else {
        return format!(
            "Hi {name}! Welcome aboard. It looks like this is your first visit, and I'm glad to help you build your vocabulary. 😊 Ready to discover your first word?"
        );
    };

    match word_progress.get(word).map(String::as_str) {
        Some("exerciseFailed") => format!(
            "Hey {name}! Last time, the word '{word}' gave us a bit of trouble. Want to give it another go, or start fresh with a new word? 😊"
        ),
        Some("exerciseGenerated") => format!(
            "Hey {name}! Last time we started exercises on the word '{word}' but didn't finish. Shall we complete them, or start fresh with a new word? 😄"
        ),
        Some("scenario") => format!(
            "Hey {name}! Last time you were exploring a scenario for the word '{word}'. Want to pick it back up, or start fresh with a new word? 😊"
        ),
        Some("meaning") => format!(
            "Hey {name}! Last time we were learning the meaning of the word '{word}'. Ready to carry on, or would you rather start fresh? 😄"
        ),
        Some("pronunciation") => format!(
            "Hey {name}! Last time we were practising how to pronounce the word '{word}'. Shall we keep going, or start fresh with a new word? 🔊"
        ),
        Some("sentence") => format!(
            "Hey {name}! Last time you were building sentences with the word '{word}'. Ready to finish them, or start fresh with a new word? ✍️"
        ),
        Some("context") => format!(
            "Hey {name}! Last time we were looking at how the word '{word}' is used in context. Shall we continue, or start fresh with a new word? 📚"
        ),
        Some("learned") => format!(
            "Hello {name}! Great job learning '{word}' last time. I'm excited to help you grow your {target_language} vocabulary today. Ready for a new word?"
        ),
        _ => format!(
            "Hello {name}! We last looked at the word '{word}'. Ready to resume, or shall we start fresh with a new word in {target_language}?"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_at(word: &str, tag: &str) -> (Vec<String>, BTreeMap<String, String>) {
        let mut progress = BTreeMap::new();
        progress.insert(word.to_string(), tag.to_string());
        (vec![word.to_string()], progress)
    }

    #[test]
    fn test_first_time_welcome() {
        let greeting = greet("Aria", "French", &[], &BTreeMap::new());
        assert!(greeting.starts_with("Hi Aria! Welcome aboard"));
    }

    #[test]
    fn test_greeting_is_total_over_stage_tags() {
        let tags = [
            "initiated",
            "scenario",
            "meaning",
            "pronunciation",
            "sentence",
            "context",
            "exerciseGenerated",
            "exerciseFailed",
            "learned",
            "denied",
            "somethingElse",
        ];
        for tag in tags {
            let (initiated, progress) = progress_at("baguette", tag);
            let greeting = greet("Aria", "French", &initiated, &progress);
            assert!(!greeting.is_empty(), "{tag}");
            assert!(greeting.contains("Aria"), "{tag}");
            assert!(greeting.contains("'baguette'"), "{tag}");
        }
    }

    #[test]
    fn test_stage_specific_templates() {
        let cases = [
            ("exerciseFailed", "gave us a bit of trouble"),
            ("exerciseGenerated", "started exercises"),
            ("scenario", "exploring a scenario"),
            ("meaning", "learning the meaning"),
            ("pronunciation", "pronounce"),
            ("sentence", "building sentences"),
            ("context", "in context"),
            ("learned", "Ready for a new word?"),
        ];
        for (tag, fragment) in cases {
            let (initiated, progress) = progress_at("baguette", tag);
            let greeting = greet("Aria", "French", &initiated, &progress);
            assert!(greeting.contains(fragment), "{tag}: {greeting}");
        }
    }

    #[test]
    fn test_unknown_and_terminal_tags_use_fallback() {
        let fallback = "Ready to resume, or shall we start fresh with a new word in French?";
        for tag in ["initiated", "denied", "weird"] {
            let (initiated, progress) = progress_at("baguette", tag);
            assert!(greet("Aria", "French", &initiated, &progress).ends_with(fallback));
        }

        let greeting = greet("Aria", "French", &["pain".to_string()], &BTreeMap::new());
        assert!(greeting.ends_with(fallback));
    }

    #[test]
    fn test_only_last_word_matters() {
        let mut progress = BTreeMap::new();
        progress.insert("pain".to_string(), "learned".to_string());
        progress.insert("fromage".to_string(), "meaning".to_string());
        let initiated = vec!["pain".to_string(), "fromage".to_string()];
        let greeting = greet("Aria", "French", &initiated, &progress);
        assert!(greeting.contains("'fromage'"));
        assert!(greeting.contains("learning the meaning"));
    }
}
