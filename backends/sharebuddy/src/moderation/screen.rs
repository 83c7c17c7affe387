use regex_lite::Regex;

use crate::config::ModerationConfig;

/// The parts of a document the screener looks at.
#[derive(Debug, Clone)]
pub struct Submission<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub file_type: &'a str,
    pub file_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Approve,
    Reject(String),
    /// Leave pending for a human.
    Escalate(String),
}

#[derive(Debug, Clone)]
pub struct Screener {
    banned: Option<Regex>,
    allowed_file_types: Vec<String>,
    max_file_size_bytes: i64,
    min_description_length: usize,
}

impl Screener {
    pub fn from_config(config: &ModerationConfig) -> Result<Self, regex_lite::Error> {
        let words: Vec<String> = config
            .banned_words
            .iter()
            .map(|word| word.trim())
            .filter(|word| !word.is_empty())
            .map(regex_lite::escape)
            .collect();

        let banned = if words.is_empty() {
            None
        } else {
            Some(Regex::new(&format!(r"(?i)(?:{})", words.join("|")))?)
        };

        Ok(Self {
            banned,
            allowed_file_types: config
                .allowed_file_types
                .iter()
                .map(|t| t.trim().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_file_size_bytes: config.max_file_size_bytes,
            min_description_length: config.min_description_length,
        })
    }

    /// Hard rule violations reject; a thin description only escalates.
    pub fn screen(&self, submission: &Submission<'_>) -> Verdict {
        if let Some(banned) = &self.banned {
            for field in [submission.title, submission.description] {
                if let Some(found) = find_whole_word(banned, field) {
                    return Verdict::Reject(format!("contains prohibited term \"{found}\""));
                }
            }
        }

        let file_type = submission
            .file_type
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();
        if !self.allowed_file_types.is_empty() && !self.allowed_file_types.contains(&file_type) {
            return Verdict::Reject(format!("file type \"{file_type}\" is not accepted"));
        }

        if submission.file_size <= 0 {
            return Verdict::Reject("file is empty".to_string());
        }
        if submission.file_size > self.max_file_size_bytes {
            return Verdict::Reject(format!(
                "file exceeds the {} byte limit",
                self.max_file_size_bytes
            ));
        }

        if submission.description.trim().chars().count() < self.min_description_length {
            return Verdict::Escalate("description too short for automatic approval".to_string());
        }

        Verdict::Approve
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// First match not glued to a neighbouring letter or digit. regex-lite only
/// knows ASCII word boundaries, so `\b` would split "café" after "caf".
fn find_whole_word<'h>(banned: &Regex, text: &'h str) -> Option<&'h str> {
    let mut start = 0;
    while let Some(found) = banned.find_at(text, start) {
        let before = text[..found.start()].chars().next_back();
        let after = text[found.end()..].chars().next();
        if !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char) {
            return Some(found.as_str());
        }
        start = found.start() + text[found.start()..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screener() -> Screener {
        let config = ModerationConfig {
            banned_words: vec!["cheat sheet".into(), "leaked".into(), " ".into()],
            ..ModerationConfig::default()
        };
        Screener::from_config(&config).unwrap()
    }

    fn submission<'a>(title: &'a str, description: &'a str) -> Submission<'a> {
        Submission {
            title,
            description,
            file_type: "pdf",
            file_size: 2048,
        }
    }

    #[test]
    fn clean_submission_is_approved() {
        let verdict = screener().screen(&submission(
            "Organic chemistry summary",
            "Reaction mechanisms for chapters four through nine.",
        ));
        assert_eq!(verdict, Verdict::Approve);
    }

    #[test]
    fn banned_words_match_whole_words_case_insensitively() {
        let verdict = screener().screen(&submission(
            "LEAKED final exam",
            "Full answers to the final exam, every question.",
        ));
        assert!(matches!(verdict, Verdict::Reject(reason) if reason.contains("LEAKED")));

        let verdict = screener().screen(&submission(
            "Unleakedness in fluid seals",
            "A study of seals in hydraulic systems and their failure modes.",
        ));
        assert_eq!(verdict, Verdict::Approve);
    }

    #[test]
    fn word_boundaries_respect_non_ascii_letters() {
        let config = ModerationConfig {
            banned_words: vec!["caf".into(), "leaked".into()],
            ..ModerationConfig::default()
        };
        let screener = Screener::from_config(&config).unwrap();
        let description = "Notes on thermodynamics taken in the campus café.";

        let verdict = screener.screen(&submission("Café lecture notes", description));
        assert_eq!(verdict, Verdict::Approve);

        let verdict = screener.screen(&submission("Unleakedé seals", description));
        assert_eq!(verdict, Verdict::Approve);

        let verdict = screener.screen(&submission("Über leaked exam", description));
        assert!(matches!(verdict, Verdict::Reject(reason) if reason.contains("leaked")));

        let verdict = screener.screen(&submission("éleaked then leaked", description));
        assert!(matches!(verdict, Verdict::Reject(_)));
    }

    #[test]
    fn multi_word_terms_are_matched_literally() {
        let verdict = screener().screen(&submission(
            "Statistics",
            "This is the ultimate Cheat Sheet for the midterm exam.",
        ));
        assert!(matches!(verdict, Verdict::Reject(_)));
    }

    #[test]
    fn disallowed_or_oversized_files_are_rejected() {
        let mut s = submission("Notes", "Lecture notes covering the whole semester.");
        s.file_type = "exe";
        assert!(matches!(screener().screen(&s), Verdict::Reject(_)));

        s.file_type = ".PDF";
        s.file_size = ModerationConfig::default().max_file_size_bytes + 1;
        assert!(matches!(screener().screen(&s), Verdict::Reject(_)));

        s.file_size = 0;
        assert!(matches!(screener().screen(&s), Verdict::Reject(_)));
    }

    #[test]
    fn short_descriptions_escalate() {
        let verdict = screener().screen(&submission("Notes", "short"));
        assert!(matches!(verdict, Verdict::Escalate(_)));
    }

    #[test]
    fn empty_word_list_bans_nothing() {
        let screener = Screener::from_config(&ModerationConfig::default()).unwrap();
        assert!(screener.banned.is_none());
    }
}
