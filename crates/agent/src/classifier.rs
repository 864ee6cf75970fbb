//! Table-driven keyword classification for short replies.
//!
//! Matching is done on whole lower-cased tokens, never substrings, so
//! "incorrect" does not count as "correct". Multi-word phrases match as a
//! contiguous run of tokens.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmationReply {
    Affirmative,
    Negative,
    Cancel,
}

/// Phrase lists driving the classifier. Swap the table to change locale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeywordTable {
    pub affirmative: Vec<String>,
    pub negative: Vec<String>,
    pub cancel: Vec<String>,
    pub decline: Vec<String>,
    pub create_cues: Vec<String>,
}

impl KeywordTable {
    pub fn english() -> Self {
        Self {
            affirmative: phrases(&["yes", "correct", "right", "sure", "okay", "fine"]),
            negative: phrases(&["no", "incorrect", "wrong", "cancel"]),
            cancel: phrases(&["cancel", "never mind", "nevermind", "stop", "forget it"]),
            decline: phrases(&[
                "no",
                "none",
                "skip",
                "nope",
                "no guests",
                "no description",
                "nothing",
            ]),
            create_cues: phrases(&["create", "schedule", "new event"]),
        }
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        Self::english()
    }
}

fn phrases(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[derive(Clone, Debug, Default)]
pub struct KeywordClassifier {
    table: KeywordTable,
}

impl KeywordClassifier {
    pub fn new(table: KeywordTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &KeywordTable {
        &self.table
    }

    /// Classifies a reply to "Shall I create this event?".
    ///
    /// Returns `None` when the reply carries no confirmation keyword at all,
    /// in which case it should be treated as new event content.
    pub fn confirmation(&self, message: &str) -> Option<ConfirmationReply> {
        let tokens = tokenize(message);
        if contains_phrase(&tokens, "cancel") {
            return Some(ConfirmationReply::Cancel);
        }
        if contains_any(&tokens, &self.table.negative) {
            return Some(ConfirmationReply::Negative);
        }
        if contains_any(&tokens, &self.table.affirmative) {
            return Some(ConfirmationReply::Affirmative);
        }
        None
    }

    pub fn is_create_request(&self, message: &str) -> bool {
        contains_any(&tokenize(message), &self.table.create_cues)
    }

    /// A reply that abandons the draft. The phrase must lead the reply, so an
    /// answer like "bus stop inspection" is still content.
    pub fn is_cancel(&self, message: &str) -> bool {
        let tokens = tokenize(message);
        self.table.cancel.iter().any(|phrase| starts_with_phrase(&tokens, phrase))
    }

    /// A reply that turns down an optional question.
    ///
    /// The reply must open with a decline phrase and carry no address, so
    /// "no, invite bob@example.com" is treated as content.
    pub fn is_decline(&self, message: &str) -> bool {
        if message.contains('@') {
            return false;
        }
        let tokens = tokenize(message);
        self.table.decline.iter().any(|phrase| starts_with_phrase(&tokens, phrase))
    }
}

fn tokenize(message: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(message.len());
    for character in message.chars() {
        if character.is_alphanumeric() || character == '\'' {
            sanitized.extend(character.to_lowercase());
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

fn contains_any(tokens: &[String], phrases: &[String]) -> bool {
    phrases.iter().any(|phrase| contains_phrase(tokens, phrase))
}

fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let words = phrase.split_whitespace().collect::<Vec<_>>();
    if words.is_empty() || words.len() > tokens.len() {
        return false;
    }
    tokens.windows(words.len()).any(|window| window.iter().zip(&words).all(|(a, b)| a == b))
}

fn starts_with_phrase(tokens: &[String], phrase: &str) -> bool {
    let words = phrase.split_whitespace().collect::<Vec<_>>();
    !words.is_empty()
        && words.len() <= tokens.len()
        && tokens.iter().zip(&words).all(|(token, word)| token == word)
}

#[cfg(test)]
mod tests {
    use super::{ConfirmationReply, KeywordClassifier};

    #[test]
    fn confirmation_replies_are_classified_by_whole_words() {
        let classifier = KeywordClassifier::default();

        for reply in ["yes", "Yes please!", "that's correct", "sure", "okay, go ahead", "fine"] {
            assert_eq!(
                classifier.confirmation(reply),
                Some(ConfirmationReply::Affirmative),
                "{reply}"
            );
        }
        for reply in ["no", "incorrect", "that's wrong", "No, that's not right"] {
            assert_eq!(
                classifier.confirmation(reply),
                Some(ConfirmationReply::Negative),
                "{reply}"
            );
        }
        assert_eq!(classifier.confirmation("cancel it"), Some(ConfirmationReply::Cancel));
        assert_eq!(
            classifier.confirmation("yes... actually cancel"),
            Some(ConfirmationReply::Cancel)
        );
    }

    #[test]
    fn substrings_do_not_match() {
        let classifier = KeywordClassifier::default();
        assert_eq!(classifier.confirmation("actually make it 4pm"), None);
        assert_eq!(classifier.confirmation("yesterday"), None);
        assert_eq!(classifier.confirmation("bring snow boots"), None);
        assert!(!classifier.is_create_request("recreate the vibe"));
    }

    #[test]
    fn create_cues_and_cancel_phrases() {
        let classifier = KeywordClassifier::default();
        assert!(classifier.is_create_request("Schedule a meeting tomorrow at 3pm"));
        assert!(classifier.is_create_request("add a new event"));
        assert!(!classifier.is_create_request("what's on my calendar"));

        assert!(classifier.is_cancel("never mind"));
        assert!(classifier.is_cancel("Forget it."));
        assert!(!classifier.is_cancel("forget"));
        assert!(classifier.is_cancel("stop, I'll do it later"));
        assert!(!classifier.is_cancel("Bus stop inspection"));
        assert!(!classifier.is_cancel("decide whether to cancel the vendor contract"));
    }

    #[test]
    fn decline_must_lead_the_reply_and_carry_no_address() {
        let classifier = KeywordClassifier::default();
        assert!(classifier.is_decline("no guests"));
        assert!(classifier.is_decline("Nope"));
        assert!(classifier.is_decline("skip that"));
        assert!(!classifier.is_decline("no, invite alice@example.com"));
        assert!(!classifier.is_decline("Quarterly goals, nothing fancy"));
    }
}
