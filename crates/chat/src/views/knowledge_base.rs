//! Help desk content: FAQ entries and free-form training snippets
//!
//! Held locally until the backend grows a table for it.

use crate::error::InvalidInputError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaqEntry {
    pub id: u64,
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingEntry {
    pub id: u64,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    faqs: Vec<FaqEntry>,
    training: Vec<TrainingEntry>,
    next_id: u64,
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starter content shown to new accounts
    pub fn with_samples() -> Self {
        let mut kb = Self::new();
        let samples = [
            ("What are your business hours?", "We're open Monday to Friday, 9 AM to 5 PM."),
            ("How can I contact support?", "You can reach us at support@example.com"),
        ];
        for (question, answer) in samples {
            let _ = kb.add_faq(question, answer);
        }
        for content in [
            "The company was founded in 2020 and specializes in AI solutions.",
            "Our product pricing starts at $99/month for the basic plan.",
        ] {
            let _ = kb.add_training(content);
        }
        kb
    }

    pub fn faqs(&self) -> &[FaqEntry] {
        &self.faqs
    }

    pub fn training(&self) -> &[TrainingEntry] {
        &self.training
    }

    /// Add a question/answer pair; both are trimmed and required
    pub fn add_faq(&mut self, question: &str, answer: &str) -> Result<&FaqEntry, InvalidInputError> {
        let (question, answer) = (question.trim(), answer.trim());
        if question.is_empty() || answer.is_empty() {
            return Err(InvalidInputError::new("Both question and answer are required"));
        }
        let id = self.allocate_id();
        self.faqs.push(FaqEntry {
            id,
            question: question.to_string(),
            answer: answer.to_string(),
        });
        Ok(&self.faqs[self.faqs.len() - 1])
    }

    /// Returns false if no entry had that id
    pub fn delete_faq(&mut self, id: u64) -> bool {
        let before = self.faqs.len();
        self.faqs.retain(|f| f.id != id);
        self.faqs.len() != before
    }

    /// Entries whose question or answer contains `query`, ignoring case
    pub fn search_faqs(&self, query: &str) -> Vec<&FaqEntry> {
        self.faqs
            .iter()
            .filter(|f| contains_ignore_case(&f.question, query) || contains_ignore_case(&f.answer, query))
            .collect()
    }

    pub fn add_training(&mut self, content: &str) -> Result<&TrainingEntry, InvalidInputError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(InvalidInputError::new("Training data cannot be empty"));
        }
        let id = self.allocate_id();
        self.training.push(TrainingEntry {
            id,
            content: content.to_string(),
        });
        Ok(&self.training[self.training.len() - 1])
    }

    pub fn delete_training(&mut self, id: u64) -> bool {
        let before = self.training.len();
        self.training.retain(|t| t.id != id);
        self.training.len() != before
    }

    pub fn search_training(&self, query: &str) -> Vec<&TrainingEntry> {
        self.training
            .iter()
            .filter(|t| contains_ignore_case(&t.content, query))
            .collect()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_faq_requires_both_fields() {
        let mut kb = KnowledgeBase::new();
        let err = kb.add_faq("  ", "answer").unwrap_err();
        assert_eq!(err.to_string(), "Both question and answer are required");
        assert!(kb.add_faq("question", "\n").is_err());

        let entry = kb.add_faq("  Do you ship abroad? ", " Yes ").unwrap();
        assert_eq!(entry.question, "Do you ship abroad?");
        assert_eq!(entry.answer, "Yes");
        assert_eq!(kb.faqs().len(), 1);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let kb = KnowledgeBase::with_samples();
        let hits = kb.search_faqs("SUPPORT");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].question, "How can I contact support?");

        assert_eq!(kb.search_faqs("").len(), 2);
        assert_eq!(kb.search_training("pricing").len(), 1);
    }

    #[test]
    fn test_delete_entries() {
        let mut kb = KnowledgeBase::with_samples();
        let faq = kb.faqs()[0].id;
        assert!(kb.delete_faq(faq));
        assert!(!kb.delete_faq(faq));
        assert_eq!(kb.faqs().len(), 1);

        let training = kb.training()[1].id;
        assert!(kb.delete_training(training));
        assert_eq!(kb.training().len(), 1);
        assert!(kb.add_training("   ").is_err());
    }
}
