//! Post-generation contract validation: checks the answer text carries the
//! sections the output contract requires, without altering what is returned
//! to the caller.

/// One missing-section validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// `## Answer` section absent.
    MissingAnswer,
    /// `## Supporting Clauses` section absent (non-refusal only).
    MissingSupportingClauses,
    /// `## Citations` section absent (non-refusal only).
    MissingCitations,
}

impl ValidationError {
    /// Wire-format name for audit records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingAnswer => "missing_answer",
            Self::MissingSupportingClauses => "missing_supporting_clauses",
            Self::MissingCitations => "missing_citations",
        }
    }
}

/// Validates `answer_text` against the output contract for `refused`.
///
/// Missing sections are recorded as errors but `answer_text` is returned to
/// the caller unchanged either way; only the audit record reflects a
/// validation failure.
#[must_use]
pub fn validate(answer_text: &str, refused: bool) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !section_has_content(answer_text, "## Answer") {
        errors.push(ValidationError::MissingAnswer);
    }

    if !refused {
        if !section_has_content(answer_text, "## Supporting Clauses") {
            errors.push(ValidationError::MissingSupportingClauses);
        }
        if !section_has_content(answer_text, "## Citations") {
            errors.push(ValidationError::MissingCitations);
        }
    }

    errors
}

/// Returns whether `heading` appears in `text` and the body between it and
/// the next `##` heading (or end of text) has non-whitespace content.
fn section_has_content(text: &str, heading: &str) -> bool {
    let Some(start) = text.find(heading) else {
        return false;
    };
    let after_heading = &text[start + heading.len()..];
    let body = after_heading.find("##").map_or(after_heading, |next| &after_heading[..next]);
    !body.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusal_requires_only_answer_section() {
        let text = "## Answer\nThis is not addressed in the provided CME documents.";
        assert!(validate(text, true).is_empty());
    }

    #[test]
    fn non_refusal_requires_all_three_sections() {
        let text = "## Answer\nYes.\n## Supporting Clauses\n\"quote\" (doc | s | 1)\n## Citations\ndoc | s | 1";
        assert!(validate(text, false).is_empty());
    }

    #[test]
    fn non_refusal_missing_citations_is_an_error() {
        let text = "## Answer\nYes.\n## Supporting Clauses\n\"quote\"";
        let errors = validate(text, false);
        assert_eq!(errors, vec![ValidationError::MissingCitations]);
    }

    #[test]
    fn missing_answer_section_is_always_an_error() {
        let text = "## Supporting Clauses\nfoo\n## Citations\nbar";
        let errors = validate(text, false);
        assert!(errors.contains(&ValidationError::MissingAnswer));
    }

    #[test]
    fn empty_section_bodies_are_errors_even_though_headings_are_present() {
        let text = "## Answer\nYes.\n## Supporting Clauses\n## Citations\n";
        let errors = validate(text, false);
        assert_eq!(errors, vec![ValidationError::MissingSupportingClauses, ValidationError::MissingCitations]);
    }
}
