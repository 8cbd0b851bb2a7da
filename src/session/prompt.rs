//! Prompt construction
//!
//! Exactly two prompt shapes exist: a context block followed by the question
//! when document context is present, and a bare user/assistant turn
//! otherwise.

/// Join extracted document texts into one context block.
pub fn build_context(documents: &[String]) -> String {
    documents
        .iter()
        .map(|doc| format!("Document: {doc}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the full prompt for one turn.
pub fn build_prompt(documents: &[String], message: &str) -> String {
    let context = build_context(documents);
    if context.is_empty() {
        format!("User: {message}\nAssistant:")
    } else {
        format!(
            "Context information:\n{context}\n\nUser question: {message}\n\n\
             Please provide a helpful response based on the context and your knowledge:"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_prompt_shape() {
        assert_eq!(build_prompt(&[], "hi"), "User: hi\nAssistant:");
    }

    #[test]
    fn test_context_prompt_shape() {
        let documents = vec!["alpha".to_string(), "beta".to_string()];
        let prompt = build_prompt(&documents, "what?");
        assert_eq!(
            prompt,
            "Context information:\nDocument: alpha\nDocument: beta\n\n\
             User question: what?\n\n\
             Please provide a helpful response based on the context and your knowledge:"
        );
    }

    #[test]
    fn test_empty_documents_use_bare_shape() {
        // No documents means the bare shape; a present-but-empty document
        // still selects the context shape.
        assert!(build_prompt(&[], "q").starts_with("User: "));
        let one_empty = vec![String::new()];
        assert!(build_prompt(&one_empty, "q").starts_with("Context information:"));
    }
}
