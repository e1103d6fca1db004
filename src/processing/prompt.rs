//! Grounded prompt assembly.

use crate::index::RetrievedChunk;

/// Answer used when the completion provider returns no text.
pub const NO_ANSWER_PLACEHOLDER: &str = "No answer found.";
/// Context entry used when retrieval produced nothing.
pub const NO_CONTEXT_PLACEHOLDER: &str = "No context available.";

const PREAMBLE: &str = "Answer the question based on the provided context only.
Please provide the most accurate response based on the question.

Context:
";
const QUESTION_LABEL: &str = "\n\nQuestion: ";
const ANSWER_LABEL: &str = "\n\nAnswer:";

/// Render the grounded prompt for a question and its retrieved chunks.
///
/// Chunk texts are inserted verbatim, separated by a blank line. Inserted text is never
/// rescanned, so braces in PDF text or in the question pass through untouched.
pub fn build_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|retrieved| retrieved.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{PREAMBLE}{context}{QUESTION_LABEL}{question}{ANSWER_LABEL}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::TextChunk;

    fn retrieved(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: TextChunk {
                text: text.into(),
                source: "data/sample.pdf".into(),
                page: 0,
            },
            score: 0.5,
        }
    }

    #[test]
    fn prompt_keeps_grounding_instruction_and_sections() {
        let prompt = build_prompt(
            "What color is the sky?",
            &[retrieved("The sky is blue."), retrieved("Grass is green.")],
        );

        assert!(prompt.starts_with("Answer the question based on the provided context only.\n"));
        assert!(prompt.contains(
            "Context:\nThe sky is blue.\n\nGrass is green.\n\nQuestion: What color is the sky?\n\nAnswer:"
        ));
    }

    #[test]
    fn braces_in_chunk_text_do_not_capture_the_question() {
        let prompt = build_prompt(
            "What color is the sky?",
            &[retrieved("Use {input} to bind the form."), retrieved("See {context} above.")],
        );

        assert!(prompt.contains(
            "Context:\nUse {input} to bind the form.\n\nSee {context} above.\n\n"
        ));
        assert!(prompt.ends_with("Question: What color is the sky?\n\nAnswer:"));
        assert_eq!(prompt.matches("What color is the sky?").count(), 1);
    }

    #[test]
    fn braces_in_question_are_kept_verbatim() {
        let prompt = build_prompt("what is {context}?", &[retrieved("The sky is blue.")]);
        assert!(prompt.contains("Context:\nThe sky is blue.\n\nQuestion: what is {context}?"));
    }
}
