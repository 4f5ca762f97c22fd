use docqa_core::types::RetrievedChunk;

const INSTRUCTIONS: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// "Stuff" prompt: every retrieved chunk, most similar first, followed by the question.
pub fn compose_prompt(question: &str, retrieved: &[RetrievedChunk]) -> String {
    let context = retrieved.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join("\n\n");
    format!("{INSTRUCTIONS}\n\n{context}\n\nQuestion: {question}\nHelpful Answer:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::types::Chunk;

    fn hit(text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk { document_id: "d".into(), sequence: 0, text: text.into(), metadata: Default::default() },
            score,
        }
    }

    #[test]
    fn context_keeps_retrieval_order() {
        let prompt = compose_prompt("Who is it?", &[hit("first passage", 0.9), hit("second passage", 0.5)]);
        let first = prompt.find("first passage").unwrap();
        let second = prompt.find("second passage").unwrap();
        assert!(first < second);
        assert!(prompt.contains("first passage\n\nsecond passage"));
        assert!(prompt.ends_with("Question: Who is it?\nHelpful Answer:"));
        assert!(prompt.starts_with("Use the following pieces of context"));
    }

    #[test]
    fn no_context_still_asks_the_question() {
        let prompt = compose_prompt("Anything?", &[]);
        assert!(prompt.contains("\n\n\n\nQuestion: Anything?"));
    }
}
