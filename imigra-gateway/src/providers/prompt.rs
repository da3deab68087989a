//! Prompt assembly for answer generation.

use std::fmt::Write;

use crate::providers::answer::AnswerRequest;
use crate::providers::provider::ChatMessage;

/// Knowledge examples included in one prompt.
const MAX_PROMPT_SNIPPETS: usize = 3;

pub const SYSTEM_PROMPT: &str = "You are an experienced consultant on immigration to Portugal \
(residence visas such as D7 and D2, NIF, NHR taxation, residence permits and citizenship).

Write like a person in a messenger chat: plain paragraphs, no markdown, no headings, no bullet \
lists. Give the direct answer first, then the details. Reply in the language of the client's \
question. Never mention that you are an AI.

Base the answer on the reference material when it is provided. If the information is not \
sufficient, say so honestly instead of inventing facts.

End EVERY reply with a separate line of the form
CONFIDENCE: <number between 0.0 and 1.0>
0.9-1.0 means the answer is confirmed by the reference material, 0.7-0.8 a sound general \
answer, 0.5-0.6 partial certainty, 0.3-0.4 a colleague should check, 0.0-0.2 an expert is needed.";

/// Prior turns as alternating messages, then one user message with the
/// question and the reference material.
pub fn build_messages(request: &AnswerRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.history.len() * 2 + 1);
    for turn in &request.history {
        messages.push(ChatMessage::user(turn.question.clone()));
        messages.push(ChatMessage::assistant(turn.answer.clone()));
    }
    messages.push(ChatMessage::user(render_question(request)));
    messages
}

fn render_question(request: &AnswerRequest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Client question: {}\n", request.question.trim());

    if request.knowledge.is_empty() {
        out.push_str(
            "No similar questions were found in the knowledge base. Answer from general \
             knowledge and be careful with the confidence.\n\n",
        );
    } else {
        out.push_str("Relevant entries from the knowledge base:\n\n");
        for (idx, snippet) in request.knowledge.iter().take(MAX_PROMPT_SNIPPETS).enumerate() {
            let _ = writeln!(
                out,
                "Example {}:\nQuestion: {}\nAnswer: {}\n",
                idx + 1,
                snippet.question,
                snippet.answer
            );
        }
    }

    if let Some(web) = request.web_context.as_deref() {
        let _ = writeln!(out, "Fresh information from a web search:\n{}\n", web);
    }

    out.push_str("Answer the client and finish with the CONFIDENCE line.");
    out
}
