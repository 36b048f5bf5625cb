use crate::models::RetrievedChunk;
use regex::Regex;

pub const RAG_PROMPT_TEMPLATE: &str = "\
<|start_header_id|>system<|end_header_id|>
You are a helpful assistant. You answer user questions based on provided context. If you can't answer the question with the provided context, say you don't know.<|eot_id|>

<|start_header_id|>user<|end_header_id|>
User Query:
{query}

Context:
{context}<|eot_id|>

<|start_header_id|>assistant<|end_header_id|>
";

/// Placed between retrieved chunk texts in the `{context}` slot.
pub const CONTEXT_DELIMITER: &str = "\n\n";

const QUERY_SLOT: &str = "{query}";
const CONTEXT_SLOT: &str = "{context}";

/// Renders the chat template. Substitution is a single pass, so slot markers or
/// braces inside the query or document text are inserted literally.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    control_token: Regex,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            control_token: Regex::new(r"<\|[a-z_]+\|>").expect("control token pattern is valid"),
        }
    }

    pub fn render(&self, query: &str, context: &[RetrievedChunk]) -> String {
        let context = context
            .iter()
            .map(|retrieved| self.strip_control_tokens(&retrieved.chunk.text))
            .collect::<Vec<_>>()
            .join(CONTEXT_DELIMITER);
        let query = self.strip_control_tokens(query);

        let (before_query, rest) = RAG_PROMPT_TEMPLATE
            .split_once(QUERY_SLOT)
            .unwrap_or((RAG_PROMPT_TEMPLATE, ""));
        let (between, after_context) = rest.split_once(CONTEXT_SLOT).unwrap_or((rest, ""));

        let mut prompt = String::with_capacity(
            RAG_PROMPT_TEMPLATE.len() + query.len() + context.len(),
        );
        prompt.push_str(before_query);
        prompt.push_str(&query);
        prompt.push_str(between);
        prompt.push_str(&context);
        prompt.push_str(after_context);
        prompt
    }

    /// Removes chat-format control tokens so document text cannot open a new turn.
    fn strip_control_tokens(&self, text: &str) -> String {
        self.control_token.replace_all(text, "").into_owned()
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}
