//! The role catalogue: one named agent configuration per pipeline stage.

use crate::completion::RoleSpec;
use crate::tools::ToolRegistry;

/// Stage names as they appear in progress events.
pub const ANALYZER: &str = "Query Analyzer";
pub const CHAT: &str = "Chat Assistant";
pub const PLANNER: &str = "Task Planner";
pub const RESEARCHER: &str = "Researcher";
pub const VISUAL_DECIDER: &str = "Visualizer";
pub const EVALUATOR: &str = "Evaluator";

/// Classifies the user's intent and restates the query.
pub fn analyzer(model: &str) -> RoleSpec {
    RoleSpec {
        name: ANALYZER.to_string(),
        instructions: "You are an expert at interpreting user queries. Decide whether the user \
            wants a quick conversational answer or an in-depth research report. Respond with a \
            JSON object of the form {\"intent\": \"chat\" | \"research\", \"analyzed_query\": \
            \"a clear, self-contained restatement of the user's request\"}. Use the conversation \
            history to resolve pronouns and follow-ups."
            .to_string(),
        model: model.to_string(),
        tools: Vec::new(),
        code_interpreter: false,
        file_search: false,
        json_response: true,
    }
}

/// Answers directly, for queries that do not warrant the research pipeline.
pub fn chat(model: &str) -> RoleSpec {
    RoleSpec {
        name: CHAT.to_string(),
        instructions: "You are a helpful assistant. Answer the user's question directly and \
            concisely, using the conversation history for context."
            .to_string(),
        model: model.to_string(),
        tools: Vec::new(),
        code_interpreter: false,
        file_search: false,
        json_response: false,
    }
}

/// Plans the research. Persists the query first, ingests any attachment.
pub fn planner(model: &str, registry: &ToolRegistry) -> RoleSpec {
    RoleSpec {
        name: PLANNER.to_string(),
        instructions: "You are a meticulous research planner. Your first action is always to \
            store the original user query with the `add_text_to_store` tool. If a file id is \
            provided, next ingest it: use `process_document` for documents or `analyze_image` \
            for images. Then produce a plan for answering the request from the knowledge base \
            and the web. Respond with a JSON object containing a `tasks` list."
            .to_string(),
        model: model.to_string(),
        tools: registry.definitions_for(&[
            "add_text_to_store",
            "process_document",
            "analyze_image",
            "knowledge_query",
        ]),
        code_interpreter: false,
        file_search: false,
        json_response: true,
    }
}

/// Executes the plan and synthesizes a prose report.
pub fn researcher(model: &str, registry: &ToolRegistry) -> RoleSpec {
    RoleSpec {
        name: RESEARCHER.to_string(),
        instructions: "You are a diligent researcher. Execute the given list of tasks to gather \
            information, using `web_search` for current facts and `knowledge_query` for stored \
            context. Synthesize everything you find into a comprehensive research report in \
            prose, citing your sources."
            .to_string(),
        model: model.to_string(),
        tools: registry.definitions_for(&["web_search", "knowledge_query"]),
        code_interpreter: false,
        file_search: false,
        json_response: false,
    }
}

/// Decides whether an illustrative image would add value.
pub fn visual_decider(model: &str) -> RoleSpec {
    RoleSpec {
        name: VISUAL_DECIDER.to_string(),
        instructions: "You are a visualization expert. Review the research report and decide \
            whether one illustrative image would genuinely enhance it. Respond with a JSON \
            object: {\"generate\": true | false, \"prompt\": \"an image-generation prompt\" \
            (only when generate is true), \"summary\": \"one sentence explaining the decision\"}."
            .to_string(),
        model: model.to_string(),
        tools: Vec::new(),
        code_interpreter: false,
        file_search: false,
        json_response: true,
    }
}

/// Assembles the final structured report from the accumulated context.
pub fn evaluator(model: &str) -> RoleSpec {
    RoleSpec {
        name: EVALUATOR.to_string(),
        instructions: "You are a critical evaluator. Assess the accumulated research for \
            completeness, accuracy, and objectivity, then produce the final report. Respond \
            with exactly one JSON object with these fields: `executive_summary` (string), \
            `key_findings` (list of strings), `visuals` (list, leave empty), `conclusion` \
            (string), `references` (list of strings)."
            .to_string(),
        model: model.to_string(),
        tools: Vec::new(),
        code_interpreter: false,
        file_search: false,
        json_response: true,
    }
}
