//! Prompt templates used across the engine.
//!
//! Specialist instructions live on their [`AgentSpec`](crate::catalog::AgentSpec)s;
//! this module holds the cross-cutting templates: the tool-calling
//! preamble every ReAct specialist gets, the decomposer and architect
//! JSON contracts, and the quality pipeline's style/critic/rewrite
//! prompts with their few-shot pairs.

use crate::catalog::Domain;

/// Tool-calling contract appended to every specialist system prompt.
pub const TOOL_PROTOCOL: &str = "\
To use a tool, emit exactly:
<tool_call>{\"tool\":\"<name>\",\"args\":{...}}</tool_call>
You may emit several tool_call blocks in one turn; they run in order.
Tool results come back in <tool_result> blocks on the next turn.
When you are done, answer in plain text with no tool_call block.";

/// System prompt for the decomposer's single JSON-only call.
#[must_use]
pub fn decomposer_system(max_tasks: usize) -> String {
    let domains = Domain::builtin()
        .iter()
        .map(Domain::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You decompose an engineering goal into sub-tasks for domain \
         specialists.\n\
         Available domains: {domains}.\n\
         Respond with pure JSON only — no prose, no code fences:\n\
         {{\"tasks\":[{{\"id\":\"t1\",\"title\":\"...\",\"description\":\"...\",\
         \"domain\":\"coder\",\"dependencies\":[],\"complexity\":3,\
         \"priority\":50,\"relevant_files\":[]}}]}}\n\
         Rules: at most {max_tasks} tasks; ids unique; dependencies refer \
         to earlier task ids only; complexity is 1-5; no two tasks may \
         write the same file.",
    )
}

/// System prompt for the architect's single JSON-only call.
pub const ARCHITECT_SYSTEM: &str = "\
You are the architect for a new application. Respond with pure JSON only:
{\"name\":\"...\",\"description\":\"...\",\"features\":[\"...\"],
 \"tech_stack\":{\"frontend\":\"...\",\"styling\":\"...\",\"backend\":\"...\",
 \"database\":\"...\",\"orm\":\"...\",\"auth\":\"...\",\"deployment\":\"...\"},
 \"directory_structure\":[\"...\"],\"api_contracts\":[\"METHOD /path - purpose\"],
 \"data_models\":[\"Model: field list\"],\"component_tree\":[\"...\"],
 \"env_vars\":[\"NAME\"],\"integrations\":[\"...\"]}
Use \"none\" for tech_stack.backend when the app needs no server.";

/// Style prompt for quality-pipeline candidate generation.
pub const CODE_STYLE_SYSTEM: &str = "\
You write production-quality, self-contained code on request.
Structure every answer in exactly four parts:
One-line summary: <what the code does>
A single fenced code block with the implementation.
Tests: a fenced code block with focused tests.
Notes: a short bullet list of caveats and decisions.
No step-by-step narration. No extra code blocks.";

/// Few-shot (user, assistant) pairs demonstrating the 4-part shape.
#[must_use]
pub fn code_few_shot() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "Write a function that clamps a number to a range",
            "One-line summary: Clamp a number into [lo, hi].\n\n\
             ```ts\nexport function clamp(n: number, lo: number, hi: number): number {\n  \
             return Math.min(hi, Math.max(lo, n));\n}\n```\n\n\
             Tests:\n```ts\nimport { clamp } from \"./clamp\";\n\n\
             test(\"inside range\", () => expect(clamp(5, 0, 10)).toBe(5));\n\
             test(\"below\", () => expect(clamp(-1, 0, 10)).toBe(0));\n\
             test(\"above\", () => expect(clamp(11, 0, 10)).toBe(10));\n```\n\n\
             Notes:\n- Assumes lo <= hi; callers own that invariant.",
        ),
        (
            "Write a function that retries an async operation",
            "One-line summary: Retry an async function with exponential backoff.\n\n\
             ```ts\nexport async function retry<T>(fn: () => Promise<T>, attempts = 3, baseMs = 100): Promise<T> {\n  \
             let lastErr: unknown;\n  for (let i = 0; i < attempts; i++) {\n    \
             try {\n      return await fn();\n    } catch (err) {\n      lastErr = err;\n      \
             await new Promise((r) => setTimeout(r, baseMs * 2 ** i));\n    }\n  }\n  \
             throw lastErr;\n}\n```\n\n\
             Tests:\n```ts\ntest(\"succeeds after two failures\", async () => {\n  \
             let calls = 0;\n  const result = await retry(async () => {\n    \
             if (++calls < 3) throw new Error(\"boom\");\n    return \"ok\";\n  });\n  \
             expect(result).toBe(\"ok\");\n  expect(calls).toBe(3);\n});\n```\n\n\
             Notes:\n- Backoff doubles per attempt; no jitter.\n- The last error is rethrown verbatim.",
        ),
    ]
}

/// Critic prompt asking for a JSON score.
#[must_use]
pub fn critic_system() -> String {
    "You judge one code answer for correctness, completeness, and safety. \
     Respond with pure JSON only: {\"score\": <0-100 integer>, \"reason\": \"...\"}"
        .to_owned()
}

/// Rewrite prompt enforcing the 4-part structure.
pub const REWRITE_SYSTEM: &str = "\
Rewrite the given answer so it follows exactly this structure, preserving
the functionality of the code:
One-line summary: ...
A single fenced code block with the implementation.
Tests: a fenced code block with tests.
Notes: a short bullet list.
Fix structural problems only; do not redesign the solution.";

/// Assemble a specialist's full system prompt.
#[must_use]
pub fn specialist_system(
    display_name: &str,
    instructions: &str,
    tool_descriptions: &str,
    workspace_context: Option<&str>,
) -> String {
    let mut prompt = format!("You are {display_name}.\n\n{instructions}");
    if !tool_descriptions.is_empty() {
        prompt.push_str("\n\nAvailable tools:\n");
        prompt.push_str(tool_descriptions);
        prompt.push('\n');
        prompt.push_str(TOOL_PROTOCOL);
    }
    if let Some(context) = workspace_context
        && !context.is_empty()
    {
        prompt.push_str("\n\n");
        prompt.push_str(context);
    }
    prompt
}
