pub const EXTRACT_REFERENCES_PROMPT: &str = "Extract the complete reference list from the paper. \
For each reference, output a clean plain-text string that includes: full list of authors, paper title, and year (if available). \
You may include journal or conference name and volume/page information as optional additions. \
The format should be natural and readable, without quotation marks or index numbers. \
Return only a JSON array of strings, with no explanations or extra formatting.";

pub const BASELINE_PROMPT: &str = "You are given the full reference list as a JSON array of strings. \
Select the two references most likely used as baselines (canonical prior work). \
Return only JSON with key baseline_top2, containing exactly two strings copied verbatim from the input array.";

pub const INNOVATION_PROMPT: &str = r#"You are given the full reference list as a JSON array of strings.
Task: Select EXACTLY TWO references that most likely provide the paper's CORE innovative ideas.

Strong preferences:
  - Prefer research articles (journal or conference papers) that introduce a NEW method, system, structure, or theory.
  - Prefer works that are likely directly built upon in the paper (inherited, extended, or combined), i.e. concrete technical bases.
Strict exclusions (DO NOT select):
  - Textbooks (e.g. "Textbook", "Handbook", "Encyclopedia", course lecture notes).
    Papers published in proceedings series such as "Lecture Notes in Computer Science" are research articles, not textbooks.
  - Manuals (e.g. "User Manual", "Reference Manual", "User Guide", "Programming Guide", "Developer Guide").
  - General-purpose user documentation or software guides.
Notes:
  - Do NOT use publication year as a filtering criterion; older but seminal work can still be selected.
  - You MUST avoid choosing any item already selected as baselines.
Output format (MUST follow exactly):
  {"innovation_top2": [<verbatim ref string>, <verbatim ref string>]}
Rules:
  - Each chosen string MUST be copied VERBATIM from the input list (no rewriting, no translation, no reformatting).
  - Choose exactly two items."#;

pub const COMPARE_PROMPT: &str = r#"You are given TWO documents:
  (A) The ORIGINAL/target invention document.
  (B) A PRIOR reference.

Goal: Compare (A) vs (B) at the technical level.
  - 'overlap': concise bullet points describing overlapping technical elements present in BOTH (A) and (B).
  - 'novel': concise bullet points describing elements that appear in (A) but NOT in (B), i.e. A's novel contributions over B.
Keep bullets short (<= 25 words) and specific.
If you are not certain about a point, write 'unclear' instead of guessing.
Return JSON with keys: candidate_title, overlap, novel."#;

pub fn string_array_schema() -> serde_json::Value {
    serde_json::json!({ "type": "array", "items": { "type": "string" } })
}

/// `{ <key>: [string] }` with the key required.
pub fn keyed_list_schema(key: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": { key: { "type": "array", "items": { "type": "string" } } },
        "required": [key],
    })
}

pub fn compare_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "candidate_title": { "type": "string" },
            "overlap": { "type": "array", "items": { "type": "string" } },
            "novel": { "type": "array", "items": { "type": "string" } },
        },
        "required": ["candidate_title", "overlap", "novel"],
    })
}
