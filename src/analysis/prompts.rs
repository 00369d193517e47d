//! Prompt construction for the three LLM exchanges.

/// System framing for the workflow-generation exchange.
pub(crate) const WORKFLOW_SYSTEM: &str = "You translate analysis questions into JSON state \
machines. Answer with a single JSON object and nothing else.";

/// System framing for the final rendering exchange.
pub(crate) const RENDER_SYSTEM: &str = "You are a market analysis assistant. Answer the user's \
question using only the collected data you are given. Be concise and concrete.";

/// Reply used when the relevance gate rejects a question.
pub(crate) const OFF_TOPIC_REPLY: &str = "I can only help with questions about cryptocurrency \
markets, prices, and related news.";

pub(crate) fn relevance_prompt(question: &str) -> String {
    format!(
        "Is the following message a question about cryptocurrency markets, prices, trading, or \
         related news? Answer with exactly 'yes' or 'no'.\n\nMessage: {question}"
    )
}

pub(crate) fn workflow_prompt(question: &str, metadata: &str) -> String {
    format!(
        "Design a workflow that gathers the data needed to answer the question below, expressed \
         as an Amazon-States-Language JSON state machine.\n\
         \n\
         Rules:\n\
         - The machine is an object with \"StartAt\" and \"States\".\n\
         - Allowed state types: Pass, Task, Choice, Wait, Succeed, Fail, Map, Parallel.\n\
         - Task states set \"Resource\" to a method name from the catalog below, and pass \
           arguments through \"Parameters\". A key ending in \".$\" takes a path into the data \
           flowing through the machine (for example \"date.$\": \"$.Today\").\n\
         - Arguments are matched to parameters in the order they are written.\n\
         - Record every piece of data needed for the answer by calling RecordOutput.\n\
         - Finish with a state that has \"End\": true.\n\
         \n\
         Method catalog:\n{metadata}\n\
         \n\
         Question: {question}\n\
         \n\
         Answer with the JSON state machine only."
    )
}

pub(crate) fn final_prompt(question: &str, collected: &str) -> String {
    format!(
        "Collected data:\n{collected}\n\nUsing the collected data above, answer this question:\n\
         {question}"
    )
}

/// Pulls the JSON body out of a completion, tolerating code fences and
/// surrounding prose.
pub(crate) fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();
    if let Some(fenced) = trimmed
        .split_once("```json")
        .or_else(|| trimmed.split_once("```"))
        .and_then(|(_, rest)| rest.split_once("```"))
        .map(|(body, _)| body.trim())
    {
        return fenced;
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}
