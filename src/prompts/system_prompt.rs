//! Coordinator system prompt
//!
//! Every conversation context sent to the model starts with this prompt. It
//! introduces the assistant's role and the three capabilities it can call.

use crate::tools::{TOOL_MATCH_JOB_TO_RESUME, TOOL_SEARCH_JOBS, TOOL_SUGGEST_RESUME_TWEAKS};

/// Generates the recruiter-assistant system prompt
///
/// The resume note tells the model whether resume capabilities can do
/// anything useful in this session, so it can ask for a resume instead of
/// calling them blindly.
///
/// # Arguments
///
/// * `has_resume` - Whether the session has a non-empty resume loaded
///
/// # Examples
///
/// ```
/// use jobscout::prompts::system_prompt::generate_system_prompt;
///
/// let prompt = generate_system_prompt(true);
/// assert!(prompt.contains("search_jobs"));
/// ```
pub fn generate_system_prompt(has_resume: bool) -> String {
    let resume_note = if has_resume {
        "The user's resume is loaded. Resume tools can compare it against postings."
    } else {
        "No resume is loaded. If the user asks for resume help, ask them to load one with /resume PATH before calling resume tools."
    };

    format!(
        r#"You are a helpful job search assistant. You help the user find relevant job postings, judge which postings fit their resume, and improve their resume for a specific job.

TOOLS:
- {search}: query the job database with a natural-language description. Pass structured filters (location, experience_level, remote, min_salary, posted_within_days) only when the user states them.
- {matcher}: rank postings against the user's resume. With no job_ids it uses the postings from the most recent search.
- {tweaks}: suggest concrete resume edits for one posting, given its job_id or a pasted job_description.

{resume_note}

GUIDELINES:
- Call at most one tool per step and wait for its result.
- If a search returns no matches, say so plainly and suggest broadening the query.
- When presenting postings, include title, company, location and the link.
- When ranking, name the best-fitting posting first and explain why in a sentence or two.
- If a tool returns an error, explain the problem to the user or try a corrected call.
- Answer general career questions directly without calling tools.
"#,
        search = TOOL_SEARCH_JOBS,
        matcher = TOOL_MATCH_JOB_TO_RESUME,
        tweaks = TOOL_SUGGEST_RESUME_TWEAKS,
        resume_note = resume_note,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_names_every_tool() {
        let prompt = generate_system_prompt(true);
        assert!(prompt.contains(TOOL_SEARCH_JOBS));
        assert!(prompt.contains(TOOL_MATCH_JOB_TO_RESUME));
        assert!(prompt.contains(TOOL_SUGGEST_RESUME_TWEAKS));
    }

    #[test]
    fn test_prompt_mentions_missing_resume() {
        assert!(generate_system_prompt(false).contains("No resume is loaded"));
        assert!(!generate_system_prompt(true).contains("No resume is loaded"));
    }
}
