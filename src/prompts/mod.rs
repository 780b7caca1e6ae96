//! Prompts sent to the reasoning engine
//!
//! The coordinator's system prompt lives in `system_prompt`; the JSON-answer
//! prompts the resume capability uses live in `resume_prompt`.

pub mod resume_prompt;
pub mod system_prompt;

pub use resume_prompt::{generate_match_prompt, generate_tweak_prompt};
pub use system_prompt::generate_system_prompt;

/// Builds the system prompt for a session
///
/// # Examples
///
/// ```
/// use jobscout::prompts::build_system_prompt;
///
/// let prompt = build_system_prompt(false);
/// assert!(prompt.contains("job search assistant"));
/// ```
pub fn build_system_prompt(has_resume: bool) -> String {
    generate_system_prompt(has_resume)
}
