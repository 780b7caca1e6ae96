//! Prompts used by the resume capability
//!
//! Both prompts ask for a JSON object so the answer can be parsed into
//! structured tool results.

use crate::resume::ResumeProfile;
use crate::retrieval::JobPosting;

/// Longest description excerpt included per posting in a match prompt
const MATCH_DESCRIPTION_CHARS: usize = 1500;

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

fn resume_block(resume: &ResumeProfile) -> String {
    let outline = resume.outline();
    if outline.is_empty() {
        resume.text.clone()
    } else {
        format!("{}\n{}", outline, resume.text)
    }
}

/// Builds the resume-to-postings ranking prompt
///
/// The model must answer with
/// `{"matches": [{"job_id": "...", "score": 0-100, "rationale": "..."}]}`.
pub fn generate_match_prompt(resume: &ResumeProfile, postings: &[JobPosting]) -> String {
    let jobs = postings
        .iter()
        .map(|p| {
            format!(
                "job_id: {}\ntitle: {}\ncompany: {}\nlocation: {}\ndescription:\n{}",
                p.id,
                p.title,
                p.company,
                p.location,
                excerpt(&p.description, MATCH_DESCRIPTION_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        r#"You are an expert technical recruiter.

Compare the resume below against each job and score how well the candidate fits it, from 0 (no fit) to 100 (ideal fit). Give every job a score and a short rationale naming the strongest match and the biggest gap.

Respond with a JSON object only, in this shape:
{{"matches": [{{"job_id": "<job_id>", "score": <0-100>, "rationale": "<one or two sentences>"}}]}}

Resume:
{resume}

Jobs:
{jobs}
"#,
        resume = resume_block(resume),
        jobs = jobs,
    )
}

/// Builds the resume improvement prompt for one job description
///
/// The model must answer with
/// `{"suggestions": [{"section": "...", "gap": "...", "rewrite": "..."}]}`.
pub fn generate_tweak_prompt(resume: &ResumeProfile, job_title: &str, job_description: &str) -> String {
    let sections = if resume.sections.is_empty() {
        String::new()
    } else {
        let names: Vec<&str> = resume.sections.iter().map(|s| s.name.as_str()).collect();
        format!(
            "Use these section names where they apply: {}.\n",
            names.join(", ")
        )
    };

    format!(
        r#"You are an expert technical recruiter and resume coach.

Suggest concrete edits that bring the resume below closer to the job. For each suggestion name the resume section to change, the gap relative to the job, and a rewrite the candidate could paste in. Only suggest claims the resume already supports.
{sections}
Respond with a JSON object only, in this shape:
{{"suggestions": [{{"section": "<section>", "gap": "<what the job wants that the resume lacks>", "rewrite": "<replacement text>"}}]}}

Resume:
{resume}

Job: {title}
{description}
"#,
        sections = sections,
        resume = resume_block(resume),
        title = job_title,
        description = job_description,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{posting, sample_resume};

    #[test]
    fn test_match_prompt_lists_every_job() {
        let resume = ResumeProfile::from_text(sample_resume());
        let postings = vec![posting("a1", "Data Scientist", 1), posting("b2", "ML Engineer", 2)];
        let prompt = generate_match_prompt(&resume, &postings);
        assert!(prompt.contains("job_id: a1"));
        assert!(prompt.contains("job_id: b2"));
        assert!(prompt.contains("\"matches\""));
        assert!(prompt.contains("Skills:"));
    }

    #[test]
    fn test_match_prompt_truncates_long_descriptions() {
        let resume = ResumeProfile::from_text("Rust");
        let mut p = posting("x", "Dev", 1);
        p.description = "a".repeat(MATCH_DESCRIPTION_CHARS + 50);
        let prompt = generate_match_prompt(&resume, &[p]);
        assert!(prompt.contains("..."));
        assert!(!prompt.contains(&"a".repeat(MATCH_DESCRIPTION_CHARS + 1)));
    }

    #[test]
    fn test_tweak_prompt_names_sections() {
        let resume = ResumeProfile::from_text(sample_resume());
        let prompt = generate_tweak_prompt(&resume, "Data Scientist", "Needs Spark");
        assert!(prompt.contains("Needs Spark"));
        assert!(prompt.contains("Use these section names"));
        assert!(prompt.contains("\"suggestions\""));
    }
}
