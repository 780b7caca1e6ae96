//! Resume loading and light structure extraction
//!
//! The resume arrives as plain text. A `ResumeProfile` keeps that text and
//! whatever sections, skills and experience lines can be picked out of it, so
//! prompts can cite them. Nothing here is written anywhere; the profile lives
//! as long as the session that loaded it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{JobscoutError, Result};

/// Headings recognised as section starts (lowercase, without punctuation)
const SECTION_HEADINGS: &[&str] = &[
    "summary",
    "profile",
    "objective",
    "experience",
    "work experience",
    "professional experience",
    "employment",
    "employment history",
    "education",
    "skills",
    "technical skills",
    "core skills",
    "projects",
    "certifications",
    "publications",
    "awards",
];

/// Upper bound on extracted experience lines handed to prompts
const MAX_EXPERIENCE_ENTRIES: usize = 20;

/// A titled block of resume text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeSection {
    /// Heading as written
    pub name: String,
    /// Body text under the heading
    pub content: String,
}

/// Resume text plus extracted fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeProfile {
    /// Raw text
    pub text: String,
    /// Sections found by heading
    pub sections: Vec<ResumeSection>,
    /// Skills listed under a skills heading
    pub skills: Vec<String>,
    /// Lines listed under an experience heading
    pub experience: Vec<String>,
}

impl ResumeProfile {
    /// Build a profile from raw text
    ///
    /// # Examples
    ///
    /// ```
    /// use jobscout::resume::ResumeProfile;
    ///
    /// let profile = ResumeProfile::from_text("SKILLS\nRust, SQL; Kafka\n");
    /// assert_eq!(profile.skills, vec!["Rust", "SQL", "Kafka"]);
    /// ```
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let sections = extract_sections(&text);

        let skills = sections
            .iter()
            .filter(|s| s.name.to_lowercase().contains("skills"))
            .flat_map(|s| split_skills(&s.content))
            .collect();

        let experience = sections
            .iter()
            .filter(|s| {
                let name = s.name.to_lowercase();
                name.contains("experience") || name.contains("employment")
            })
            .flat_map(|s| s.content.lines())
            .map(|line| strip_bullet(line).to_string())
            .filter(|line| !line.is_empty())
            .take(MAX_EXPERIENCE_ENTRIES)
            .collect();

        Self {
            text,
            sections,
            skills,
            experience,
        }
    }

    /// Load a resume from a plain-text file
    ///
    /// # Errors
    ///
    /// Returns [`JobscoutError::Resume`] if the file cannot be read or is
    /// not valid UTF-8.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            JobscoutError::Resume(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let profile = Self::from_text(text);
        tracing::debug!(
            "Loaded resume from {} ({} sections, {} skills)",
            path.display(),
            profile.sections.len(),
            profile.skills.len()
        );
        Ok(profile)
    }

    /// True when there is no usable text
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Section names and skills in a compact form, for prompts
    pub fn outline(&self) -> String {
        let mut outline = String::new();
        if !self.sections.is_empty() {
            let names: Vec<&str> = self.sections.iter().map(|s| s.name.as_str()).collect();
            outline.push_str(&format!("Sections: {}\n", names.join(", ")));
        }
        if !self.skills.is_empty() {
            outline.push_str(&format!("Skills: {}\n", self.skills.join(", ")));
        }
        outline
    }
}

fn heading_of(line: &str) -> Option<String> {
    let trimmed = line.trim().trim_start_matches('#').trim();
    let bare = trimmed.trim_end_matches(':').trim();
    if bare.is_empty() || bare.len() > 40 {
        return None;
    }
    let lower = bare.to_lowercase();
    if SECTION_HEADINGS.contains(&lower.as_str()) {
        Some(bare.to_string())
    } else {
        None
    }
}

fn extract_sections(text: &str) -> Vec<ResumeSection> {
    let mut sections: Vec<ResumeSection> = Vec::new();
    let mut current: Option<ResumeSection> = None;

    for line in text.lines() {
        if let Some(name) = heading_of(line) {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some(ResumeSection {
                name,
                content: String::new(),
            });
        } else if let Some(section) = current.as_mut() {
            if !section.content.is_empty() {
                section.content.push('\n');
            }
            section.content.push_str(line.trim_end());
        }
    }
    if let Some(section) = current {
        sections.push(section);
    }

    for section in &mut sections {
        section.content = section.content.trim().to_string();
    }
    sections
}

fn strip_bullet(line: &str) -> &str {
    line.trim()
        .trim_start_matches(['-', '*', '•', '·'])
        .trim()
}

fn split_skills(content: &str) -> Vec<String> {
    // Split on list separators but keep things like "C++" and "Node.js" whole
    let separators = Regex::new(r"[,;|•\n]+").ok();
    let parts: Vec<&str> = match &separators {
        Some(re) => re.split(content).collect(),
        None => content.split(',').collect(),
    };
    parts
        .into_iter()
        .map(strip_bullet)
        .map(|s| s.trim_end_matches('.').trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
