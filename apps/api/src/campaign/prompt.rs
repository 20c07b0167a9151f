//! Call script assembly — the first spoken message and the interviewer
//! system prompt handed to the voice assistant.

use crate::campaign::models::{CampaignSpec, Candidate};

/// Used when a job has no configured interview questions.
pub const DEFAULT_QUESTIONS: &[&str] = &[
    "Tell me briefly about your background and current role.",
    "Why are you interested in this position?",
    "What is your notice period and expected availability?",
];

pub const INTERVIEWER_SYSTEM_PREAMBLE: &str = "\
You are a professional phone screening interviewer. \
Be polite, concise and neutral. Ask one question at a time and wait for the \
candidate to finish before moving on. Do not make hiring promises or discuss \
compensation decisions. Close the call by thanking the candidate and telling \
them the team will follow up by email.";

/// First message spoken when the candidate picks up.
pub fn build_first_message(spec: &CampaignSpec, candidate: &Candidate) -> String {
    format!(
        "Hello {}, this is the recruiting assistant calling from {} about the {} position. \
         Is now a good time for a short screening interview?",
        candidate.name, spec.company, spec.job_title
    )
}

/// Assembles the full interviewer system prompt: preamble, role context, the
/// ordered question list (falling back to generic questions) and a textual
/// candidate summary.
pub fn build_system_prompt(spec: &CampaignSpec, candidate: &Candidate) -> String {
    let mut prompt = String::new();
    prompt.push_str(INTERVIEWER_SYSTEM_PREAMBLE);
    prompt.push_str("\n\n");
    prompt.push_str(&format!(
        "You are interviewing for the role of {} at {}.\n\n",
        spec.job_title, spec.company
    ));

    prompt.push_str("Ask the following questions in order:\n");
    if spec.questions.is_empty() {
        for (i, q) in DEFAULT_QUESTIONS.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, q));
        }
    } else {
        for (i, q) in spec.questions.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, q));
        }
    }

    prompt.push_str("\nCandidate profile:\n");
    prompt.push_str(&candidate_summary(candidate));
    prompt
}

fn candidate_summary(candidate: &Candidate) -> String {
    let mut lines = vec![
        format!("Name: {}", candidate.name),
        format!("Email: {}", candidate.email),
        format!("Phone: {}", candidate.phone),
    ];
    if let Some(score) = candidate.score {
        lines.push(format!("Resume screening score: {score}/100"));
    }
    if let Some(experience) = &candidate.experience {
        lines.push(format!("Experience: {experience}"));
    }
    if let Some(education) = &candidate.education {
        lines.push(format!("Education: {education}"));
    }
    if let Some(notes) = &candidate.notes {
        lines.push(format!("Recruiter notes: {notes}"));
    }
    lines.join("\n")
}
