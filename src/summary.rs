use crate::analytics::{AttendanceCounts, BehaviourKind, BehaviourTally};
use std::fmt::Write;

/// Sentinel returned instead of a prompt when the student id resolves to
/// nothing. Callers decide how to surface it.
pub const NO_STUDENT_TEXT: &str = "No student found.";

/// Standing instruction for the downstream summarization service. The
/// service call itself lives behind [`Summarizer`]; this daemon only ships
/// the text.
pub const SYSTEM_INSTRUCTION: &str = "You write a weekly analytical summary of a student from school records. \
Compare THIS WEEK against LAST WEEK using the attendance and behaviour figures supplied. \
Back every statement with the numbers, and quote percentages where useful. \
Call out trends in attendance, behaviour type, and time of day. \
Close with two or three short suggestions tied directly to the trends found. \
Keep the tone professional, supportive and non-judgemental, in no more than ten sentences.";

#[derive(Debug, Clone)]
pub struct StudentIdentity {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: String,
    pub year_group: i64,
    pub mastery_group: String,
}

/// Render the aggregates into the narrative input for the summarization
/// service. Pure interpolation: identical inputs give byte-identical text.
pub fn build_weekly_prompt(
    identity: &StudentIdentity,
    current_attendance: AttendanceCounts,
    prior_attendance: AttendanceCounts,
    current_behaviour: &BehaviourTally,
    prior_behaviour: &BehaviourTally,
    worst_period: Option<u8>,
) -> String {
    let mut text = String::new();

    let _ = writeln!(
        text,
        "Student: {} {} (ID {}), Year {}, Gender: {}, Mastery: {}.",
        identity.first_name,
        identity.last_name,
        identity.id,
        identity.year_group,
        identity.gender,
        identity.mastery_group,
    );
    let _ = writeln!(
        text,
        "Attendance: this week present {}/{}, absent {}, late {}; last week present {}/{}, absent {}, late {}.",
        current_attendance.present,
        current_attendance.total,
        current_attendance.absent,
        current_attendance.late,
        prior_attendance.present,
        prior_attendance.total,
        prior_attendance.absent,
        prior_attendance.late,
    );
    let _ = writeln!(
        text,
        "Behaviour: this week {} events ({}); last week {} events ({}).",
        current_behaviour.total,
        kind_breakdown(current_behaviour),
        prior_behaviour.total,
        kind_breakdown(prior_behaviour),
    );
    if let Some(period) = worst_period {
        let _ = writeln!(
            text,
            "Most behaviour incidents this week fell in period {}.",
            period
        );
    }

    text.push('\n');
    text.push_str(
        "Task:\n\
         Write a weekly summary comparing THIS WEEK with LAST WEEK.\n\
         - Use the numbers above, with percentages.\n\
         - Identify trends in attendance, behaviour type and time of day.\n\
         - Finish with 2-3 brief suggestions tied to those trends.\n\
         - No more than ten sentences, professional and supportive in tone.",
    );
    text
}

fn kind_breakdown(tally: &BehaviourTally) -> String {
    BehaviourKind::TRACKED
        .iter()
        .map(|&kind| format!("{} {}", kind.plural(), tally.kind_count(kind)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The external language-model service, reduced to a text-in/text-out
/// capability so aggregation stays testable offline.
pub trait Summarizer {
    fn summarize(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Default capability: always reports that no backend is configured.
pub struct DisabledSummarizer;

impl Summarizer for DisabledSummarizer {
    fn summarize(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("no summarization backend configured")
    }
}
