use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub const NAMES: &[&str] = &["Xiao-Ming", "Xiao-Hua", "An-An", "Kai-Kai", "Ting-Ting", "A-Hong"];

pub const BACKGROUNDS: &[&str] = &[
    "long-term neglect",
    "witnessed domestic violence",
    "emotionally unstable caregiver",
    "past physical abuse",
];

pub const TRIGGERS: &[&str] = &[
    "being corrected in front of the class",
    "feeling treated unfairly",
    "a noisy environment",
    "being misunderstood",
];

/// Relationship states offered to the educator when setting up a scenario
pub const RELATIONSHIP_OPTIONS: &[&str] = &[
    "first meeting / unfamiliar",
    "building trust",
    "good relationship / reliant",
    "relationship broken/hostile",
    "cold / defensive",
];

pub const GRADES: &[&str] = &["elementary school", "junior high school", "senior high school"];

/// Substituted whenever the caller leaves the recent event blank
pub const NO_SPECIAL_EVENT: &str = "No special event, everyday interaction.";

const UNKNOWN: &str = "Unknown";

/// Dominant stress response of the simulated student
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StressResponse {
    Fight,
    Flight,
    Freeze,
    Fawn,
}

impl StressResponse {
    pub const ALL: [StressResponse; 4] = [
        StressResponse::Fight,
        StressResponse::Flight,
        StressResponse::Freeze,
        StressResponse::Fawn,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StressResponse::Fight => "Fight",
            StressResponse::Flight => "Flight",
            StressResponse::Freeze => "Freeze",
            StressResponse::Fawn => "Fawn",
        }
    }

    /// Observable behaviour the model is asked to act out
    pub fn behaviour(self) -> &'static str {
        match self {
            StressResponse::Fight => "talks back, gets angry",
            StressResponse::Flight => "avoids, tries to leave",
            StressResponse::Freeze => "goes blank, shuts down",
            StressResponse::Fawn => "over-apologizes, people-pleases",
        }
    }

    /// Recognises the mode inside free text such as "Freeze - goes blank"
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        [
            ("flight", StressResponse::Flight),
            ("fight", StressResponse::Fight),
            ("freeze", StressResponse::Freeze),
            ("fawn", StressResponse::Fawn),
        ]
        .into_iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, mode)| mode)
    }
}

impl fmt::Display for StressResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.behaviour())
    }
}

impl TryFrom<String> for StressResponse {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown response mode: {}", value))
    }
}

impl From<StressResponse> for String {
    fn from(value: StressResponse) -> Self {
        value.label().to_string()
    }
}

/// Scenario descriptor for one simulated student.
///
/// Fixed for the lifetime of a conversation. Field names on the wire match
/// the `meta_persona` JSON of exported transcripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaDescriptor {
    pub name: String,
    pub grade: String,
    pub background: String,
    pub trigger: String,
    pub response_mode: StressResponse,
    #[serde(rename = "session_num", default = "default_session_number")]
    pub session_number: u32,
    #[serde(rename = "relation", default = "default_relationship")]
    pub relationship_status: String,
    #[serde(default = "default_recent_event")]
    pub recent_event: String,
}

fn default_session_number() -> u32 {
    1
}

fn default_relationship() -> String {
    UNKNOWN.to_string()
}

fn default_recent_event() -> String {
    NO_SPECIAL_EVENT.to_string()
}

impl PersonaDescriptor {
    /// Recent event as stated to the model; never blank
    pub fn recent_event_or_default(&self) -> &str {
        non_blank_or(&self.recent_event, NO_SPECIAL_EVENT)
    }

    pub fn relationship_or_default(&self) -> &str {
        non_blank_or(&self.relationship_status, UNKNOWN)
    }

    /// One-line scenario description shown to the educator and used as the
    /// header of the remote transcript
    pub fn summary(&self) -> String {
        format!(
            "Scenario: {} ({}) / trigger: {} | session {} / relationship: {} / recent event: {}",
            self.name,
            self.grade,
            self.trigger,
            self.session_number,
            self.relationship_or_default(),
            self.recent_event_or_default()
        )
    }
}

fn non_blank_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

/// Rolls random personas from the fixed pools
pub struct PersonaGenerator<R = StdRng> {
    rng: R,
}

impl PersonaGenerator<StdRng> {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for PersonaGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> PersonaGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Picks name, background, trigger and response mode at random; the
    /// scenario context fields are taken as given.
    pub fn generate(
        &mut self,
        grade: &str,
        session_number: u32,
        relationship_status: &str,
        recent_event: &str,
    ) -> PersonaDescriptor {
        PersonaDescriptor {
            name: pick(&mut self.rng, NAMES),
            grade: grade.to_string(),
            background: pick(&mut self.rng, BACKGROUNDS),
            trigger: pick(&mut self.rng, TRIGGERS),
            response_mode: *StressResponse::ALL
                .choose(&mut self.rng)
                .unwrap_or(&StressResponse::Freeze),
            session_number: session_number.max(1),
            relationship_status: non_blank_or(relationship_status, UNKNOWN).to_string(),
            recent_event: non_blank_or(recent_event, NO_SPECIAL_EVENT).to_string(),
        }
    }
}

fn pick<R: Rng>(rng: &mut R, pool: &[&str]) -> String {
    pool.choose(rng).copied().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_persona() {
        let a = PersonaGenerator::with_rng(StdRng::seed_from_u64(7)).generate(
            "junior high school",
            2,
            "building trust",
            "lost a pet",
        );
        let b = PersonaGenerator::with_rng(StdRng::seed_from_u64(7)).generate(
            "junior high school",
            2,
            "building trust",
            "lost a pet",
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_random_fields_come_from_pools_and_context_is_kept() {
        let mut generator = PersonaGenerator::with_rng(StdRng::seed_from_u64(42));
        for _ in 0..50 {
            let p = generator.generate("senior high school", 3, "cold / defensive", "");
            assert!(NAMES.contains(&p.name.as_str()));
            assert!(BACKGROUNDS.contains(&p.background.as_str()));
            assert!(TRIGGERS.contains(&p.trigger.as_str()));
            assert_eq!(p.grade, "senior high school");
            assert_eq!(p.session_number, 3);
            assert_eq!(p.relationship_status, "cold / defensive");
            assert_eq!(p.recent_event, NO_SPECIAL_EVENT);
        }
    }

    #[test]
    fn test_session_number_is_at_least_one() {
        let p = PersonaGenerator::new().generate("elementary school", 0, "building trust", "x");
        assert_eq!(p.session_number, 1);
    }

    #[test]
    fn test_response_mode_parses_free_text() {
        assert_eq!(StressResponse::parse("Freeze"), Some(StressResponse::Freeze));
        assert_eq!(StressResponse::parse("凍結 (Freeze) - 呆滯"), Some(StressResponse::Freeze));
        assert_eq!(StressResponse::parse("Flight - avoids"), Some(StressResponse::Flight));
        assert_eq!(StressResponse::parse("FIGHT"), Some(StressResponse::Fight));
        assert_eq!(StressResponse::parse("fawn"), Some(StressResponse::Fawn));
        assert_eq!(StressResponse::parse("calm"), None);
    }

    #[test]
    fn test_json_uses_transcript_field_names() {
        let p = PersonaDescriptor {
            name: "An-An".to_string(),
            grade: "elementary school".to_string(),
            background: "long-term neglect".to_string(),
            trigger: "a noisy environment".to_string(),
            response_mode: StressResponse::Fawn,
            session_number: 4,
            relationship_status: "building trust".to_string(),
            recent_event: "moved house".to_string(),
        };

        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["response_mode"], "Fawn");
        assert_eq!(json["session_num"], 4);
        assert_eq!(json["relation"], "building trust");

        let back: PersonaDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_older_json_without_context_fields() {
        let p: PersonaDescriptor = serde_json::from_str(
            r#"{"name": "A-Hong", "grade": "國中", "background": "b", "trigger": "t", "response_mode": "戰 (Fight) - 頂嘴/憤怒"}"#,
        )
        .unwrap();
        assert_eq!(p.response_mode, StressResponse::Fight);
        assert_eq!(p.session_number, 1);
        assert_eq!(p.relationship_status, "Unknown");
        assert_eq!(p.recent_event, NO_SPECIAL_EVENT);
    }

    #[test]
    fn test_summary_never_shows_blank_event() {
        let mut p = PersonaGenerator::with_rng(StdRng::seed_from_u64(1)).generate(
            "elementary school",
            1,
            "building trust",
            "x",
        );
        p.recent_event = "   ".to_string();
        assert!(p.summary().contains(NO_SPECIAL_EVENT));
    }
}
