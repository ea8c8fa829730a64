use chrono::{DateTime, Utc};
use tracing::debug;

use crate::conversation::{Role, Turn};
use crate::error::{SimulatorError, SimulatorResult};
use crate::persona::PersonaDescriptor;

/// Column order of an exported transcript
pub const COLUMNS: [&str; 5] = ["role", "content", "nickname", "time", "meta_persona"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything a transcript file carries
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedSnapshot {
    pub persona: PersonaDescriptor,
    pub turns: Vec<Turn>,
    /// Nickname of the exporting user, when the file had one
    pub user_id: Option<String>,
}

/// Default file name for an export
pub fn export_file_name(user_id: &str, persona: &PersonaDescriptor) -> String {
    format!("simulator_{}_{}.csv", sanitize(user_id), sanitize(&persona.name))
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Writes the transcript as CSV with a leading BOM.
///
/// The persona is serialized once, into the first row. All rows share
/// `updated_at` as their time so that exporting an unchanged session twice
/// gives the same bytes.
pub fn export_csv(
    user_id: &str,
    persona: &PersonaDescriptor,
    turns: &[Turn],
    updated_at: DateTime<Utc>,
) -> SimulatorResult<Vec<u8>> {
    let persona_json = serde_json::to_string(persona)
        .map_err(|e| SimulatorError::InvalidSnapshot(format!("persona not serializable: {}", e)))?;
    let time = updated_at.format(TIME_FORMAT).to_string();

    let mut buffer = UTF8_BOM.to_vec();
    {
        let mut writer = csv::Writer::from_writer(&mut buffer);
        writer.write_record(COLUMNS)?;
        for (i, turn) in turns.iter().enumerate() {
            let meta = if i == 0 { persona_json.as_str() } else { "" };
            writer.write_record([
                turn.role.export_label(),
                turn.text.as_str(),
                user_id,
                time.as_str(),
                meta,
            ])?;
        }
        writer.flush()?;
    }

    debug!(turns = turns.len(), bytes = buffer.len(), "Exported transcript");
    Ok(buffer)
}

/// Parses an exported transcript.
///
/// Fails with `MissingPersonaMetadata` when there is no `meta_persona`
/// column, no non-empty cell in it, or the cell is not a persona.
pub fn import_csv(bytes: &[u8]) -> SimulatorResult<ImportedSnapshot> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);

    let headers = reader.headers()?.clone();
    let column = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };

    let meta_col = column(&["meta_persona", "metaPersona"]).ok_or_else(|| {
        SimulatorError::MissingPersonaMetadata("no meta_persona column".to_string())
    })?;
    let role_col = column(&["role"])
        .ok_or_else(|| SimulatorError::InvalidSnapshot("no role column".to_string()))?;
    let content_col = column(&["content"])
        .ok_or_else(|| SimulatorError::InvalidSnapshot("no content column".to_string()))?;
    let nickname_col = column(&["nickname"]);

    let mut persona_json: Option<String> = None;
    let mut user_id = None;
    let mut turns = Vec::new();

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let cell = |i: usize| record.get(i).unwrap_or("");

        if persona_json.is_none() && !cell(meta_col).trim().is_empty() {
            persona_json = Some(cell(meta_col).to_string());
        }
        if user_id.is_none() {
            user_id = nickname_col
                .map(cell)
                .filter(|n| !n.trim().is_empty())
                .map(str::to_string);
        }

        let role = Role::parse(cell(role_col)).ok_or_else(|| {
            SimulatorError::InvalidSnapshot(format!(
                "row {}: unknown role '{}'",
                line + 2,
                cell(role_col)
            ))
        })?;
        turns.push(Turn {
            role,
            text: cell(content_col).to_string(),
            sequence_index: turns.len(),
        });
    }

    let persona_json = persona_json.ok_or_else(|| {
        SimulatorError::MissingPersonaMetadata("meta_persona column is empty".to_string())
    })?;
    let persona: PersonaDescriptor = serde_json::from_str(&persona_json)
        .map_err(|e| SimulatorError::MissingPersonaMetadata(e.to_string()))?;

    debug!(turns = turns.len(), persona = %persona.name, "Imported transcript");
    Ok(ImportedSnapshot {
        persona,
        turns,
        user_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::StressResponse;
    use chrono::TimeZone;

    fn persona() -> PersonaDescriptor {
        PersonaDescriptor {
            name: "Xiao-Hua".to_string(),
            grade: "senior high school".to_string(),
            background: "past physical abuse".to_string(),
            trigger: "feeling treated unfairly".to_string(),
            response_mode: StressResponse::Fight,
            session_number: 2,
            relationship_status: "cold / defensive".to_string(),
            recent_event: "parents divorced".to_string(),
        }
    }

    fn turns() -> Vec<Turn> {
        [
            (Role::Student, "Why do I always get blamed?"),
            (Role::Teacher, "You sound really frustrated, \"unfair\" is a big word."),
            (Role::Student, "Whatever.\nJust leave it."),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (role, text))| Turn {
            role,
            text: text.to_string(),
            sequence_index: i,
        })
        .collect()
    }

    fn updated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_export_layout() {
        let bytes = export_csv("001", &persona(), &turns(), updated_at()).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("role,content,nickname,time,meta_persona"));
        let first = lines.next().unwrap();
        assert!(first.starts_with("assistant,Why do I always get blamed?,001,2025-03-01 09:30:00,"));
        assert!(first.contains("\"\"session_num\"\":2"));
    }

    #[test]
    fn test_export_is_deterministic() {
        let a = export_csv("001", &persona(), &turns(), updated_at()).unwrap();
        let b = export_csv("001", &persona(), &turns(), updated_at()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_import_restores_persona_and_turns() {
        let bytes = export_csv("001", &persona(), &turns(), updated_at()).unwrap();
        let snapshot = import_csv(&bytes).unwrap();

        assert_eq!(snapshot.persona, persona());
        assert_eq!(snapshot.turns, turns());
        assert_eq!(snapshot.user_id.as_deref(), Some("001"));
    }

    #[test]
    fn test_import_accepts_transcript_role_labels() {
        let csv = "role,content,meta_persona\n\
                   student,hi,\"{\"\"name\"\":\"\"A\"\",\"\"grade\"\":\"\"g\"\",\"\"background\"\":\"\"b\"\",\"\"trigger\"\":\"\"t\"\",\"\"response_mode\"\":\"\"Fawn\"\"}\"\n\
                   teacher,hello,\n";
        let snapshot = import_csv(csv.as_bytes()).unwrap();
        assert_eq!(snapshot.persona.response_mode, StressResponse::Fawn);
        assert_eq!(snapshot.turns[1].role, Role::Teacher);
        assert_eq!(snapshot.user_id, None);
    }

    #[test]
    fn test_missing_meta_column() {
        let csv = "role,content,nickname,time\nassistant,hi,001,2025-03-01 09:00:00\n";
        assert!(matches!(
            import_csv(csv.as_bytes()),
            Err(SimulatorError::MissingPersonaMetadata(_))
        ));
    }

    #[test]
    fn test_blank_or_garbage_meta() {
        let blank = "role,content,meta_persona\nassistant,hi,\n";
        assert!(matches!(
            import_csv(blank.as_bytes()),
            Err(SimulatorError::MissingPersonaMetadata(_))
        ));

        let garbage = "role,content,meta_persona\nassistant,hi,not json\n";
        assert!(matches!(
            import_csv(garbage.as_bytes()),
            Err(SimulatorError::MissingPersonaMetadata(_))
        ));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let bytes = export_csv("001", &persona(), &turns(), updated_at()).unwrap();
        let text = String::from_utf8(bytes).unwrap().replacen("assistant,", "narrator,", 1);
        assert!(matches!(
            import_csv(text.as_bytes()),
            Err(SimulatorError::InvalidSnapshot(_))
        ));
    }

    #[test]
    fn test_file_name_is_path_safe() {
        let mut p = persona();
        p.name = "An An/2".to_string();
        assert_eq!(export_file_name("t-01", &p), "simulator_t-01_An_An_2.csv");
    }
}
