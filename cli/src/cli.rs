use clap::Parser;
use std::path::PathBuf;

/// Rehearse trauma-informed conversations with a simulated student
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Login id recorded in the session log (asked for when omitted)
    #[arg(short, long)]
    pub user: Option<String>,

    /// Student grade (asked for when omitted)
    #[arg(short, long)]
    pub grade: Option<String>,

    /// Language the student speaks
    #[arg(short, long)]
    pub language: Option<String>,

    /// Which conversation with this student this is (1-10)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub session_number: Option<u32>,

    /// Current relationship between teacher and student
    #[arg(long)]
    pub relationship: Option<String>,

    /// Something that recently happened to the student
    #[arg(long)]
    pub recent_event: Option<String>,

    /// Resume from an exported transcript instead of rolling a new student
    #[arg(short, long)]
    pub resume: Option<PathBuf>,

    /// Directory of reference documents (.txt / .md)
    #[arg(long)]
    pub corpus_dir: Option<PathBuf>,

    /// Model to use, e.g. gemini-1.5-flash
    #[arg(short, long)]
    pub model: Option<String>,

    /// Pick the model from the list the API key can use
    #[arg(long, default_value_t = false)]
    pub select_model: bool,

    /// Print the available models and exit
    #[arg(long, default_value_t = false)]
    pub list_models: bool,

    /// Directory exports are written to
    #[arg(long, default_value = ".")]
    pub export_dir: PathBuf,

    /// Path to the configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TIC_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_flags() {
        let args = Args::parse_from([
            "tic-sim",
            "--user",
            "001",
            "--session-number",
            "3",
            "--relationship",
            "relationship broken/hostile",
        ]);
        assert_eq!(args.user.as_deref(), Some("001"));
        assert_eq!(args.session_number, Some(3));
        assert_eq!(args.export_dir, PathBuf::from("."));
    }

    #[test]
    fn test_session_number_range() {
        assert!(Args::try_parse_from(["tic-sim", "--session-number", "11"]).is_err());
        assert!(Args::try_parse_from(["tic-sim", "--session-number", "0"]).is_err());
    }
}
