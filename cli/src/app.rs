use anyhow::{bail, Context, Result};
use colored::*;
use dialoguer::{theme::ColorfulTheme, Input, Password, Select};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tic_core::{ChatProvider, GeminiClient, UnifiedConfig};
use tic_sheets::RemoteLogSync;
use tic_simulator::persona::{GRADES, RELATIONSHIP_OPTIONS};
use tic_simulator::{
    export_file_name, load_or_empty, ConversationSession, DirectoryCorpus, PersonaGenerator,
    RateLimitedSender, SendPolicy, SessionController, SimulatorError, TurnOutcome,
};
use tracing::{debug, info, warn};

use crate::cli::Args;
use crate::output::{
    print_banner, print_deferred, print_error, print_help, print_notice, print_student,
    print_turn, spinner,
};

/// Scenario context chosen by the educator before a persona is rolled
struct Scenario {
    grade: String,
    session_number: u32,
    relationship: String,
    recent_event: String,
}

enum Command<'a> {
    Say(&'a str),
    Retry,
    Export(&'a str),
    History,
    Help,
    NewCase,
    Quit,
}

fn parse_command(input: &str) -> Command<'_> {
    match input.split_once(' ').map_or((input, ""), |(c, rest)| (c, rest.trim())) {
        ("/retry", _) => Command::Retry,
        ("/export", path) => Command::Export(path),
        ("/history", _) => Command::History,
        ("/help", _) => Command::Help,
        ("/new", _) => Command::NewCase,
        ("/quit", _) | ("/exit", _) => Command::Quit,
        _ => Command::Say(input),
    }
}

/// Logged-in rehearsal loop
struct Rehearsal {
    controller: SessionController,
    generator: PersonaGenerator,
    args: Args,
    user_id: String,
    corpus: String,
    language: String,
}

/// Logs in, sets up the model and remote log, then runs the conversation
pub async fn run(args: Args, config: UnifiedConfig) -> Result<()> {
    check_access_code(&config)?;

    let mut client = GeminiClient::new(&config.gemini).context("Failed to create Gemini client")?;
    if let Some(model) = &args.model {
        client = client.with_model(model);
    }

    if args.list_models {
        for model in client.list_models().await.context("Failed to list models")? {
            println!("{}", model);
        }
        return Ok(());
    }
    if args.select_model {
        client = select_model(client).await?;
    }
    info!(model = client.model_name(), "Using model");

    let user_id = match &args.user {
        Some(user) if !user.trim().is_empty() => user.trim().to_string(),
        _ => prompt_user_id()?,
    };

    let log_sync = match RemoteLogSync::from_config(&config.remote_log) {
        Ok(sync) => sync,
        Err(e) => {
            warn!("Remote session log disabled: {}", e);
            print_notice("Remote session log unavailable; the session is kept locally only.");
            None
        }
    };

    let corpus_dir = args
        .corpus_dir
        .clone()
        .or_else(|| config.simulator.corpus_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let corpus = load_or_empty(&DirectoryCorpus::new(corpus_dir)).await;

    let sender = RateLimitedSender::new(SendPolicy::from_config(&config.simulator));
    let controller = SessionController::new(Arc::new(client), sender)
        .with_corpus_budget(config.simulator.corpus_char_budget)
        .with_log_sync(log_sync);

    let language = args
        .language
        .clone()
        .unwrap_or_else(|| config.simulator.language.clone());

    let mut rehearsal = Rehearsal {
        controller,
        generator: PersonaGenerator::new(),
        args,
        user_id,
        corpus,
        language,
    };

    let session = match rehearsal.args.resume.clone() {
        Some(path) => rehearsal.resume(&path).await?,
        None => rehearsal.open_new_case().await?,
    };
    rehearsal.chat(session).await
}

fn check_access_code(config: &UnifiedConfig) -> Result<()> {
    let Some(expected) = config.cli.access_code.as_deref() else {
        return Ok(());
    };
    let entered = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Access code")
        .interact()?;
    if entered.trim() != expected {
        bail!("Wrong access code");
    }
    Ok(())
}

fn prompt_user_id() -> Result<String> {
    let id: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("User id")
        .validate_with(|s: &String| {
            if s.trim().is_empty() {
                Err("a user id is required")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    Ok(id.trim().to_string())
}

async fn select_model(client: GeminiClient) -> Result<GeminiClient> {
    let models = client.list_models().await.context("Failed to list models")?;
    if models.is_empty() {
        warn!("No chat models listed, keeping {}", client.model_name());
        return Ok(client);
    }

    let current = models
        .iter()
        .position(|m| m.ends_with(client.model_name()))
        .unwrap_or(0);
    let index = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Model")
        .items(&models)
        .default(current)
        .interact()?;
    Ok(client.with_model(&models[index]))
}

impl Rehearsal {
    fn scenario(&self) -> Result<Scenario> {
        let theme = ColorfulTheme::default();

        let grade = match &self.args.grade {
            Some(grade) => grade.clone(),
            None => {
                let i = Select::with_theme(&theme)
                    .with_prompt("Grade")
                    .items(GRADES)
                    .default(0)
                    .interact()?;
                GRADES[i].to_string()
            }
        };

        let session_number = match self.args.session_number {
            Some(n) => n,
            None => Input::with_theme(&theme)
                .with_prompt("Session number (1-10)")
                .default(1u32)
                .validate_with(|n: &u32| {
                    if (1..=10).contains(n) {
                        Ok(())
                    } else {
                        Err("enter a number from 1 to 10")
                    }
                })
                .interact_text()?,
        };

        let relationship = match &self.args.relationship {
            Some(r) => r.clone(),
            None => {
                let i = Select::with_theme(&theme)
                    .with_prompt("Relationship")
                    .items(RELATIONSHIP_OPTIONS)
                    .default(0)
                    .interact()?;
                RELATIONSHIP_OPTIONS[i].to_string()
            }
        };

        let recent_event = match &self.args.recent_event {
            Some(e) => e.clone(),
            None => Input::with_theme(&theme)
                .with_prompt("Recent event (optional)")
                .allow_empty(true)
                .interact_text()?,
        };

        Ok(Scenario {
            grade,
            session_number,
            relationship,
            recent_event,
        })
    }

    async fn open_new_case(&mut self) -> Result<ConversationSession> {
        let scenario = self.scenario()?;
        loop {
            let persona = self.generator.generate(
                &scenario.grade,
                scenario.session_number,
                &scenario.relationship,
                &scenario.recent_event,
            );
            print_banner(&persona);

            let progress = spinner("The student is arriving...");
            let result = self
                .controller
                .start_new(&self.user_id, persona, &self.corpus, &self.language)
                .await;
            progress.finish_and_clear();

            match result {
                Ok(session) => {
                    if let Some(turn) = session.turns().first() {
                        print_student(&session.persona().name, &turn.text);
                    }
                    return Ok(session);
                }
                Err(SimulatorError::RateLimited) => {
                    print_deferred();
                    let again = dialoguer::Confirm::with_theme(&ColorfulTheme::default())
                        .with_prompt("Try again?")
                        .default(true)
                        .interact()?;
                    if !again {
                        bail!("Could not open a session while rate limited");
                    }
                }
                Err(e) => return Err(e).context("Failed to start the session"),
            }
        }
    }

    async fn resume(&mut self, path: &Path) -> Result<ConversationSession> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let session = self
            .controller
            .resume_from_snapshot(&self.user_id, &bytes, &self.corpus, &self.language)
            .await
            .with_context(|| format!("Failed to resume from {}", path.display()))?;

        print_banner(session.persona());
        for turn in session.turns() {
            print_turn(session.persona(), turn);
        }
        print_notice("Context resumed. Continue the conversation.");
        Ok(session)
    }

    async fn chat(&mut self, mut session: ConversationSession) -> Result<()> {
        print_help();

        loop {
            let Some(input) = read_line()? else {
                break;
            };
            if input.is_empty() {
                continue;
            }

            match parse_command(&input) {
                Command::Quit => break,
                Command::Help => print_help(),
                Command::History => {
                    for turn in session.turns() {
                        print_turn(session.persona(), turn);
                    }
                }
                Command::Export(path) => match self.export(&session, path) {
                    Ok(written) => print_notice(&format!("Exported to {}", written.display())),
                    Err(e) => print_error(&format!("{:#}", e)),
                },
                Command::NewCase => {
                    self.controller.reset(session).await;
                    session = self.open_new_case().await?;
                }
                Command::Retry => self.reply(&mut session, None).await,
                Command::Say(text) => self.reply(&mut session, Some(text)).await,
            }
            println!();
        }

        let progress = spinner("Saving session...");
        self.controller.finalize(session).await;
        progress.finish_and_clear();
        println!("{}", "Session saved. Goodbye.".green());
        Ok(())
    }

    /// Sends `text`, or retries unanswered turns when `text` is `None`
    async fn reply(&self, session: &mut ConversationSession, text: Option<&str>) {
        let name = session.persona().name.clone();
        let progress = spinner(&format!("{} is thinking...", name));
        let result = match text {
            Some(text) => self.controller.apply_teacher_turn(session, text).await,
            None => self.controller.retry_pending(session).await,
        };
        progress.finish_and_clear();

        match result {
            Ok(TurnOutcome::Reply(reply)) => print_student(&name, &reply),
            Ok(TurnOutcome::Deferred) => print_deferred(),
            Err(SimulatorError::NothingToRetry) => print_notice("Nothing to retry."),
            Err(e) => {
                print_error(&e.to_string());
                if matches!(e, SimulatorError::Upstream(_)) {
                    print_notice("Your message is kept; type /retry to send it again.");
                }
            }
        }
    }

    fn export(&self, session: &ConversationSession, path: &str) -> Result<PathBuf> {
        let target = if path.is_empty() {
            self.args
                .export_dir
                .join(export_file_name(session.user_id(), session.persona()))
        } else {
            PathBuf::from(path)
        };
        let bytes = self.controller.export_snapshot(session)?;
        std::fs::write(&target, bytes)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        debug!(path = %target.display(), "Transcript exported");
        Ok(target)
    }
}

/// Reads one line from stdin; `None` on end of input
fn read_line() -> Result<Option<String>> {
    print!("{}: ", "You".green().bold());
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    let read = io::stdin()
        .read_line(&mut input)
        .context("Failed to read input")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}
