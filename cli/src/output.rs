use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tic_simulator::{PersonaDescriptor, Role, Turn};

/// Spinner shown while the model is thinking
pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner} {msg}")
    {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

pub fn print_banner(persona: &PersonaDescriptor) {
    println!();
    println!("{}", persona.summary().yellow().bold());
    println!(
        "{} {} / {}",
        "Background:".dimmed(),
        persona.background,
        persona.response_mode
    );
    println!();
}

pub fn print_student(name: &str, text: &str) {
    println!("{}: {}", name.blue().bold(), text);
}

pub fn print_turn(persona: &PersonaDescriptor, turn: &Turn) {
    match turn.role {
        Role::Student => print_student(&persona.name, &turn.text),
        Role::Teacher => println!("{}: {}", "You".green().bold(), turn.text),
    }
}

pub fn print_deferred() {
    println!(
        "{}",
        "The model is busy (rate limited). Your message is kept; wait a few seconds and type /retry or keep talking."
            .yellow()
    );
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
}

pub fn print_notice(message: &str) {
    println!("{}", message.cyan());
}

pub fn print_help() {
    println!("{}", "Commands:".yellow().bold());
    println!("  {}  write the transcript to a CSV file", "/export [path]".green());
    println!("  {}          resend messages the student has not answered", "/retry".green());
    println!("  {}        show the transcript so far", "/history".green());
    println!("  {}            save and start a new case", "/new".green());
    println!("  {}           save and log out", "/quit".green());
    println!();
}
