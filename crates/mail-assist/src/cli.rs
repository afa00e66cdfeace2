//! Interactive mode and terminal output
//!
//! The REPL drives the orchestrator with slash commands; everything printed
//! is read from [`MailboxState`] snapshots.

use std::sync::Arc;

use ma_email::MailboxFolder;
use ma_inbox::{EnrichmentStage, MailboxState, Orchestrator};
use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, Emacs, KeyCode, KeyModifiers, Keybindings,
    MenuBuilder, Prompt, Reedline, ReedlineEvent, ReedlineMenu, Signal, Suggestion,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Available commands for autocomplete display
const COMMANDS: &[(&str, &str)] = &[
    ("/load", "Fetch and summarize unread mail"),
    ("/refresh", "Reload the mailbox without summarizing"),
    ("/list", "Show loaded messages"),
    ("/show", "Show one message: /show N"),
    ("/reply", "Draft replies to a message: /reply N"),
    ("/folders", "List folders"),
    ("/check", "Test text generation"),
    ("/status", "Show the current status"),
    ("/help", "Show this help"),
    ("/exit", "Quit"),
];

/// Command completer for reedline
#[derive(Clone)]
pub struct CommandCompleter {
    commands: Vec<(&'static str, &'static str)>,
}

impl CommandCompleter {
    pub fn new() -> Self {
        Self {
            commands: COMMANDS.to_vec(),
        }
    }
}

impl Default for CommandCompleter {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if !line.starts_with('/') {
            return Vec::new();
        }

        self.commands
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: reedline::Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

/// Prompt showing the loaded folder
struct MailPrompt {
    folder: String,
    style: Style,
}

impl MailPrompt {
    fn new(folder: &str) -> Self {
        Self {
            folder: folder.to_string(),
            style: Color::Cyan.bold(),
        }
    }
}

impl Prompt for MailPrompt {
    fn render_prompt_left(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Owned(self.style.paint(format!("{}> ", self.folder)).to_string())
    }

    fn render_prompt_right(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: reedline::PromptHistorySearch,
    ) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }
}

/// A parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Load,
    Refresh,
    List,
    Show(usize),
    Reply(usize),
    Folders,
    Check,
    Status,
    Help,
    Exit,
    Unknown(String),
}

impl Command {
    fn parse(input: &str) -> Self {
        let mut parts = input.split_whitespace();
        let name = parts.next().unwrap_or_default().to_lowercase();
        let index = parts.next().and_then(|n| n.parse::<usize>().ok());

        match (name.as_str(), index) {
            ("/load", _) => Command::Load,
            ("/refresh", _) => Command::Refresh,
            ("/list" | "/ls", _) => Command::List,
            ("/show", Some(n)) => Command::Show(n),
            ("/reply", Some(n)) => Command::Reply(n),
            ("/folders", _) => Command::Folders,
            ("/check", _) => Command::Check,
            ("/status", _) => Command::Status,
            ("/help" | "/?", _) => Command::Help,
            ("/exit" | "/quit" | "/q", _) => Command::Exit,
            _ => Command::Unknown(input.to_string()),
        }
    }
}

/// Run interactive mode against a connected orchestrator
pub async fn run_cli(orchestrator: Arc<Orchestrator>) -> anyhow::Result<()> {
    info!("Starting interactive mode");
    print_welcome();

    let mut keybindings = default_keybindings();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );

    let menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_menu")
            .with_columns(1)
            .with_column_width(Some(40))
            .with_only_buffer_difference(false),
    );

    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());

    let mut line_editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter::new()))
        .with_menu(ReedlineMenu::EngineCompleter(menu))
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    let prompt = MailPrompt::new(&orchestrator.settings().folder);

    loop {
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(line)) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if !input.starts_with('/') {
                    eprintln!("\nCommands start with '/'. Type /help for the list.\n");
                    continue;
                }

                match Command::parse(input) {
                    Command::Exit => break,
                    command => execute(&orchestrator, command).await,
                }
            }
            Ok(Signal::CtrlC) => {
                println!("^C");
                continue;
            }
            Ok(Signal::CtrlD) => break,
            Err(err) => {
                eprintln!("\nError: {}\n", err);
                break;
            }
        }
    }

    println!("\nBye.\n");
    Ok(())
}

async fn execute(orchestrator: &Orchestrator, command: Command) {
    match command {
        Command::Load => {
            let progress = spawn_progress(orchestrator.subscribe());
            orchestrator.load_emails().await;
            progress.abort();
            let state = orchestrator.snapshot();
            print_messages(&state);
            print_status(&state);
        }
        Command::Refresh => {
            orchestrator.refresh_emails().await;
            let state = orchestrator.snapshot();
            print_messages(&state);
            print_status(&state);
        }
        Command::List => print_messages(&orchestrator.snapshot()),
        Command::Show(n) => match orchestrator.snapshot().messages.get(n.wrapping_sub(1)) {
            Some(message) => {
                println!();
                println!("{} {}", Style::new().bold().paint("From:"), message.from);
                println!("{} {}", Style::new().bold().paint("To:"), message.to.join(", "));
                println!("{} {}", Style::new().bold().paint("Date:"), message.date.format("%Y-%m-%d %H:%M"));
                println!("{} {}", Style::new().bold().paint("Subject:"), message.subject);
                println!();
                println!("{}", message.content);
                if let Some(summary) = &message.summary {
                    println!();
                    println!("{} {}", Color::Green.bold().paint("Summary:"), summary);
                }
                println!();
            }
            None => eprintln!("\nNo message {}. Use /list to see the loaded messages.\n", n),
        },
        Command::Reply(n) => {
            let Some(message) = orchestrator.snapshot().messages.get(n.wrapping_sub(1)).cloned() else {
                eprintln!("\nNo message {}. Use /list to see the loaded messages.\n", n);
                return;
            };
            println!("\nDrafting replies to \"{}\"...", message.subject);
            match orchestrator.generate_replies(&message.content).await {
                Ok(replies) => {
                    println!();
                    for (i, option) in replies.options.iter().enumerate() {
                        println!("{}", Color::Yellow.bold().paint(format!("Option {}:", i + 1)));
                        println!("{}\n", option);
                    }
                }
                Err(e) => eprintln!("\nFailed to generate responses: {}\n", e),
            }
        }
        Command::Folders => print_folders(&orchestrator.load_folders().await),
        Command::Check => {
            orchestrator.check_generation().await;
            print_status(&orchestrator.snapshot());
        }
        Command::Status => print_status(&orchestrator.snapshot()),
        Command::Help => print_help(),
        Command::Exit => {}
        Command::Unknown(input) => {
            eprintln!("\nUnknown command: {}. Type /help for the list.\n", input);
        }
    }
}

/// Default keybindings for reedline
fn default_keybindings() -> Keybindings {
    let mut keybindings = Keybindings::new();
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Esc, ReedlineEvent::Esc);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('c'), ReedlineEvent::CtrlC);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::CtrlD);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Up, ReedlineEvent::Up);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Down, ReedlineEvent::Down);
    keybindings
}

/// Echo status changes to stderr until aborted
pub fn spawn_progress(mut rx: watch::Receiver<MailboxState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = String::new();
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().status_text.clone();
            if status != last {
                eprintln!("{}", Style::new().dimmed().paint(&status));
                last = status;
            }
        }
    })
}

pub fn print_messages(state: &MailboxState) {
    if state.messages.is_empty() {
        return;
    }

    println!();
    for (i, message) in state.messages.iter().enumerate() {
        let marker = if message.is_read {
            Style::new().dimmed().paint(" ")
        } else {
            Color::Blue.bold().paint("*")
        };
        let attachment = if message.has_attachment { " [att]" } else { "" };
        println!(
            "{:>3}. {} {}  {}  {}{}",
            i + 1,
            marker,
            message.date.format("%m-%d %H:%M"),
            Style::new().bold().paint(truncate(&message.from, 30)),
            message.subject,
            attachment
        );

        match (&message.summary, state.stage(&message.key)) {
            (Some(summary), _) => println!("       {}", Color::Green.paint(summary)),
            (None, Some(EnrichmentStage::Failed)) => {
                println!("       {}", Color::Red.paint("(summary unavailable)"))
            }
            _ => {}
        }
    }
    println!();
}

pub fn print_folders(folders: &[MailboxFolder]) {
    println!();
    if folders.is_empty() {
        println!("No folders found.");
    }
    for folder in folders {
        println!(
            "{:<40} {:>6} messages {:>5} unread",
            folder.full_name, folder.message_count, folder.unread_count
        );
    }
    println!();
}

pub fn print_status(state: &MailboxState) {
    if let Some(error) = &state.error {
        eprintln!("{}", Color::Red.paint(error));
    }
    println!("{}", Style::new().italic().paint(&state.status_text));
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

fn print_welcome() {
    println!();
    println!("mail-assist interactive mode");
    println!("Type /load to fetch and summarize unread mail, /help for all commands.");
    println!("Type / to see command suggestions.");
    println!();
}

fn print_help() {
    println!();
    println!("Available commands:");
    for (cmd, desc) in COMMANDS {
        println!("  {:<10} {}", cmd, desc);
    }
    println!();
}
