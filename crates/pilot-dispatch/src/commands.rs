//! Slash-command parsing. A `/`-prefixed message never reaches the
//! Classifier — it is always routed here, matching the token list the
//! orchestrator recognizes as commands.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Start,
    Help,
    Status,
    Cancel,
    Queue,
    Projects,
    Project,
    Switch { name: String },
    History,
    Budget,
    Tasks,
    List,
    Run { id: String },
    Stop,
    Brief,
    /// `/nopr <desc>` — propose a task that forces createPR=false regardless
    /// of ephemeral-task detection.
    NoPr { description: String },
    /// `/pr <desc>` — propose a task that forces createPR=true.
    Pr { description: String },
    Unknown { raw: String },
}

pub fn parse_command(text: &str) -> SlashCommand {
    let trimmed = text.trim();
    debug_assert!(trimmed.starts_with('/'));

    if trimmed == "/start" {
        return SlashCommand::Start;
    }
    if trimmed == "/help" || trimmed == "/?" {
        return SlashCommand::Help;
    }
    if trimmed == "/status" {
        return SlashCommand::Status;
    }
    if trimmed == "/cancel" {
        return SlashCommand::Cancel;
    }
    if trimmed == "/queue" {
        return SlashCommand::Queue;
    }
    if trimmed == "/projects" {
        return SlashCommand::Projects;
    }
    if trimmed == "/project" {
        return SlashCommand::Project;
    }
    if let Some(name) = trimmed.strip_prefix("/switch ") {
        return SlashCommand::Switch {
            name: name.trim().to_string(),
        };
    }
    if trimmed == "/history" {
        return SlashCommand::History;
    }
    if trimmed == "/budget" {
        return SlashCommand::Budget;
    }
    if trimmed == "/tasks" {
        return SlashCommand::Tasks;
    }
    if trimmed == "/list" {
        return SlashCommand::List;
    }
    if let Some(id) = trimmed.strip_prefix("/run ") {
        return SlashCommand::Run {
            id: id.trim().to_string(),
        };
    }
    if trimmed == "/stop" {
        return SlashCommand::Stop;
    }
    if trimmed == "/brief" {
        return SlashCommand::Brief;
    }
    if let Some(desc) = trimmed.strip_prefix("/nopr ") {
        return SlashCommand::NoPr {
            description: desc.trim().to_string(),
        };
    }
    if let Some(desc) = trimmed.strip_prefix("/pr ") {
        return SlashCommand::Pr {
            description: desc.trim().to_string(),
        };
    }

    SlashCommand::Unknown {
        raw: trimmed.to_string(),
    }
}

pub fn help_text() -> String {
    "Commands:\n\
     /start — introduce yourself\n\
     /help — this message\n\
     /status — current project and queue status\n\
     /cancel — cancel a pending task confirmation\n\
     /queue — list queued executions for the active project\n\
     /projects — list known projects\n\
     /project — show the active project\n\
     /switch <name> — switch active project\n\
     /history — recent executions\n\
     /budget — usage thresholds\n\
     /tasks — alias for /queue\n\
     /list — alias for /queue\n\
     /run <id> — re-run a historical task description\n\
     /stop — cancel the running execution for the active project\n\
     /brief — short status summary\n\
     /nopr <desc> — propose a task that never opens a pull request\n\
     /pr <desc> — propose a task that always opens a pull request"
        .to_string()
}
