//! llama-desk
//!
//! Console chat client for locally served models. Chats are persisted in
//! SQLite and portable as JSON documents; replies are generated on
//! background workers so the prompt stays responsive.

use llama_desk::chat::models::ChatRecord;
use llama_desk::chat::{codec, ChatDb};
use llama_desk::config::Config;
use llama_desk::inference::{OllamaClient, ServerProcess};
use llama_desk::session::{ReplyDispatcher, ReplyOutcome, SessionManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!("Configuration loaded: {:?}", config);

    // Optionally bring up the inference server; everything else still works
    // without it (listing, import/export, history)
    let mut server = if config.server.autostart {
        match ServerProcess::spawn(&config.server).await {
            Ok(server) => Some(server),
            Err(e) => {
                warn!("Failed to start inference server: {}", e);
                None
            }
        }
    } else {
        None
    };

    // Opening the chat database is the one fatal startup step
    let db = ChatDb::new(&config.storage.db_path).await?;

    let client = OllamaClient::new(
        &config.inference.base_url,
        Duration::from_secs(config.inference.request_timeout_secs),
    )?;

    let manager = SessionManager::new(db.clone(), Arc::new(client));
    let (dispatcher, mut outcomes) =
        ReplyDispatcher::new(manager.clone(), config.dispatch.workers);

    let mut repl = Repl {
        manager,
        db,
        dispatcher,
        active: None,
        model: config.inference.default_model.clone(),
    };

    println!(
        "llama-desk ready. Chatting with '{}'. Type /help for commands.",
        repl.model
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !repl.handle_line(line.trim()).await {
                            break;
                        }
                    }
                    None => break, // stdin closed
                }
            }
            Some(outcome) = outcomes.recv() => {
                repl.apply_outcome(outcome).await;
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    if let Some(server) = server.as_mut() {
        let grace = Duration::from_secs(config.server.shutdown_grace_secs);
        if let Err(e) = server.shutdown(grace).await {
            warn!("Failed to stop inference server: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Interactive console state: the open chat, the addressed model, and the
/// handles everything is driven through
struct Repl {
    manager: SessionManager,
    db: ChatDb,
    dispatcher: ReplyDispatcher,
    active: Option<ChatRecord>,
    model: String,
}

impl Repl {
    /// Handle one input line; returns false when the user wants to quit
    async fn handle_line(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return true;
        }

        if let Some(rest) = line.strip_prefix('/') {
            let (command, arg) = match rest.split_once(' ') {
                Some((command, arg)) => (command, arg.trim()),
                None => (rest, ""),
            };
            return self.handle_command(command, arg).await;
        }

        self.send_prompt(line).await;
        true
    }

    async fn handle_command(&mut self, command: &str, arg: &str) -> bool {
        match command {
            "help" => print_help(),
            "new" => self.cmd_new(arg).await,
            "open" => self.cmd_open(arg).await,
            "list" => self.cmd_list().await,
            "history" => self.cmd_history(),
            "model" => self.cmd_model(arg),
            "models" => self.cmd_models().await,
            "instructions" => self.cmd_instructions(arg).await,
            "clear" => self.cmd_clear().await,
            "delete" => self.cmd_delete(arg).await,
            "export" => self.cmd_export(arg),
            "import" => self.cmd_import(arg).await,
            "purge" => self.cmd_purge().await,
            "reset-db" => self.cmd_reset_db().await,
            "quit" | "exit" => return false,
            _ => println!("Unknown command: /{}. Type /help.", command),
        }
        true
    }

    async fn cmd_new(&mut self, name: &str) {
        if name.is_empty() {
            println!("Usage: /new <name>");
            return;
        }
        match self.manager.start_new_conversation(name).await {
            Ok(record) => {
                self.active = Some(record);
                println!("Started chat '{}'.", name);
            }
            Err(e) => println!("{}", e),
        }
    }

    async fn cmd_open(&mut self, name: &str) {
        if name.is_empty() {
            println!("Usage: /open <name>");
            return;
        }
        match self.manager.load_conversation(name).await {
            Ok(record) => {
                println!(
                    "Opened chat '{}' ({} messages, created {}).",
                    record.name,
                    record.messages.len(),
                    record.created_at_datetime().format("%Y-%m-%d %H:%M")
                );
                self.active = Some(record);
            }
            Err(e) => println!("{}", e),
        }
    }

    async fn cmd_list(&self) {
        match self.manager.list_conversations().await {
            Ok(names) if names.is_empty() => println!("No stored chats."),
            Ok(mut names) => {
                names.sort();
                for name in names {
                    println!("  {}", name);
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    fn cmd_history(&self) {
        let Some(record) = self.active.as_ref() else {
            println!("No chat open.");
            return;
        };
        if record.messages.is_empty() {
            println!("'{}' is empty.", record.name);
            return;
        }
        let mut reply_index = 0;
        for message in &record.messages {
            match message.role.as_str() {
                "assistant" => {
                    let detail = match (
                        record.addressed_models.get(reply_index),
                        record.reply_times.get(reply_index),
                    ) {
                        (Some(model), Some(secs)) => format!(" [{} | {:.2}s]", model, secs),
                        _ => String::new(),
                    };
                    reply_index += 1;
                    println!("assistant{}: {}", detail, message.content);
                }
                role => println!("{}: {}", role, message.content),
            }
        }
    }

    fn cmd_model(&mut self, name: &str) {
        if name.is_empty() {
            println!("Current model: {}", self.model);
            return;
        }
        self.model = name.to_string();
        println!("Now addressing '{}'.", self.model);
    }

    async fn cmd_models(&self) {
        match self.manager.list_models().await {
            Ok(models) if models.is_empty() => println!("The server reports no models."),
            Ok(models) => {
                for model in models {
                    println!("  {}", model);
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    async fn cmd_instructions(&mut self, text: &str) {
        let Some(record) = self.active.as_mut() else {
            println!("No chat open.");
            return;
        };
        if text.is_empty() {
            if record.instructions.is_empty() {
                println!("'{}' has no instructions.", record.name);
            } else {
                println!("Instructions for '{}': {}", record.name, record.instructions);
            }
            return;
        }
        match self.manager.set_instructions(record, text).await {
            Ok(()) => println!("Instructions updated."),
            Err(e) => println!("{}", e),
        }
    }

    async fn cmd_clear(&mut self) {
        let Some(record) = self.active.as_mut() else {
            println!("No chat open.");
            return;
        };
        match self.manager.clear_conversation(record).await {
            Ok(()) => println!("Chat cleared (instructions kept)."),
            Err(e) => println!("{}", e),
        }
    }

    async fn cmd_delete(&mut self, arg: &str) {
        let name = if arg.is_empty() {
            match self.active.as_ref() {
                Some(record) => record.name.clone(),
                None => {
                    println!("Usage: /delete <name> (no chat open)");
                    return;
                }
            }
        } else {
            arg.to_string()
        };

        match self.manager.delete_conversation(&name).await {
            Ok(()) => {
                if self.active.as_ref().is_some_and(|r| r.name == name) {
                    self.active = None;
                }
                println!("Deleted '{}'.", name);
            }
            Err(e) => println!("{}", e),
        }
    }

    fn cmd_export(&self, path: &str) {
        let Some(record) = self.active.as_ref() else {
            println!("No chat open.");
            return;
        };
        if path.is_empty() {
            match self.manager.export_conversation(record) {
                Ok(json) => println!("{}", json),
                Err(e) => println!("{}", e),
            }
            return;
        }
        match codec::write_to_file(record, path) {
            Ok(()) => println!("Saved '{}' to {}.", record.name, path),
            Err(e) => println!("{}", e),
        }
    }

    async fn cmd_import(&mut self, path: &str) {
        if path.is_empty() {
            println!("Usage: /import <path>");
            return;
        }
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                println!("Could not read {}: {}", path, e);
                return;
            }
        };
        match self.manager.import_conversation(&text).await {
            Ok(record) => {
                println!("Imported chat '{}'.", record.name);
                self.active = Some(record);
            }
            Err(e) => println!("{}", e),
        }
    }

    async fn cmd_purge(&mut self) {
        match self.db.clear_all().await {
            Ok(()) => {
                self.active = None;
                println!("All chats deleted.");
            }
            Err(e) => println!("{}", e),
        }
    }

    async fn cmd_reset_db(&mut self) {
        match self.db.reset_schema().await {
            Ok(()) => {
                self.active = None;
                println!("Database reset.");
            }
            Err(e) => println!("{}", e),
        }
    }

    /// Append a user turn and queue the reply request
    async fn send_prompt(&mut self, line: &str) {
        let Some(record) = self.active.as_mut() else {
            println!("No chat open. /new <name> or /open <name> first.");
            return;
        };

        if self.dispatcher.is_pending(&record.name).await {
            println!("Still waiting on the previous reply for '{}'.", record.name);
            return;
        }

        if let Err(e) = self.manager.submit_user_turn(record, line) {
            println!("{}", e);
            return;
        }

        match self.dispatcher.dispatch(record, &self.model).await {
            Ok(()) => println!("[{}] generating response...", self.model),
            Err(e) => println!("{}", e),
        }
    }

    /// Record a finished background reply and refresh the open chat
    async fn apply_outcome(&mut self, outcome: ReplyOutcome) {
        let ReplyOutcome {
            mut record,
            model,
            result,
        } = outcome;

        match result {
            Ok(reply) => {
                println!("\n[{} | {:.2}s] {}", model, reply.elapsed_secs, reply.content);
                if let Err(e) = self
                    .manager
                    .record_assistant_reply(&mut record, &model, reply)
                    .await
                {
                    println!("Could not save the reply for '{}': {}", record.name, e);
                    return;
                }
                // The completed turn becomes the live transcript when that
                // chat is still the open one
                if self.active.as_ref().is_some_and(|r| r.name == record.name) {
                    self.active = Some(record);
                }
            }
            Err(e) => println!("\nInference failed for '{}': {}", record.name, e),
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /new <name>           start a new chat");
    println!("  /open <name>          open a stored chat");
    println!("  /list                 list stored chats");
    println!("  /history              show the open chat's transcript");
    println!("  /model [name]         show or switch the addressed model");
    println!("  /models               list models the server has available");
    println!("  /instructions [text]  show or set the open chat's instructions");
    println!("  /clear                empty the open chat, keeping instructions");
    println!("  /delete [name]        delete the open (or named) chat");
    println!("  /export [path]        write the open chat as JSON (stdout without path)");
    println!("  /import <path>        import a chat document and open it");
    println!("  /purge                delete every stored chat");
    println!("  /reset-db             drop and recreate the storage schema");
    println!("  /quit                 exit");
    println!("Anything else is sent to the model as the next prompt.");
}
