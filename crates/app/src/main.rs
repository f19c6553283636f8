use anyhow::{Context, Result};
use providers::router::GenerationRouter;
use providers::scripted::ScriptedGenerationService;
use providers::GenerationService;
use services::{KvStore, ReferenceTable, SqliteKvStore, StaticReferenceTable};
use shared::events::{NoticeLevel, StudyEvent};
use shared::settings::AppSettings;
use std::future::Future;
use std::sync::Arc;
use study_host::StudyOrchestrator;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing_subscriber::EnvFilter;

mod commands;
mod render;
mod utils;

use commands::Command;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let offline = std::env::args().skip(1).any(|arg| arg == "--offline");

    let (settings, existed) = utils::load_settings_or_default();
    if !existed {
        utils::save_settings(&settings);
        if let Some(path) = utils::config_path() {
            tracing::info!(path = %path.display(), "wrote default settings");
        }
    }

    let data_dir = utils::data_dir(&settings);
    let store: Arc<dyn KvStore> = Arc::new(
        SqliteKvStore::open(&data_dir)
            .with_context(|| format!("opening study database in {}", data_dir.display()))?,
    );
    let references = reference_table(&settings);
    let orchestrator = StudyOrchestrator::new(
        &settings,
        generation_service(&settings, offline),
        store,
        references.clone(),
    );

    let printer = tokio::spawn(print_events(orchestrator.subscribe()));
    let mut lines = read_stdin_lines();

    println!(
        "Bible Study ({}). Type `help` for commands.",
        orchestrator.language().display_name()
    );
    while let Some(line) = lines.recv().await {
        match commands::parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => run(&orchestrator, commands::canonicalize(command, references.as_ref())),
            Err(e) => eprintln!("{:#}", e),
        }
    }

    printer.abort();
    Ok(())
}

fn generation_service(settings: &AppSettings, offline: bool) -> Arc<dyn GenerationService> {
    if offline || settings.endpoints.is_empty() {
        tracing::warn!("no generation endpoint in use, serving scripted studies");
        return Arc::new(ScriptedGenerationService::new());
    }
    let router = GenerationRouter::from_endpoints(&settings.endpoints);
    tracing::info!(
        primary = router.active_backend().unwrap_or("none"),
        endpoints = settings.endpoints.len(),
        "generation endpoints configured"
    );
    Arc::new(router)
}

fn reference_table(settings: &AppSettings) -> Arc<dyn ReferenceTable> {
    let Some(path) = settings.reference_table_path.as_deref() else {
        tracing::warn!("no reference table configured, references are not validated");
        return Arc::new(StaticReferenceTable::empty());
    };
    match StaticReferenceTable::load(&utils::expand_user_path(path)) {
        Ok(table) => Arc::new(table),
        Err(e) => {
            tracing::warn!(error = %e, "reference table unavailable, references are not validated");
            Arc::new(StaticReferenceTable::empty())
        }
    }
}

/// Forward stdin lines from a blocking reader thread.
fn read_stdin_lines() -> UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Run a primary operation in the background so tabs stay usable while it
/// streams. Its outcome reaches the user through the event stream.
fn spawn_primary<F, T>(operation: &'static str, future: F)
where
    F: Future<Output = shared::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = future.await {
            tracing::debug!(operation, error = %e, "operation did not complete");
        }
    });
}

fn run(orchestrator: &StudyOrchestrator, command: Command) {
    let orch = orchestrator.clone();
    match command {
        Command::Study(item) => spawn_primary("study", async move { orch.start_study(item).await }),
        Command::Verse {
            book,
            chapter,
            verse,
        } => spawn_primary("verse", async move {
            orch.open_verse(&book, chapter, verse).await
        }),
        Command::Say(text) => spawn_primary("chat", async move {
            orch.send_chat_message(&text).await
        }),
        Command::Continue => spawn_primary("guided", async move { orch.continue_guided().await }),
        Command::Next => spawn_primary("next", async move { orch.next_passage().await }),
        Command::Previous => spawn_primary("previous", async move { orch.previous_passage().await }),
        Command::Language(language) => {
            let _ = orch.change_language(language);
        }
        Command::Tabs => println!(
            "{}",
            render::tabs(&orch.tabs(), orch.active(), &orch.selected())
        ),
        Command::Show => match (orch.active_item(), orch.active_result()) {
            (Some(item), Some(result)) => println!("{}", render::result(&result, item.mode())),
            _ if orch.is_loading() => println!("(loading...)"),
            _ => println!("(nothing to show)"),
        },
        Command::History => {
            for (index, item) in orch.history().iter().enumerate() {
                println!("{:>3}  {}", index, item.title());
            }
        }
        Command::Cache => {
            for key in orch.cached_keys() {
                println!("  {}", key);
            }
        }
        Command::Select { tab, sub } => {
            let _ = orch.select(tab, sub);
        }
        Command::Close { tab, sub } => closed(orch.close(tab, sub)),
        Command::CloseOthers { tab, sub } => closed(orch.close_others(tab, sub)),
        Command::CloseRight(from) => closed(orch.close_to_right(from)),
        Command::CloseAll => closed(Ok(orch.close_all())),
        Command::Move { from, to } => {
            let _ = orch.reorder(from, to);
        }
        Command::Group { drag, drop } => {
            let _ = orch.create_group_from_two(drag, drop);
        }
        Command::AddToGroup { drag, group } => {
            let _ = orch.add_to_group(drag, group);
        }
        Command::Ungroup(group) => {
            let _ = orch.ungroup(group);
        }
        Command::Pop { group, sub } => {
            let _ = orch.remove_from_group(group, sub);
        }
        Command::MoveOut { group, sub, target } => {
            let _ = orch.move_out_of_group(group, sub, target);
        }
        Command::ReorderGroup { group, drag, drop } => {
            let _ = orch.reorder_in_group(group, drag, drop);
        }
        Command::Rename { group, name } => {
            let _ = orch.rename_group(group, &name);
        }
        Command::SelectionMode(true) => orch.enter_selection_mode(),
        Command::SelectionMode(false) => orch.exit_selection_mode(),
        Command::Toggle(index) => {
            let _ = orch.toggle_selection(index);
        }
        Command::GroupSelected => {
            let _ = orch.create_group_from_selection();
        }
        Command::AddSelected(group) => {
            let _ = orch.add_selection_to_group(group);
        }
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => {}
    }
}

fn closed(outcome: shared::Result<Vec<shared::StudyItem>>) {
    if let Ok(removed) = outcome {
        for item in removed {
            println!("closed {}", item.title());
        }
    }
}

async fn print_events(mut events: UnboundedReceiver<StudyEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            StudyEvent::Started { item, .. } => println!("... {}", item.title()),
            StudyEvent::Snapshot { key, .. } => tracing::trace!(key = %key, "snapshot"),
            StudyEvent::Completed { key } => println!("ready: {} (type `show`)", key),
            StudyEvent::Failed { key, error } => {
                tracing::debug!(key = %key, error = %error, "study failed")
            }
            StudyEvent::LanguageChanged { to, .. } => {
                println!("language: {}", to.display_name())
            }
            StudyEvent::Notice(notice) => match notice.level {
                NoticeLevel::Info => println!("{}", notice.message),
                NoticeLevel::Warning => println!("! {}", notice.message),
                NoticeLevel::Error => eprintln!("error: {}", notice.message),
            },
        }
    }
}
