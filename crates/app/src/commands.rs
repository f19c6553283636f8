//! Line commands understood by the terminal front end.

use anyhow::{anyhow, bail, Context, Result};
use services::ReferenceTable;
use shared::study::{KnowledgeLevel, Language, StudyItem};

pub const HELP: &str = "\
Studies
  ref <book> <chapter>:<verse>[-<verse>]   study a passage
  verse <book> <chapter>:<verse>           study the passage around a verse
  topic <text> | question <text> | event <name> | arc <name>
  chat <subject>                           start a conversation
  say <message>                            reply in the active chat
  guided <beginner|intermediate|advanced> <topic>
  continue                                 next session of the active guided plan
  next | prev                              neighbouring passage
  lang <en|es>                             switch language
Tabs
  tabs | show | history | cache
  select <tab> [sub] | close <tab> [sub] | close-others <tab> [sub]
  close-right <tab> | close-all | move <from> <to>
  group <drag> <drop> | add-to-group <drag> <group> | ungroup <group>
  pop <group> <sub> | move-out <group> <sub> <target>
  reorder-group <group> <drag> <drop> | rename <group> <name>
  select-mode <on|off> | toggle <tab> | group-selected | add-selected <group>
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Study(StudyItem),
    Verse { book: String, chapter: u32, verse: u32 },
    Say(String),
    Continue,
    Next,
    Previous,
    Language(Language),
    Tabs,
    Show,
    History,
    Cache,
    Select { tab: usize, sub: usize },
    Close { tab: usize, sub: Option<usize> },
    CloseOthers { tab: usize, sub: Option<usize> },
    CloseRight(usize),
    CloseAll,
    Move { from: usize, to: usize },
    Group { drag: usize, drop: usize },
    AddToGroup { drag: usize, group: usize },
    Ungroup(usize),
    Pop { group: usize, sub: usize },
    MoveOut { group: usize, sub: usize, target: usize },
    ReorderGroup { group: usize, drag: usize, drop: usize },
    Rename { group: usize, name: String },
    SelectionMode(bool),
    Toggle(usize),
    GroupSelected,
    AddSelected(usize),
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let command = match word.to_lowercase().as_str() {
        "ref" => {
            let (book, chapter, start, end) = parse_reference(rest)?;
            Command::Study(StudyItem::reference(book, chapter, start, end))
        }
        "verse" => {
            let (book, chapter, verse, end) = parse_reference(rest)?;
            if end != verse {
                bail!("verse takes a single verse, e.g. `verse John 3:16`");
            }
            Command::Verse {
                book,
                chapter,
                verse,
            }
        }
        "topic" => Command::Study(StudyItem::topic(text(rest, "topic")?)),
        "question" => Command::Study(StudyItem::question(text(rest, "question")?)),
        "event" => Command::Study(StudyItem::Event {
            name: text(rest, "event")?,
        }),
        "arc" => Command::Study(StudyItem::StoryArc {
            name: text(rest, "arc")?,
        }),
        "chat" => Command::Study(StudyItem::chat(text(rest, "chat")?, None)),
        "say" => Command::Say(text(rest, "say")?),
        "guided" => {
            let (level, topic) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("usage: guided <level> <topic>"))?;
            let level = KnowledgeLevel::parse(level)
                .ok_or_else(|| anyhow!("unknown level `{}`", level))?;
            Command::Study(StudyItem::systematic(level, text(topic, "guided")?))
        }
        "continue" => Command::Continue,
        "next" => Command::Next,
        "prev" | "previous" => Command::Previous,
        "lang" => {
            let code = args.first().ok_or_else(|| anyhow!("usage: lang <en|es>"))?;
            Command::Language(
                Language::from_code(code).ok_or_else(|| anyhow!("unknown language `{}`", code))?,
            )
        }
        "tabs" => Command::Tabs,
        "show" => Command::Show,
        "history" => Command::History,
        "cache" => Command::Cache,
        "select" => Command::Select {
            tab: index(&args, 0)?,
            sub: optional_index(&args, 1)?.unwrap_or(0),
        },
        "close" => Command::Close {
            tab: index(&args, 0)?,
            sub: optional_index(&args, 1)?,
        },
        "close-others" => Command::CloseOthers {
            tab: index(&args, 0)?,
            sub: optional_index(&args, 1)?,
        },
        "close-right" => Command::CloseRight(index(&args, 0)?),
        "close-all" => Command::CloseAll,
        "move" => Command::Move {
            from: index(&args, 0)?,
            to: index(&args, 1)?,
        },
        "group" => Command::Group {
            drag: index(&args, 0)?,
            drop: index(&args, 1)?,
        },
        "add-to-group" => Command::AddToGroup {
            drag: index(&args, 0)?,
            group: index(&args, 1)?,
        },
        "ungroup" => Command::Ungroup(index(&args, 0)?),
        "pop" => Command::Pop {
            group: index(&args, 0)?,
            sub: index(&args, 1)?,
        },
        "move-out" => Command::MoveOut {
            group: index(&args, 0)?,
            sub: index(&args, 1)?,
            target: index(&args, 2)?,
        },
        "reorder-group" => Command::ReorderGroup {
            group: index(&args, 0)?,
            drag: index(&args, 1)?,
            drop: index(&args, 2)?,
        },
        "rename" => {
            let (group, name) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| anyhow!("usage: rename <group> <name>"))?;
            Command::Rename {
                group: group.parse().context("group must be a tab number")?,
                name: name.trim().to_string(),
            }
        }
        "select-mode" => match args.first().copied() {
            Some("on") => Command::SelectionMode(true),
            Some("off") => Command::SelectionMode(false),
            _ => bail!("usage: select-mode <on|off>"),
        },
        "toggle" => Command::Toggle(index(&args, 0)?),
        "group-selected" => Command::GroupSelected,
        "add-selected" => Command::AddSelected(index(&args, 0)?),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command `{}` (try `help`)", other),
    };
    Ok(Some(command))
}

/// Respell typed book names the way the reference table does, so `ref`
/// accepts the same input as `verse`. Unknown books pass through unchanged.
pub fn canonicalize(command: Command, books: &dyn ReferenceTable) -> Command {
    match command {
        Command::Study(StudyItem::Reference {
            book,
            chapter,
            start_verse,
            end_verse,
        }) => {
            let book = books.canonical_book(&book).unwrap_or(book);
            Command::Study(StudyItem::reference(book, chapter, start_verse, end_verse))
        }
        Command::Verse {
            book,
            chapter,
            verse,
        } => Command::Verse {
            book: books.canonical_book(&book).unwrap_or(book),
            chapter,
            verse,
        },
        other => other,
    }
}

fn text(rest: &str, command: &str) -> Result<String> {
    let rest = rest.trim();
    if rest.is_empty() {
        bail!("usage: {} <text>", command);
    }
    Ok(rest.to_string())
}

fn index(args: &[&str], position: usize) -> Result<usize> {
    optional_index(args, position)?.ok_or_else(|| anyhow!("missing tab number"))
}

fn optional_index(args: &[&str], position: usize) -> Result<Option<usize>> {
    args.get(position)
        .map(|raw| {
            raw.parse::<usize>()
                .with_context(|| format!("`{}` is not a tab number", raw))
        })
        .transpose()
}

/// `"1 John 4:7-12"` -> `("1 John", 4, 7, 12)`
fn parse_reference(rest: &str) -> Result<(String, u32, u32, u32)> {
    let (book, location) = rest
        .trim()
        .rsplit_once(char::is_whitespace)
        .ok_or_else(|| anyhow!("usage: <book> <chapter>:<verse>[-<verse>]"))?;
    let (chapter, verses) = location
        .split_once(':')
        .ok_or_else(|| anyhow!("expected <chapter>:<verse>, got `{}`", location))?;
    let chapter: u32 = chapter.parse().context("chapter must be a number")?;
    let (start, end) = match verses.split_once('-') {
        Some((start, end)) => (start, end),
        None => (verses, verses),
    };
    let start: u32 = start.parse().context("verse must be a number")?;
    let end: u32 = end.parse().context("verse must be a number")?;
    Ok((book.trim().to_string(), chapter, start, end))
}
