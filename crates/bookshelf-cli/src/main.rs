use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use bookshelf_core::{
    AppConfig, Book, BookshelfError, CatalogManager, ExitCode, FnObserver, Library, Memento,
    ReadingState, SortCriteria,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "bookshelf",
    about = "Personal book catalog with undo/redo",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format.
    #[arg(long, global = true)]
    json: bool,

    /// Catalog database to use instead of the configured one.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Listing order: none, title-asc, title-desc, author-asc, author-desc,
    /// rating-asc, rating-desc.
    #[arg(long, global = true)]
    sort: Option<SortCriteria>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all books in the catalog.
    List,

    /// Add a book to the catalog.
    Add {
        title: String,
        author: String,
        #[command(flatten)]
        fields: BookFields,
    },

    /// Case-insensitive substring search.
    Search {
        #[arg(value_enum)]
        field: SearchField,
        query: String,
    },

    /// Exact-match filters.
    Filter {
        #[command(subcommand)]
        by: FilterBy,
    },

    /// Change fields of a book.
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[command(flatten)]
        fields: BookFields,
    },

    /// Delete a book.
    Delete { id: i64 },

    /// Replace the whole catalog with another database file.
    Import { file: PathBuf },

    /// Write a copy of the catalog to a database file.
    Export { file: PathBuf },

    /// Interactive session with undo/redo.
    Shell,

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
struct BookFields {
    #[arg(long)]
    isbn: Option<String>,
    #[arg(long)]
    genre: Option<String>,
    /// 0 to 5.
    #[arg(long)]
    rating: Option<u8>,
    /// da leggere | in lettura | letto (or unread | reading | read).
    #[arg(long)]
    state: Option<ReadingState>,
    #[arg(long)]
    cover: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchField {
    Title,
    Author,
}

#[derive(Subcommand)]
enum FilterBy {
    /// Books with exactly this rating.
    Rating { rating: u8 },
    /// Books in this reading state.
    State { state: ReadingState },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print the config file location.
    Path,
    /// Write a default config file.
    Init {
        #[arg(long)]
        force: bool,
    },
}

// ─── Main ────────────────────────────────────────────────────────────────────

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        let code = err
            .downcast_ref::<BookshelfError>()
            .map(ExitCode::from)
            .unwrap_or(ExitCode::GeneralError);
        eprintln!("error: {err:#}");
        std::process::exit(code as i32);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let start = Instant::now();
    let mut config = AppConfig::load()?;
    if let Some(db) = &cli.db {
        config.core.database_path = db.to_string_lossy().to_string();
    }
    let sort = cli.sort.unwrap_or(config.ui.default_sort);
    let json_output = cli.json;
    tracing::debug!(db = %config.database_path().display(), ?sort, "resolved settings");

    let open = || Library::open(&config);

    match cli.command {
        Commands::Config { action } => run_config(action, &config, json_output)?,

        Commands::Shell => run_shell(&mut open()?, sort)?,

        Commands::List => {
            let books = open()?.manager().get_all_books(sort)?;
            print_books(&books, json_output, start, "No books in the catalog. Use `bookshelf add` to add one.")?;
        }

        Commands::Add { title, author, fields } => {
            let mut book = fields.apply(Book::builder(title, author)).build()?;
            let mut library = open()?;
            library.manager_mut().add_book(&mut book)?;
            print_book(&book, json_output, start, "Added")?;
        }

        Commands::Search { field, query } => {
            let library = open()?;
            let manager = library.manager();
            let books = match field {
                SearchField::Title => manager.find_books_by_title(&query, sort)?,
                SearchField::Author => manager.find_books_by_author(&query, sort)?,
            };
            print_books(&books, json_output, start, &format!("No results for: {query}"))?;
        }

        Commands::Filter { by } => {
            let library = open()?;
            let manager = library.manager();
            let books = match by {
                FilterBy::Rating { rating } => manager.filter_books_by_rating(rating, sort)?,
                FilterBy::State { state } => manager.filter_books_by_reading_state(state, sort)?,
            };
            print_books(&books, json_output, start, "No matching books.")?;
        }

        Commands::Update { id, title, author, fields } => {
            let mut library = open()?;
            let manager = library.manager_mut();
            let old = manager.get_book(id)?;
            let mut builder = fields.apply(old.to_builder());
            if let Some(t) = title {
                builder = builder.title(t);
            }
            if let Some(a) = author {
                builder = builder.author(a);
            }
            let new = builder.build()?;
            manager.update_book(&old, &new)?;
            print_book(&new, json_output, start, "Updated")?;
        }

        Commands::Delete { id } => {
            let mut library = open()?;
            let manager = library.manager_mut();
            let book = manager.get_book(id)?;
            manager.delete_book(&book)?;
            print_book(&book, json_output, start, "Deleted")?;
        }

        Commands::Import { file } => {
            let mut library = open()?;
            library
                .import_database(&file)
                .with_context(|| format!("importing {}", file.display()))?;
            let total = library.manager().count_books()?;
            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":{"imported":file,"total":total},"meta":{"duration_ms":dur}}))?;
            } else {
                println!("Imported {} ({total} books).", file.display());
            }
        }

        Commands::Export { file } => {
            let library = open()?;
            library
                .export_database(&file)
                .with_context(|| format!("exporting to {}", file.display()))?;
            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":{"exported":file},"meta":{"duration_ms":dur}}))?;
            } else {
                println!("Exported catalog to {}.", file.display());
            }
        }
    }

    Ok(())
}

impl BookFields {
    fn apply(self, mut builder: bookshelf_core::BookBuilder) -> bookshelf_core::BookBuilder {
        if let Some(isbn) = self.isbn {
            builder = builder.isbn(isbn);
        }
        if let Some(genre) = self.genre {
            builder = builder.genre(genre);
        }
        if let Some(rating) = self.rating {
            builder = builder.rating(rating);
        }
        if let Some(state) = self.state {
            builder = builder.reading_state(state);
        }
        if let Some(cover) = self.cover {
            builder = builder.cover_path(cover);
        }
        builder
    }
}

// ─── Config ──────────────────────────────────────────────────────────────────

fn run_config(action: ConfigAction, config: &AppConfig, json_output: bool) -> Result<()> {
    let path = AppConfig::config_path();
    match action {
        ConfigAction::Show => {
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":config}))?;
            } else {
                print!("{}", toml::to_string_pretty(config)?);
            }
        }
        ConfigAction::Path => {
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":{"path":path,"exists":path.exists()}}))?;
            } else {
                println!("{}", path.display());
            }
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            AppConfig::default().save_to(&path)?;
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":{"path":path}}))?;
            } else {
                println!("Wrote {}", path.display());
            }
        }
    }
    Ok(())
}

// ─── Interactive shell ──────────────────────────────────────────────────────

const SHELL_HELP: &str = "\
commands:
  list                          show the catalog
  add <title> | <author> [| <rating>]
  rate <id> <0-5>
  state <id> <da leggere|in lettura|letto>
  delete <id>
  undo / redo
  history                       show what undo/redo would do
  help
  quit";

fn run_shell(library: &mut Library, sort: SortCriteria) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    shell_loop(library, sort, stdin.lock(), &mut stdout.lock())
}

/// Read commands from `input` until it ends or the user quits. Failing
/// commands and failing refreshes are reported and the session goes on.
fn shell_loop(
    library: &mut Library,
    sort: SortCriteria,
    input: impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    // the view: flags the listing as stale whenever the catalog changes
    let stale = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stale);
    library.manager().attach(Arc::new(FnObserver::new(move || {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    })));

    writeln!(out, "bookshelf shell. Type `help` for commands.")?;
    let mut lines = input.lines();
    loop {
        write!(out, "bookshelf> ")?;
        out.flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }

        if let Err(err) = shell_command(library.manager_mut(), line, sort, out) {
            writeln!(out, "error: {err:#}")?;
        }
        if stale.swap(false, Ordering::SeqCst) {
            match library.manager().get_all_books(sort) {
                Ok(books) => write_table(out, &books)?,
                Err(err) => writeln!(out, "error: could not refresh the listing: {err:#}")?,
            }
        }
    }
    Ok(())
}

fn shell_command(
    manager: &mut CatalogManager,
    line: &str,
    sort: SortCriteria,
    out: &mut impl Write,
) -> Result<()> {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match command {
        "help" => writeln!(out, "{SHELL_HELP}")?,
        "list" => write_table(out, &manager.get_all_books(sort)?)?,
        "add" => {
            let parts: Vec<&str> = rest.split('|').map(str::trim).collect();
            let (title, author) = match parts.as_slice() {
                [title, author, ..] => (*title, *author),
                _ => bail!("usage: add <title> | <author> [| <rating>]"),
            };
            let mut builder = Book::builder(title, author);
            if let Some(rating) = parts.get(2) {
                builder = builder.rating(rating.parse().context("rating must be a number")?);
            }
            let mut book = builder.build()?;
            manager.add_book(&mut book)?;
        }
        "rate" | "state" => {
            let (id, value) = rest
                .split_once(' ')
                .with_context(|| format!("usage: {command} <id> <value>"))?;
            let old = manager.get_book(id.parse().context("id must be a number")?)?;
            let builder = old.to_builder();
            let new = if command == "rate" {
                builder.rating(value.trim().parse().context("rating must be a number")?)
            } else {
                builder.reading_state(value.parse()?)
            }
            .build()?;
            manager.update_book(&old, &new)?;
        }
        "delete" => {
            let book = manager.get_book(rest.parse().context("id must be a number")?)?;
            manager.delete_book(&book)?;
        }
        "undo" => match manager.undo()? {
            Some(memento) => writeln!(out, "undid: {}", memento.description())?,
            None => writeln!(out, "nothing to undo")?,
        },
        "redo" => match manager.redo()? {
            Some(memento) => writeln!(out, "redid: {}", memento.description())?,
            None => writeln!(out, "nothing to redo")?,
        },
        "history" => {
            let history = manager.history();
            match history.peek_undo() {
                Some(m) => writeln!(out, "undo ({}): {}", history.undo_len(), history_line(m))?,
                None => writeln!(out, "undo: empty")?,
            }
            match history.peek_redo() {
                Some(m) => writeln!(out, "redo ({}): {}", history.redo_len(), history_line(m))?,
                None => writeln!(out, "redo: empty")?,
            }
        }
        other => bail!("unknown command `{other}` (type `help`)"),
    }
    Ok(())
}

fn history_line(memento: &Memento) -> String {
    format!(
        "{} (recorded {})",
        memento.description(),
        memento.recorded_at().format("%H:%M:%S UTC")
    )
}

// ─── Output ──────────────────────────────────────────────────────────────────

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn print_books(books: &[Book], json_output: bool, start: Instant, empty_message: &str) -> Result<()> {
    let dur = start.elapsed().as_millis();
    if json_output {
        print_json(&serde_json::json!({
            "status": "ok",
            "data": { "items": books, "total": books.len() },
            "meta": { "duration_ms": dur }
        }))?;
    } else if books.is_empty() {
        println!("{empty_message}");
    } else {
        write_table(&mut std::io::stdout().lock(), books)?;
    }
    Ok(())
}

fn print_book(book: &Book, json_output: bool, start: Instant, verb: &str) -> Result<()> {
    let dur = start.elapsed().as_millis();
    if json_output {
        print_json(&serde_json::json!({"status":"ok","data":book,"meta":{"duration_ms":dur}}))?;
    } else {
        let id = book.id().map(|id| id.to_string()).unwrap_or_default();
        println!("{verb}: {book} ({id})");
    }
    Ok(())
}

fn write_table(out: &mut impl Write, books: &[Book]) -> std::io::Result<()> {
    for book in books {
        writeln!(
            out,
            "{id:>4}  {title:<40}  {author:<25}  {rating}/5  {state}",
            id = book.id().unwrap_or_default(),
            title = book.title(),
            author = book.author(),
            rating = book.rating(),
            state = book.reading_state(),
        )?;
    }
    Ok(())
}
