use std::path::PathBuf;

use clap::{Parser, Subcommand};
use notegraph::{
    Criterion, Field, FsStore, Logic, MetadataPatch, NotePath, Page, RebuildReport, Relations,
    SortDir, SortKey, Wiki, WikiService,
};

#[derive(Debug, Parser)]
#[command(name = "ngr", version, about = "Wiki metadata filtering + link graph CLI")]
struct Cli {
    /// Path to the wiki root.
    #[arg(long, env = "NOTEGRAPH_WIKI", global = true)]
    wiki: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Filter notes by metadata criteria.
    Filter(FilterCommand),
    /// Links extracted from a note's content.
    Links {
        /// Relative note path.
        #[arg(long)]
        note: String,
    },
    /// Recompute kids, ancestors, used links and links-to-here for every note.
    Rebuild,
    /// Link relations of one note.
    Show {
        #[arg(long)]
        note: String,
    },
    /// List filterable fields.
    Fields,
    /// Write the initial metadata record for a note.
    Init {
        #[arg(long)]
        note: String,
    },
    /// Set a single metadata field.
    Set {
        #[arg(long)]
        note: String,

        /// Field name (display, internal or alias).
        #[arg(long)]
        field: String,

        /// New value; list fields take comma-separated items.
        #[arg(long)]
        value: String,
    },
}

#[derive(Debug, clap::Args)]
struct FilterCommand {
    /// Include criterion (repeatable): field:operator:value.
    #[arg(long = "where")]
    include: Vec<String>,

    /// Exclude criterion (repeatable): field:operator:value.
    #[arg(long)]
    exclude: Vec<String>,

    /// Combine criteria with OR instead of AND.
    #[arg(long)]
    or: bool,

    /// Sort by field name (or "path").
    #[arg(long)]
    sort: Option<String>,

    /// Sort descending.
    #[arg(long)]
    desc: bool,

    /// Maximum number of results.
    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Fields => handle_fields(cli.json)?,
        command => {
            let wiki = Wiki::open(require_wiki(cli.wiki)?)?;
            handle_wiki(WikiService::open(wiki), command, cli.json).await?;
        }
    }

    Ok(())
}

async fn handle_wiki(
    service: WikiService<FsStore>,
    command: Command,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        Command::Fields => handle_fields(json)?,
        Command::Filter(command) => handle_filter(&service, command, json)?,
        Command::Links { note } => {
            let links = service.note_links(&note_path(&note)?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&links)?);
            } else {
                for link in links {
                    println!("{link}");
                }
            }
        }
        Command::Rebuild => {
            let report = service.rebuild_links_blocking().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Command::Show { note } => {
            let rel = service.relations(&note_path(&note)?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rel)?);
            } else {
                print_relations(&rel);
            }
        }
        Command::Init { note } => {
            let rec = service.initialize(&note_path(&note)?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rec)?);
            } else {
                println!("initialized {}", rec.path);
            }
        }
        Command::Set { note, field, value } => {
            let path = note_path(&note)?;
            let f = Field::from_token(&field)
                .ok_or_else(|| anyhow::anyhow!("unknown field: {field}"))?;
            let mut patch = MetadataPatch::for_path(path);
            if !patch.set_field(f, &value) {
                anyhow::bail!("field {} cannot be set to {value:?}", f.display_name());
            }
            let rec = service.save_record(patch)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rec)?);
            } else {
                println!("updated {} {}", rec.path, f.display_name());
            }
        }
    }

    Ok(())
}

fn handle_filter(
    service: &WikiService<FsStore>,
    command: FilterCommand,
    json: bool,
) -> anyhow::Result<()> {
    let mut criteria = Vec::new();
    for raw in &command.include {
        criteria.push(raw.parse::<Criterion>()?);
    }
    for raw in &command.exclude {
        criteria.push(raw.parse::<Criterion>()?.exclude());
    }
    let logic = if command.or { Logic::Or } else { Logic::And };

    let dir = if command.desc {
        SortDir::Desc
    } else {
        SortDir::Asc
    };
    let sort = match command.sort.as_deref() {
        None => None,
        Some(s) if s.trim().eq_ignore_ascii_case("path") => Some((SortKey::Path, dir)),
        Some(s) => {
            let f = Field::from_token(s).ok_or_else(|| anyhow::anyhow!("unknown field: {s}"))?;
            Some((SortKey::Field(f), dir))
        }
    };
    let page = Page {
        sort,
        limit: command.limit,
    };

    let hits = service.filter_page(&criteria, logic, page)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        for rec in hits {
            println!("{}", rec.path);
        }
    }
    Ok(())
}

fn handle_fields(json: bool) -> anyhow::Result<()> {
    if json {
        let table: Vec<_> = Field::ALL.iter().map(|f| f.mapping()).collect();
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }
    for f in Field::ALL {
        let array = if f.is_array() { "array" } else { "scalar" };
        println!("{}\t{}\t{array}", f.display_name(), f.internal_name());
    }
    Ok(())
}

fn print_report(report: &RebuildReport) {
    println!("rebuild");
    println!("  records: {}", report.records);
    println!("  used links: {}", report.used_links);
    println!("  changed: {}", report.changed.len());
    if !report.dangling.is_empty() {
        println!("dangling links ({})", report.dangling.len());
        for d in &report.dangling {
            println!("  {} -> {}", d.source, d.target);
        }
    }
    if !report.missing_parents.is_empty() {
        println!("missing parents ({})", report.missing_parents.len());
        for d in &report.missing_parents {
            println!("  {} -> {}", d.source, d.target);
        }
    }
    if !report.cycles.is_empty() {
        println!("parent cycles ({})", report.cycles.len());
        for p in &report.cycles {
            println!("  {p}");
        }
    }
    for p in &report.unreadable {
        println!("unreadable: {p}");
    }
    for p in &report.damaged {
        println!("damaged metadata (not updated): {p}");
    }
}

fn print_relations(rel: &Relations) {
    println!("{}", rel.path);
    let sections = [
        ("parents", &rel.parents),
        ("kids", &rel.kids),
        ("ancestors", &rel.ancestor),
        ("links", &rel.used_links),
        ("backlinks", &rel.links_to_here),
    ];
    for (name, paths) in sections {
        println!("  {name} ({})", paths.len());
        for p in paths {
            println!("    {p}");
        }
    }
}

fn note_path(raw: &str) -> anyhow::Result<NotePath> {
    Ok(NotePath::try_from(raw)?)
}

fn require_wiki(wiki: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    wiki.ok_or_else(|| anyhow::anyhow!("--wiki is required (or set NOTEGRAPH_WIKI)"))
}
