//! NSF inspection CLI
//!
//! Usage:
//!   nsf-inspect app.nsf                  # Summary, design and diagnostics
//!   nsf-inspect app.nsf --json           # Whole model as JSON
//!   nsf-inspect app.nsf --design-only    # Skip document notes

use std::path::PathBuf;
use std::process;

use clap::Parser;
use nsf_reader::{Application, NsfReader, ParseOptions, ParsedDatabase};

#[derive(Parser)]
#[command(name = "nsf-inspect")]
#[command(about = "Inspect the forms, views, documents and ACL of an NSF container")]
struct Args {
    /// Container file to read
    file: PathBuf,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,

    /// Decode design notes only, skipping documents
    #[arg(long)]
    design_only: bool,

    /// Maximum nesting of note directories
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .target(env_logger::Target::Stderr)
        .init();

    let mut options = ParseOptions::default().with_documents(!args.design_only);
    if let Some(depth) = args.max_depth {
        options = options.with_max_directory_depth(depth);
    }

    let parsed = match NsfReader::new(options).read_file(&args.file) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("ERROR: Failed to read {}", args.file.display());
            eprintln!("  {}", e);
            process::exit(1);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&parsed) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("ERROR: Failed to serialize model: {}", e);
                process::exit(1);
            }
        }
    } else {
        print_report(&parsed);
    }
}

fn print_report(parsed: &ParsedDatabase) {
    let app = parsed.application();
    print_summary(app);

    println!("\nForms ({}):", app.forms().len());
    for form in app.forms() {
        let parent = form
            .parent
            .map(|p| format!(" extends {}", p))
            .unwrap_or_default();
        println!("  [{}] {}{}", form.id, form.name, parent);
        for field in app.effective_fields(form.id) {
            let required = if field.required { " (required)" } else { "" };
            println!("      {}: {:?}{}", field.name, field.kind, required);
        }
    }

    println!("\nViews ({}):", app.views().len());
    let default_view = app.default_view().map(|v| v.id);
    for view in app.views() {
        let marker = if Some(view.id) == default_view { " (default)" } else { "" };
        println!("  [{}] {}{}", view.id, view.name, marker);
        if let Some(formula) = &view.selection_formula {
            println!("      SELECT {}", formula);
        }
        for column in &view.columns {
            println!(
                "      {} <- {} width={}{}",
                column.title,
                column.field.as_deref().unwrap_or("(formula)"),
                column.width,
                if column.hidden { " hidden" } else { "" }
            );
        }
        let sorted: Vec<String> = view
            .sort_columns()
            .map(|c| format!("{} {:?}", c.title, c.sort))
            .collect();
        if !sorted.is_empty() {
            println!("      sorted by: {}", sorted.join(", "));
        }
        let categories: Vec<&str> = view.categorized_columns().map(|c| c.title.as_str()).collect();
        if !categories.is_empty() {
            println!("      categorized by: {}", categories.join(", "));
        }
    }

    println!("\nDocuments: {}", app.documents().len());
    for form in app.forms() {
        let count = app.documents_by_form(form.id).count();
        if count > 0 {
            println!("  {}: {}", form.name, count);
        }
    }
    for document in app.documents() {
        let fields: Vec<String> = document
            .fields
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value.kind_name()))
            .collect();
        println!("  [{}] {}", document.id, fields.join(", "));
    }

    println!("\nACL ({}):", app.acl().len());
    for entry in app.acl() {
        println!("  {}: {:?}", entry.principal, entry.level);
    }

    let diagnostics = parsed.diagnostics();
    println!("\nDiagnostics ({}):", diagnostics.len());
    for diagnostic in diagnostics {
        println!("  {}", diagnostic);
    }
}

fn print_summary(app: &Application) {
    println!("{}", "=".repeat(60));
    println!("Application: {}", app.name());
    println!("  Id: {}", app.id());
    println!("  Structure version: {}", app.version());
    println!("  Class: {:#06x}", app.class());
    println!("  Created: {}", app.created().to_rfc3339());
    println!("  Modified: {}", app.modified().to_rfc3339());
    println!("{}", "=".repeat(60));
}
