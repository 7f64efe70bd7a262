use anyhow::{bail, Context, Result};
use futures::TryStreamExt;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};
use translation_store::config::Config;
use translation_store::flatten::flatten_json;
use translation_store::retry::{with_store_retry, RetryConfig};
use translation_store::{EntryStream, MergeReport, MergeRequest, PageRequest, TranslationStore};

fn print_usage() {
    println!(
        r#"Translation store

USAGE:
    translation-store <COMMAND> [ARGS]

COMMANDS:
    import <locale> <group> <file.json> [--namespace <ns>]
                                   Merge a (possibly nested) JSON file into one group
    untranslated <locale> [--from <reference>] [--filter <text>]
                                   Entries of the reference locale missing from <locale>
    sample <locale> [--from <reference>]
                                   One untranslated entry, drawn uniformly
    search <locale> <partial>      Search by partial code, e.g. "mess.greet" or "::valid"
    pending <locale>               Entries that need review after a default-locale change
    translate <source> <target> <text>
                                   Existing <target> translations of an exact <source> text
    help                           Show this message

ENVIRONMENT:
    DATABASE_URL                   (default sqlite://data/translations.db)
    DEFAULT_LOCALE                 (default en)
    DATABASE_MAX_CONNECTIONS       (default 5)
    DATABASE_BUSY_TIMEOUT_MS       (default 5000)
    PAGE_SIZE                      (default 50)

Output is one JSON document per line."#
    );
}

/// Value following `--name` in the argument list
fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Positional arguments after the command, skipping `--flag value` pairs
fn positionals(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter().skip(2);
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            iter.next();
        } else {
            out.push(arg.as_str());
        }
    }
    out
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

async fn print_stream(mut stream: EntryStream<'_>) -> Result<usize> {
    let mut count = 0;
    while let Some(entry) = stream.try_next().await? {
        print_json(&entry)?;
        count += 1;
    }
    Ok(count)
}

async fn import_command(store: &TranslationStore, args: &[String]) -> Result<()> {
    let &[locale, group, file] = positionals(args).as_slice() else {
        bail!("usage: import <locale> <group> <file.json> [--namespace <ns>]");
    };

    let raw = std::fs::read_to_string(Path::new(file))
        .with_context(|| format!("Failed to read {}", file))?;
    let json: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", file))?;

    let mut request = MergeRequest::new(locale, group, flatten_json(&json));
    if let Some(namespace) = flag_value(args, "--namespace") {
        request = request.with_namespace(namespace);
    }

    let report = store.merge(request.clone()).await?;
    print_json(&report)?;

    let retry_lines = report.retryable_lines(&request);
    if !retry_lines.is_empty() {
        warn!("Re-merging {} item(s) that hit transient errors", retry_lines.len());
        let retry_request = MergeRequest {
            lines: retry_lines,
            ..request
        };
        let retried: MergeReport =
            with_store_retry(&RetryConfig::merge_item(), "Re-merge", || async {
                store.merge(retry_request.clone()).await?.ensure_complete()
            })
            .await?;
        print_json(&retried)?;
    }

    report_unrecoverable(&report)?;
    info!("Store metrics: {}", serde_json::to_string(&store.metrics())?);
    Ok(())
}

/// Fail the run if the merge had failures no retry could fix
fn report_unrecoverable(report: &MergeReport) -> Result<()> {
    if report.is_complete() || report.is_retryable() {
        return Ok(());
    }
    let failed: Vec<String> = report.failed_keys().iter().map(|k| k.render()).collect();
    bail!(
        "{} item(s) could not be merged: {}",
        failed.len(),
        failed.join(", ")
    )
}

async fn untranslated_command(store: &TranslationStore, args: &[String]) -> Result<()> {
    let &[target] = positionals(args).as_slice() else {
        bail!("usage: untranslated <locale> [--from <reference>] [--filter <text>]");
    };
    let reference = flag_value(args, "--from").unwrap_or(store.default_locale());

    let count = print_stream(store.untranslated(reference, target, flag_value(args, "--filter")))
        .await?;
    info!("{} entr(ies) of '{}' missing from '{}'", count, reference, target);
    Ok(())
}

async fn sample_command(store: &TranslationStore, args: &[String]) -> Result<()> {
    let &[target] = positionals(args).as_slice() else {
        bail!("usage: sample <locale> [--from <reference>]");
    };
    let reference = flag_value(args, "--from").unwrap_or(store.default_locale());

    match store.random_untranslated(reference, target).await? {
        Some(entry) => print_json(&entry),
        None => {
            info!("'{}' has nothing left to translate from '{}'", target, reference);
            Ok(())
        }
    }
}

async fn search_command(store: &TranslationStore, args: &[String]) -> Result<()> {
    let &[locale, partial] = positionals(args).as_slice() else {
        bail!("usage: search <locale> <partial>");
    };
    let count = print_stream(store.search(locale, partial)).await?;
    info!("{} match(es) for '{}' in '{}'", count, partial, locale);
    Ok(())
}

async fn pending_command(store: &TranslationStore, config: &Config, args: &[String]) -> Result<()> {
    let &[locale] = positionals(args).as_slice() else {
        bail!("usage: pending <locale>");
    };

    let mut request = PageRequest::new(config.page_size);
    let mut total = 0;
    loop {
        let page = store.pending_review_page(locale, &request).await?;
        total += page.len();
        for entry in &page.items {
            print_json(entry)?;
        }
        if page.is_last() {
            break;
        }
        request = request.after(page.next);
    }

    info!("{} entr(ies) of '{}' need review", total, locale);
    Ok(())
}

async fn translate_command(store: &TranslationStore, args: &[String]) -> Result<()> {
    let &[source, target, text] = positionals(args).as_slice() else {
        bail!("usage: translate <source> <target> <text>");
    };
    for translation in store.translate_text(text, source, target).await? {
        print_json(&translation)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays JSON lines
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_store=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else {
        print_usage();
        return Ok(());
    };
    if matches!(command.as_str(), "--help" | "-h" | "help") {
        print_usage();
        return Ok(());
    }

    let config = Config::from_env()?;
    let store = with_store_retry(&RetryConfig::database_open(), "Open database", || {
        TranslationStore::connect(&config)
    })
    .await
    .with_context(|| format!("Failed to open {}", config.database_url))?;

    match command.as_str() {
        "import" => import_command(&store, &args).await,
        "untranslated" => untranslated_command(&store, &args).await,
        "sample" => sample_command(&store, &args).await,
        "search" => search_command(&store, &args).await,
        "pending" => pending_command(&store, &config, &args).await,
        "translate" => translate_command(&store, &args).await,
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }
}
