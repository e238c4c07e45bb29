//! Seeds a small configuration tree into a store and runs a few queries
//! against it, printing what it finds.
//!
//! Settings are read from `holdall.toml` in the working directory when it
//! exists (`HOLDALL_CONFIG` points elsewhere) and overridden by `HOLDALL__*`
//! environment variables. Without a `database` setting the tree lives in an
//! in-memory SQLite database.

use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use holdall::{
    Backend, Comparator, Criterion, Entry, Result, Settings, SqlBackend, Store, Value,
};

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn seed<B: Backend>(store: &mut Store<B>) -> Result<()> {
    let server = store.save(&Entry::new("server", Value::None))?;
    store.save(&Entry::new("host", "localhost").child_of(&server))?;
    let port = store.save(&Entry::new("port", 8080).child_of(&server))?;
    store.save(&Entry::new("secure", false).child_of(&server))?;
    let client = store.save(&Entry::new("client", Value::None))?;
    store.save(&Entry::new("port", Value::reference(port.id)).child_of(&client))?;
    store.save(&Entry::new("retries", 3).child_of(&client))?;
    Ok(())
}

fn show<B: Backend>(store: &Store<B>, title: &str, criterion: &Criterion) -> Result<()> {
    println!("{title}");
    for entry in store.query(criterion)? {
        println!("  {} = {}", entry, store.render(&entry.value)?);
        for child in &entry.children {
            println!("    {} = {}", child.name, store.render(&child.value)?);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let path = env::var("HOLDALL_CONFIG").unwrap_or_else(|_| "holdall.toml".into());
    let settings = Settings::load(&path)?;
    init_tracing(&settings.log_level);
    info!(config = %path, "starting holdall");

    let backend = match &settings.database {
        Some(database) => SqlBackend::open(database, settings.schema.clone())?,
        None => SqlBackend::open_in_memory(settings.schema.clone())?,
    };
    let mut store = Store::new(backend, settings.behavior)?;
    if store.query(&Criterion::identifier(Comparator::GreaterThan, 0))?.is_empty() {
        seed(&mut store)?;
    }

    show(
        &store,
        "Top level entries:",
        &Criterion::name(Comparator::Equal, "server").or(Criterion::name(Comparator::Equal, "client")),
    )?;
    show(
        &store,
        "Ports above 1024, references included:",
        &Criterion::name(Comparator::Equal, "port")
            .and(Criterion::value(Comparator::GreaterThan, 1024)),
    )?;
    show(
        &store,
        "Names starting with 'r' or 's':",
        &Criterion::name(Comparator::StartsWith, "r").or(Criterion::name(Comparator::StartsWith, "s")),
    )?;
    Ok(())
}
