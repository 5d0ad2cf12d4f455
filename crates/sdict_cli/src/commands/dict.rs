//! Dictionary commands.

use super::Format;
use sdict_engine::{ClientConfig, SimpleDict};
use sdict_io::Transport;

type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn open(config: &ClientConfig) -> SimpleDict {
    SimpleDict::new(Transport::new(config.dict_transport()), config.dict_config())
}

/// Opens a session and loads the dictionary, from cache when possible.
fn loaded(config: &ClientConfig) -> Result<SimpleDict, Box<dyn std::error::Error>> {
    let mut dict = open(config);
    dict.fetch(false)?;
    Ok(dict)
}

/// Runs the fetch command.
pub fn fetch(config: &ClientConfig, force: bool) -> CommandResult {
    let outcome = open(config).fetch(force)?;
    let source = if outcome.is_cached() { "cache" } else { "server" };
    println!("{} entries (from {source})", outcome.entries());
    Ok(())
}

/// Runs the get command.
pub fn get(config: &ClientConfig, key: &str) -> CommandResult {
    let dict = loaded(config)?;
    let value = dict.get(key).ok_or_else(|| format!("Key not found: {key}"))?;
    println!("{value}");
    Ok(())
}

/// Runs the set command.
pub fn set(config: &ClientConfig, key: &str, value: &str) -> CommandResult {
    let mut dict = loaded(config)?;
    dict.set(key, value)?;
    println!("Set {key}");
    Ok(())
}

/// Runs the del command.
pub fn del(config: &ClientConfig, key: &str) -> CommandResult {
    let mut dict = loaded(config)?;
    dict.del(key)?;
    println!("Deleted {key}");
    Ok(())
}

/// Runs the search command.
pub fn search(config: &ClientConfig, text: &str, format: Format) -> CommandResult {
    let dict = loaded(config)?;
    let entries: Vec<(String, String)> = dict
        .search(text)
        .into_iter()
        .map(|key| {
            let value = dict.get(&key).unwrap_or_default().to_owned();
            (key, value)
        })
        .collect();
    println!("{}", render_entries(&entries, format)?);
    Ok(())
}

/// Runs the latest command. Newest keys come first.
pub fn latest(config: &ClientConfig, limit: usize, format: Format) -> CommandResult {
    let dict = loaded(config)?;
    let entries: Vec<(String, String)> = dict
        .latest_keys()
        .iter()
        .rev()
        .take(limit)
        .map(|key| (key.clone(), dict.get(key).unwrap_or_default().to_owned()))
        .collect();
    println!("{}", render_entries(&entries, format)?);
    Ok(())
}

fn render_entries(entries: &[(String, String)], format: Format) -> Result<String, serde_json::Error> {
    match format {
        Format::Text => Ok(entries
            .iter()
            .map(|(key, value)| format!("{key}\t{value}"))
            .collect::<Vec<_>>()
            .join("\n")),
        Format::Json => {
            let list: Vec<serde_json::Value> = entries
                .iter()
                .map(|(key, value)| serde_json::json!({ "key": key, "value": value }))
                .collect();
            serde_json::to_string_pretty(&list)
        }
    }
}
