use clap::Subcommand;
use dayflow_core::Config;
use serde_json::Value;

const REDACTED: &str = "********";

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value (e.g. "day.timezone", "calendar.event_limit")
    Get { key: String },
    /// Change one value and save the file
    Set { key: String, value: String },
    /// Print the whole configuration as JSON, secrets masked
    List {
        /// Print secrets in clear text
        #[arg(long)]
        show_secrets: bool,
    },
    /// Overwrite the file with defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let value = Config::load()?
                .get(&key)
                .ok_or_else(|| format!("unknown key: {key}"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            Config::load()?.set(&key, &value)?;
            println!("ok");
        }
        ConfigAction::List { show_secrets } => {
            let mut json = serde_json::to_value(Config::load()?)?;
            if !show_secrets {
                redact_secrets(&mut json);
            }
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("config reset to defaults");
        }
    }
    Ok(())
}

/// Mask every non-empty string stored under a key naming a secret.
fn redact_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                match child {
                    Value::String(s) if key.ends_with("secret") && !s.is_empty() => {
                        *s = REDACTED.to_string();
                    }
                    _ => redact_secrets(child),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_secrets),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn secrets_are_masked_at_any_depth() {
        let mut value = json!({
            "calendar": { "client_id": "id", "client_secret": "hunter2" },
            "directory": { "base_url": "http://localhost" },
        });
        redact_secrets(&mut value);
        assert_eq!(value["calendar"]["client_secret"], REDACTED);
        assert_eq!(value["calendar"]["client_id"], "id");
        assert_eq!(value["directory"]["base_url"], "http://localhost");
    }

    #[test]
    fn unset_secrets_stay_empty() {
        let mut value = json!({ "calendar": { "client_secret": "" } });
        redact_secrets(&mut value);
        assert_eq!(value["calendar"]["client_secret"], "");
    }
}
