//! Interactive configuration wizard.
//!
//! Walks every known key in template order. Pressing enter keeps the value
//! shown in brackets; `-` clears an optional value. Only the client id is
//! required.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use simplerpc_core::config::{
    ACTIVITY_TYPE, BUTTON2_LABEL, BUTTON2_URL, BUTTON_LABEL, BUTTON_URL, CLIENT_ID, DETAILS,
    LARGE_IMAGE_KEY, LARGE_IMAGE_TEXT, SMALL_IMAGE_KEY, SMALL_IMAGE_TEXT, STATE,
};
use simplerpc_core::{ConfigError, ConfigStore, EnvFileStore};

use crate::error::CliError;

const CLEAR_TOKEN: &str = "-";

struct Step {
    key: &'static str,
    label: &'static str,
    default: &'static str,
    required: bool,
}

const STEPS: [Step; 12] = [
    Step {
        key: CLIENT_ID,
        label: "Discord Client ID (from the Developer Portal)",
        default: "",
        required: true,
    },
    Step {
        key: DETAILS,
        label: "Activity details (first line)",
        default: "Playing a game",
        required: false,
    },
    Step {
        key: STATE,
        label: "Activity state (second line)",
        default: "In a match",
        required: false,
    },
    Step {
        key: ACTIVITY_TYPE,
        label: "Activity type (0=Playing, 1=Streaming, 2=Listening, 3=Watching, 5=Competing)",
        default: "0",
        required: false,
    },
    Step {
        key: LARGE_IMAGE_KEY,
        label: "Large image key",
        default: "",
        required: false,
    },
    Step {
        key: LARGE_IMAGE_TEXT,
        label: "Large image hover text",
        default: "",
        required: false,
    },
    Step {
        key: SMALL_IMAGE_KEY,
        label: "Small image key",
        default: "",
        required: false,
    },
    Step {
        key: SMALL_IMAGE_TEXT,
        label: "Small image hover text",
        default: "",
        required: false,
    },
    Step {
        key: BUTTON_LABEL,
        label: "First button label",
        default: "",
        required: false,
    },
    Step {
        key: BUTTON_URL,
        label: "First button URL",
        default: "",
        required: false,
    },
    Step {
        key: BUTTON2_LABEL,
        label: "Second button label",
        default: "",
        required: false,
    },
    Step {
        key: BUTTON2_URL,
        label: "Second button URL",
        default: "",
        required: false,
    },
];

/// Runs the wizard and saves the answers. With `reset`, the existing file is
/// deleted first and no previous values are offered.
pub fn run<R, W>(store: &mut EnvFileStore, reset: bool, mut input: R, mut out: W) -> Result<(), CliError>
where
    R: BufRead,
    W: Write,
{
    if reset {
        store.clear()?;
        writeln!(out, "Configuration reset.")?;
    }

    writeln!(out, "SimpleRPC setup ({} steps)", STEPS.len())?;
    writeln!(out, "Press enter to keep the value in brackets, '-' to clear it.")?;
    writeln!(out)?;

    let mut values: BTreeMap<String, String> = store.values().clone();

    for (index, step) in STEPS.iter().enumerate() {
        let current = store
            .get(step.key)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| step.default.to_string());

        loop {
            write!(out, "{}/{} {} [{}]: ", index + 1, STEPS.len(), step.label, current)?;
            out.flush()?;

            let mut line = String::new();
            let at_eof = input.read_line(&mut line)? == 0;
            let answer = line.trim();

            let chosen = match answer {
                "" => current.clone(),
                CLEAR_TOKEN => String::new(),
                other => other.to_string(),
            };

            if step.required && chosen.is_empty() {
                if at_eof {
                    writeln!(out)?;
                    return Err(ConfigError::MissingClientId.into());
                }
                writeln!(out, "  A value is required.")?;
                continue;
            }

            values.insert(step.key.to_string(), chosen);
            break;
        }
    }

    store.set_all(&values)?;
    writeln!(out)?;
    writeln!(out, "Configuration saved to {}", store.path().display())?;
    Ok(())
}
