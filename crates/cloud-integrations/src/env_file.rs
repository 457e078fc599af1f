//! `.env` token persistence
//!
//! OAuth tools write fresh tokens back into the `.env` file the server
//! reads at start-up. Existing `KEY=` lines are rewritten in place;
//! missing keys are appended.

use std::path::Path;

use tracing::info;

use crate::errors::IntegrationError;

/// Rewrite or append `KEY=value` lines in the file at `path`
pub fn update_env_file(path: &Path, updates: &[(&str, &str)]) -> Result<(), IntegrationError> {
    let existing = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let updated = apply_updates(&existing, updates);
    std::fs::write(path, updated)?;

    let keys: Vec<&str> = updates.iter().map(|(k, _)| *k).collect();
    info!("Updated {} in {}", keys.join(", "), path.display());
    Ok(())
}

fn apply_updates(content: &str, updates: &[(&str, &str)]) -> String {
    let mut written = vec![false; updates.len()];
    let mut lines: Vec<String> = content
        .lines()
        .map(|line| {
            let key = line
                .trim_start()
                .trim_start_matches("export ")
                .split('=')
                .next()
                .unwrap_or("")
                .trim();
            match updates.iter().position(|(k, _)| *k == key) {
                Some(i) if !line.trim_start().starts_with('#') => {
                    written[i] = true;
                    format!("{}={}", updates[i].0, updates[i].1)
                }
                _ => line.to_string(),
            }
        })
        .collect();

    for (i, (key, value)) in updates.iter().enumerate() {
        if !written[i] {
            lines.push(format!("{}={}", key, value));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
