//! Ruleset file management: every ruleset is written to
//! `<config_dir>/coraza/rulesets/<sanitized-name>.conf` with the engine
//! directive prefixed ahead of its content. Rulesets no longer present after
//! a generation are removed so stale files never leak into the WAF's include
//! path.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::config::waf;
use crate::model::{SecurityConfig, SecurityRuleSet};

const RULESETS_DIR: &str = "coraza/rulesets";

fn rulesets_dir(config_dir: &Path) -> PathBuf {
    config_dir.join(RULESETS_DIR)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(unix)]
async fn set_world_readable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await
}

#[cfg(not(unix))]
async fn set_world_readable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Writes every ruleset to disk and returns the name → on-disk-path map the
/// generator resolves `waf` handlers against. On the first failure, returns
/// the name of the ruleset being written alongside the underlying error (an
/// empty name means the rulesets directory itself couldn't be created).
pub async fn write_all(
    config_dir: &Path,
    rulesets: &[SecurityRuleSet],
    security_cfg: &SecurityConfig,
) -> Result<HashMap<String, String>, (String, io::Error)> {
    let dir = rulesets_dir(config_dir);
    fs::create_dir_all(&dir).await.map_err(|err| (String::new(), err))?;

    let mut paths = HashMap::new();
    for ruleset in rulesets {
        let mode = waf::engine_mode(ruleset, security_cfg);
        let directives =
            format!("SecRuleEngine {mode}\nSecRequestBodyAccess On\n\n{}", ruleset.content);
        let path = dir.join(format!("{}.conf", sanitize(&ruleset.name)));

        fs::write(&path, &directives).await.map_err(|err| (ruleset.name.clone(), err))?;
        set_world_readable(&path).await.map_err(|err| (ruleset.name.clone(), err))?;

        paths.insert(ruleset.name.clone(), path.display().to_string());
    }
    Ok(paths)
}

/// Removes any `.conf` file under the rulesets directory whose path isn't in
/// `current_paths`.
pub async fn clean_stale(config_dir: &Path, current_paths: &HashMap<String, String>) -> io::Result<()> {
    let dir = rulesets_dir(config_dir);
    let keep: HashSet<&str> = current_paths.values().map(String::as_str).collect();

    let mut entries = match fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("conf") {
            continue;
        }
        if !keep.contains(path.display().to_string().as_str()) {
            fs::remove_file(&path).await?;
        }
    }
    Ok(())
}
