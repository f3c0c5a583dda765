//! Integration hooks.
//!
//! A hook is a shell command template keyed by file extension (or `*` for
//! any file); `{}` stands for the binary's path. The path is handed to `sh`
//! as a positional argument and never spliced into the script text. Hooks run
//! after install and after removal. They never undo the primary operation.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use super::InstallError;

/// Hook template for `path`: its extension's entry, else the `*` entry.
pub fn hook_for<'a>(hooks: &'a BTreeMap<String, String>, path: &Path) -> Option<&'a str> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| hooks.get(ext))
        .or_else(|| hooks.get("*"))
        .map(String::as_str)
}

/// Turn `template` into a script reading the path from `$1`.
pub fn render(template: &str) -> String {
    template.replace("{}", "\"$1\"")
}

/// Run the hook configured for `path`, if any.
///
/// # Errors
///
/// Returns [`InstallError::Hook`] when the command cannot start or exits
/// non-zero.
pub async fn run_hook(hooks: &BTreeMap<String, String>, path: &Path) -> Result<(), InstallError> {
    let Some(template) = hook_for(hooks, path) else {
        return Ok(());
    };
    let command = render(template);
    debug!(%command, path = %path.display(), "Running hook");

    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&command)
        .arg("sh")
        .arg(path)
        .status()
        .await
        .map_err(|e| InstallError::Hook(format!("`{command}`: {e}")))?;
    if status.success() {
        Ok(())
    } else {
        Err(InstallError::Hook(format!("`{command}` exited with {status}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hooks(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn extension_beats_wildcard() {
        let h = hooks(&[("AppImage", "integrate {}"), ("*", "echo {}")]);
        assert_eq!(hook_for(&h, Path::new("/b/x.AppImage")), Some("integrate {}"));
        assert_eq!(hook_for(&h, Path::new("/b/jq")), Some("echo {}"));
        assert_eq!(hook_for(&hooks(&[]), Path::new("/b/jq")), None);
    }

    #[test]
    fn render_refers_to_positional_path() {
        assert_eq!(render("chmod +x {} && ls {}"), "chmod +x \"$1\" && ls \"$1\"");
    }

    #[tokio::test]
    async fn path_is_not_interpreted_by_the_shell() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let path = dir
            .path()
            .join(format!("odd name;touch {}", marker.display()));
        let log = dir.path().join("log");
        let template = format!("printf '%s' {{}} > {}", log.display());
        let h = hooks(&[("*", template.as_str())]);

        run_hook(&h, &path).await.unwrap();

        assert!(!marker.exists());
        assert_eq!(std::fs::read_to_string(&log).unwrap(), path.display().to_string());
    }

    #[tokio::test]
    async fn failing_hook_is_reported() {
        let h = hooks(&[("*", "exit 3")]);
        let err = run_hook(&h, Path::new("/b/jq")).await.unwrap_err();
        assert!(matches!(err, InstallError::Hook(_)));
        run_hook(&hooks(&[("*", "true {}")]), Path::new("/b/jq"))
            .await
            .unwrap();
    }
}
