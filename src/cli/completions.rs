//! `polka completions` - Generate shell completions

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::Shell;

use super::Args;

/// Renders the completion script for `shell`
pub fn generate_completions(shell: Shell) -> Result<String> {
    let mut cmd = Args::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, "polka", &mut buf);

    String::from_utf8(buf).context("Failed to generate completions")
}

/// Writes a completion script to `output_path`
pub fn save_completions(completions: &str, output_path: &Path) -> Result<()> {
    fs::write(output_path, completions)
        .with_context(|| format!("Failed to write completions to: {}", output_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_bash_completions() {
        let completions = generate_completions(Shell::Bash).unwrap();
        assert!(completions.contains("polka"));
        assert!(completions.contains("run"));
    }

    #[test]
    fn test_generate_zsh_completions() {
        let completions = generate_completions(Shell::Zsh).unwrap();
        assert!(completions.contains("polka"));
    }

    #[test]
    fn test_save_completions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("polka.bash");
        save_completions("complete -F _polka polka", &path).unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "complete -F _polka polka"
        );
    }
}
