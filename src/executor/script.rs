//! Stage script generation
//!
//! A command stage runs a single generated script, `script.sh`, uploaded into
//! the container as a one-file tar archive. The script layout is:
//!
//! ```text
//! #!/bin/<shell>
//! set -e
//! set -x
//! <command 1>
//! <command 2>
//! ```
//!
//! `set -e` aborts on the first failing command, `set -x` echoes each command
//! before it runs.

use std::io;

/// File name of the generated script
pub const SCRIPT_NAME: &str = "script.sh";

/// Permission bits of the generated script (owner read/write/execute)
pub const SCRIPT_MODE: u32 = 0o700;

/// Interpreter path for `shell`: absolute paths are kept, bare names live in `/bin`.
#[must_use]
pub fn interpreter(shell: &str) -> String {
    if shell.starts_with('/') {
        shell.to_string()
    } else {
        format!("/bin/{shell}")
    }
}

/// Renders the script text: the three header lines followed by each command
/// verbatim, every line newline-terminated.
#[must_use]
pub fn render_script(shell: &str, commands: &[String]) -> String {
    let mut script = format!("#!{}\nset -e\nset -x\n", interpreter(shell));
    for command in commands {
        script.push_str(command);
        script.push('\n');
    }
    script
}

/// Packs `content` as the single file `name` of a tar archive.
///
/// # Errors
///
/// Returns an error if the archive cannot be written.
pub fn single_file_archive(name: &str, content: &[u8], mode: u32) -> io::Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(mode);
    header.set_mtime(0);

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, name, content)?;
    builder.into_inner()
}

/// Builds the `script.sh` archive for `commands`.
///
/// # Errors
///
/// Returns an error if the archive cannot be written.
pub fn script_archive(shell: &str, commands: &[String]) -> io::Result<Vec<u8>> {
    let script = render_script(shell, commands);
    single_file_archive(SCRIPT_NAME, script.as_bytes(), SCRIPT_MODE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Read;

    fn commands(lines: &[&str]) -> Vec<String> {
        lines.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_render_script_default_shell() {
        let script = render_script("bash", &commands(&["echo hello", "mvn -version"]));
        assert_eq!(
            script,
            "#!/bin/bash\nset -e\nset -x\necho hello\nmvn -version\n"
        );
    }

    #[test]
    fn test_render_script_custom_shell() {
        let script = render_script("sh", &commands(&["true"]));
        assert!(script.starts_with("#!/bin/sh\n"));

        let script = render_script("/usr/bin/env zsh", &commands(&[]));
        assert_eq!(script, "#!/usr/bin/env zsh\nset -e\nset -x\n");
    }

    #[test]
    fn test_render_script_keeps_multiline_commands() {
        let script = render_script("sh", &commands(&["cat <<EOF\na b\nEOF"]));
        assert!(script.ends_with("cat <<EOF\na b\nEOF\n"));
        assert!(!script.ends_with("\n\n"));
    }

    #[test]
    fn test_script_archive_contains_executable_script() {
        let archive = script_archive("bash", &commands(&["make"])).unwrap();
        let mut archive = tar::Archive::new(archive.as_slice());

        let mut entries = archive.entries().unwrap();
        let mut entry = entries.next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str(), Some(SCRIPT_NAME));
        assert_eq!(entry.header().mode().unwrap(), SCRIPT_MODE);

        let mut content = String::new();
        entry.read_to_string(&mut content).unwrap();
        assert_eq!(content, "#!/bin/bash\nset -e\nset -x\nmake\n");

        drop(entry);
        assert!(entries.next().is_none());
    }

    #[test]
    fn test_script_generation_is_deterministic() {
        let cmds = commands(&["a", "b"]);
        assert_eq!(
            script_archive("sh", &cmds).unwrap(),
            script_archive("sh", &cmds).unwrap()
        );
    }
}
