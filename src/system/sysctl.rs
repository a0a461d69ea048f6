//! IPv4 forwarding control via sysctl.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RestoreError, Result};

use super::backup::write_with_backup;
use super::command::CommandRunner;

const FORWARD_KEY: &str = "net.ipv4.ip_forward";

/// Current forwarding state.
pub async fn get_forwarding<R: CommandRunner + ?Sized>(runner: &R) -> Result<bool> {
    let output = runner.run_checked("sysctl", &["-n", FORWARD_KEY]).await?;
    match output.stdout.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(RestoreError::ParseError(format!(
            "Unexpected sysctl value: {}",
            other
        ))),
    }
}

/// Turn forwarding off at runtime.
pub async fn disable_forwarding<R: CommandRunner + ?Sized>(runner: &R) -> Result<()> {
    runner
        .run_checked("sysctl", &["-w", &format!("{}=0", FORWARD_KEY)])
        .await?;
    Ok(())
}

/// Whether a sysctl.conf line enables forwarding (`net.ipv4.ip_forward = 1`).
fn enables_forwarding(line: &str) -> bool {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    compact == format!("{}=1", FORWARD_KEY)
}

/// Drop persistent forwarding lines from `sysctl.conf`, backing it up first.
///
/// Returns the backup path, or `None` if the file was absent or unchanged.
pub fn scrub_persistent_forwarding(conf: &Path) -> Result<Option<PathBuf>> {
    let Ok(contents) = fs::read_to_string(conf) else {
        return Ok(None);
    };
    if !contents.lines().any(enables_forwarding) {
        return Ok(None);
    }

    let mut kept: String = contents
        .lines()
        .filter(|line| !enables_forwarding(line))
        .collect::<Vec<_>>()
        .join("\n");
    if contents.ends_with('\n') {
        kept.push('\n');
    }

    write_with_backup(conf, &kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::command::mock::MockRunner;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_disable_forwarding() {
        let runner = MockRunner::with(|s| s.forwarding = true);
        disable_forwarding(&runner).await.unwrap();
        assert!(!runner.state().forwarding);
        assert!(runner.called("sysctl -w net.ipv4.ip_forward=0"));
    }

    #[test]
    fn test_scrub_removes_only_enabling_lines() {
        let dir = TempDir::new().unwrap();
        let conf = dir.path().join("sysctl.conf");
        let original = "# comment\nvm.swappiness=10\n\nnet.ipv4.ip_forward=1\n#net.ipv4.ip_forward=1\nnet.ipv4.ip_forward = 1\n";
        fs::write(&conf, original).unwrap();

        let backup = scrub_persistent_forwarding(&conf).unwrap().unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), original);
        assert_eq!(
            fs::read_to_string(&conf).unwrap(),
            "# comment\nvm.swappiness=10\n\n#net.ipv4.ip_forward=1\n"
        );
    }

    #[test]
    fn test_scrub_leaves_clean_file_alone() {
        let dir = TempDir::new().unwrap();
        let conf = dir.path().join("sysctl.conf");
        fs::write(&conf, "vm.swappiness=10\n").unwrap();

        assert_eq!(scrub_persistent_forwarding(&conf).unwrap(), None);
        assert_eq!(scrub_persistent_forwarding(&dir.path().join("absent")).unwrap(), None);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
