//! Yes/no confirmation prompts.
//!
//! All prompts are answered before the pipeline starts; the pipeline itself
//! only sees the resulting [`Decisions`].

use std::io::{BufRead, Write};

use crate::config::Settings;

/// Answers gathered up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decisions {
    /// Run the restoration at all.
    pub proceed: bool,
    /// Purge the configured packages afterwards.
    pub remove_packages: bool,
    /// Remove the configured user accounts afterwards.
    pub remove_accounts: bool,
}

impl Decisions {
    /// Everything accepted (`--yes`).
    pub fn all() -> Self {
        Self {
            proceed: true,
            remove_packages: true,
            remove_accounts: true,
        }
    }
}

/// Ask a yes/no question. Anything other than `y`/`yes` (including EOF) is no.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> bool {
    let _ = write!(output, "{} [y/N] ", question);
    let _ = output.flush();

    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(0) | Err(_) => false,
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
    }
}

/// Ask the initial question and, if accepted, the two cleanup questions.
pub fn gather<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    settings: &Settings,
) -> Decisions {
    let proceed = confirm(
        input,
        output,
        "This will stop AP services, flush the firewall and rewrite network configuration. Continue?",
    );
    if !proceed {
        return Decisions::default();
    }

    let remove_packages = !settings.packages.is_empty()
        && confirm(
            input,
            output,
            &format!("Also purge packages ({})?", settings.packages.join(", ")),
        );

    let remove_accounts = !settings.accounts.is_empty()
        && confirm(
            input,
            output,
            &format!("Also remove user accounts ({})?", settings.accounts.join(", ")),
        );

    Decisions {
        proceed,
        remove_packages,
        remove_accounts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_confirm_answers() {
        for (answer, expected) in [
            ("y\n", true),
            ("YES\n", true),
            ("  yes  \n", true),
            ("n\n", false),
            ("\n", false),
            ("maybe\n", false),
            ("", false),
        ] {
            let mut out = Vec::new();
            assert_eq!(
                confirm(&mut Cursor::new(answer), &mut out, "Go?"),
                expected,
                "answer {:?}",
                answer
            );
            assert!(String::from_utf8(out).unwrap().contains("Go? [y/N]"));
        }
    }

    #[test]
    fn test_gather_stops_after_no() {
        let mut out = Vec::new();
        let decisions = gather(&mut Cursor::new("n\ny\ny\n"), &mut out, &Settings::default());
        assert_eq!(decisions, Decisions::default());
        assert!(!String::from_utf8(out).unwrap().contains("purge"));
    }

    #[test]
    fn test_gather_skips_account_prompt_without_accounts() {
        let mut out = Vec::new();
        let decisions = gather(&mut Cursor::new("y\ny\n"), &mut out, &Settings::default());
        assert!(decisions.proceed);
        assert!(decisions.remove_packages);
        assert!(!decisions.remove_accounts);
        assert!(!String::from_utf8(out).unwrap().contains("accounts"));
    }

    #[test]
    fn test_gather_asks_all_three() {
        let settings = Settings {
            accounts: vec!["camera".to_string()],
            ..Settings::default()
        };
        let mut out = Vec::new();
        let decisions = gather(&mut Cursor::new("yes\nno\ny\n"), &mut out, &settings);
        assert_eq!(
            decisions,
            Decisions {
                proceed: true,
                remove_packages: false,
                remove_accounts: true,
            }
        );
    }
}
