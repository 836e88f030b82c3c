//! First-run guard for launching KA Lite as a different account than the one
//! the system package was installed for.
//!
//! Running as the wrong user silently starts a brand new, empty data
//! directory, which looks like data loss to the operator. When the package
//! marker names another account and this user has no data yet, we explain the
//! situation and ask before continuing.

use std::ffi::OsString;
use std::io;
use std::io::BufRead;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

/// Asks the operator a yes/no question.
pub trait Confirm {
    fn confirm(&mut self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// Prompts on stdout and reads one line from stdin. Only `y` (any case)
/// counts as yes; EOF and read errors count as no.
#[derive(Debug, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        let mut stdout = io::stdout().lock();
        if stdout
            .write_all(prompt.as_bytes())
            .and_then(|()| stdout.flush())
            .is_err()
        {
            return false;
        }
        drop(stdout);

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_affirmative(&answer),
            Err(e) => {
                debug!("failed to read confirmation: {e}");
                false
            }
        }
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Proceed,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMismatch {
    pub expected_user: String,
    pub current_user: String,
    pub data_dir: Option<PathBuf>,
}

impl IdentityMismatch {
    /// Explanation printed to stderr before the prompt. `args` is the
    /// proxied command line, used to spell out the suggested re-invocation.
    pub fn warning(&self, args: &[OsString]) -> String {
        let rerun = suggested_command(&self.expected_user, args);
        let data_dir = self
            .data_dir
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| format!("~/{}", crate::config::DATA_DIR_NAME));
        let rule = "-".repeat(72);
        format!(
            "{rule}\n\
             WARNING: KA Lite was installed to run as the user `{expected}`, but you\n\
             are running it as `{current}`. Continuing will create a new, empty set\n\
             of user data in {data_dir}.\n\
             \n\
             To use the existing installation instead, run:\n\
             \n\
             \x20   {rerun}\n\
             {rule}\n",
            expected = self.expected_user,
            current = self.current_user,
        )
    }

    pub fn prompt(&self) -> String {
        format!(
            "Continue as `{}` and create a new data folder? [y/N] ",
            self.current_user
        )
    }
}

fn suggested_command(expected_user: &str, args: &[OsString]) -> String {
    let inner: Vec<String> = std::iter::once("kalite".to_string())
        .chain(args.iter().map(|arg| arg.to_string_lossy().into_owned()))
        .collect();
    let inner = shlex::try_join(inner.iter().map(String::as_str))
        .unwrap_or_else(|_| inner.join(" "));
    let quoted = shlex::try_quote(&inner)
        .map(|q| q.into_owned())
        .unwrap_or(inner);
    format!("sudo su {expected_user} -c {quoted}")
}

/// Inputs for the guard, borrowed from the launch configuration.
#[derive(Debug, Clone, Copy)]
pub struct IdentityGuard<'a> {
    pub marker: &'a Path,
    pub current_user: &'a str,
    pub data_dir: Option<&'a Path>,
}

impl IdentityGuard<'_> {
    /// Returns the mismatch that warrants a prompt, if any.
    pub fn detect(&self) -> io::Result<Option<IdentityMismatch>> {
        let Some(expected_user) = read_expected_user(self.marker)? else {
            debug!("no user marker at {}", self.marker.display());
            return Ok(None);
        };

        if expected_user == self.current_user {
            return Ok(None);
        }

        if let Some(dir) = self.data_dir {
            if has_entries(dir) {
                debug!(
                    "{} already has data; not prompting about user `{expected_user}`",
                    dir.display()
                );
                return Ok(None);
            }
        }

        Ok(Some(IdentityMismatch {
            expected_user,
            current_user: self.current_user.to_string(),
            data_dir: self.data_dir.map(Path::to_path_buf),
        }))
    }

    /// Runs the guard: warns on `stderr` and asks `confirm` when a mismatch
    /// is detected.
    pub fn check(
        &self,
        args: &[OsString],
        stderr: &mut dyn Write,
        confirm: &mut dyn Confirm,
    ) -> io::Result<GuardOutcome> {
        let Some(mismatch) = self.detect()? else {
            return Ok(GuardOutcome::Proceed);
        };

        stderr.write_all(mismatch.warning(args).as_bytes())?;
        stderr.flush()?;

        if confirm.confirm(&mismatch.prompt()) {
            Ok(GuardOutcome::Proceed)
        } else {
            Ok(GuardOutcome::Declined)
        }
    }
}

/// First line of the marker file, trimmed. `None` when the file is missing
/// or blank. Nothing past the first newline is read.
fn read_expected_user(marker: &Path) -> io::Result<Option<String>> {
    let file = match std::fs::File::open(marker) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut line = String::new();
    io::BufReader::new(file).read_line(&mut line)?;
    let user = line.trim();
    if user.is_empty() {
        Ok(None)
    } else {
        Ok(Some(user.to_string()))
    }
}

/// Missing or unreadable directories count as empty.
fn has_entries(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_some(),
        Err(_) => false,
    }
}
