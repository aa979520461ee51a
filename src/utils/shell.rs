//! Shell escaping, quoting, and structured command construction.
//!
//! Remote operations never build command strings by concatenation. They assemble a
//! [`ShellCommand`] from a program and arguments; every argument is quoted on render,
//! so hostile values (paths with spaces, quotes, `$()`) stay literal.

use crate::error::{Error, Result};

/// Escape a value for use inside single quotes.
/// Replaces `'` with `'\''` (end quote, escaped quote, start quote).
pub fn escape_single_quote_content(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Quote a single argument for shell execution.
/// - Empty strings become `''`
/// - Strings with shell metacharacters are wrapped in single quotes
/// - Embedded single quotes are escaped
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    // Characters that require quoting
    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\r', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{',
        '}', '<', '>', '|', '&', ';', '#', '~', '^',
    ];

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", escape_single_quote_content(arg))
}

/// Quote and join multiple arguments for shell execution.
pub fn quote_args(args: &[String]) -> String {
    args.iter()
        .map(|a| quote_arg(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote a path for shell execution (always quotes).
pub fn quote_path(path: &str) -> String {
    format!("'{}'", escape_single_quote_content(path))
}

/// Escape a value for the replacement side of a sed `s` expression using `delimiter`.
/// Characters: \ & newline and the delimiter itself
pub fn escape_sed_replacement(value: &str, delimiter: char) -> String {
    let mut escaped = String::new();
    for c in value.chars() {
        match c {
            '\\' | '&' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            c if c == delimiter => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

// ============================================================================
// Command builder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Joiner {
    Pipe,
    And,
}

impl Joiner {
    fn as_str(self) -> &'static str {
        match self {
            Joiner::Pipe => "|",
            Joiner::And => "&&",
        }
    }
}

#[derive(Debug, Clone)]
struct Segment {
    joiner: Option<Joiner>,
    sudo: bool,
    argv: Vec<String>,
    stdout_to: Option<String>,
}

impl Segment {
    fn new(joiner: Option<Joiner>, program: &str, sudo: bool) -> Self {
        Self {
            joiner,
            sudo,
            argv: vec![program.to_string()],
            stdout_to: None,
        }
    }
}

/// A shell command line assembled from programs and arguments.
///
/// ```ignore
/// let cmd = ShellCommand::new("wget").args(["-q", url, "-O", "-"])
///     .pipe("tar").arg("xz")
///     .in_dir(build_dir);
/// ```
#[derive(Debug, Clone)]
pub struct ShellCommand {
    dir: Option<String>,
    segments: Vec<Segment>,
}

impl ShellCommand {
    pub fn new(program: &str) -> Self {
        Self {
            dir: None,
            segments: vec![Segment::new(None, program, false)],
        }
    }

    /// Start a command that runs with elevated privileges.
    pub fn sudo(program: &str) -> Self {
        Self::new(program).elevated(true)
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.last_mut().argv.push(arg.as_ref().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let last = self.last_mut();
        last.argv
            .extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    /// Toggle sudo on the most recently added program.
    pub fn elevated(mut self, sudo: bool) -> Self {
        self.last_mut().sudo = sudo;
        self
    }

    /// Feed this command's stdout into `program`.
    pub fn pipe(mut self, program: &str) -> Self {
        self.segments
            .push(Segment::new(Some(Joiner::Pipe), program, false));
        self
    }

    /// Run `program` only if everything before it succeeded.
    pub fn and(mut self, program: &str) -> Self {
        self.segments
            .push(Segment::new(Some(Joiner::And), program, false));
        self
    }

    /// Append another command, joined with `&&`.
    pub fn then(mut self, other: ShellCommand) -> Self {
        let mut segments = other.segments.into_iter();
        if let Some(mut first) = segments.next() {
            first.joiner = Some(Joiner::And);
            self.segments.push(first);
        }
        self.segments.extend(segments);
        self
    }

    /// Redirect stdout of the most recently added program to `path`.
    pub fn stdout_to(mut self, path: &str) -> Self {
        self.last_mut().stdout_to = Some(path.to_string());
        self
    }

    /// Run the whole line from `dir` (`cd 'dir' && ...`).
    pub fn in_dir(mut self, dir: &str) -> Self {
        self.dir = Some(dir.to_string());
        self
    }

    /// Name of the first program, used in logs and errors.
    pub fn program(&self) -> &str {
        self.segments
            .first()
            .and_then(|s| s.argv.first())
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Render to a single command line. Arguments with shell metacharacters are quoted;
    /// program names must be plain identifiers or paths.
    pub fn render(&self) -> Result<String> {
        let mut parts: Vec<String> = Vec::new();

        if let Some(dir) = &self.dir {
            check_argument(dir)?;
            parts.push(format!("cd {} &&", quote_path(dir)));
        }

        for segment in &self.segments {
            if let Some(joiner) = segment.joiner {
                parts.push(joiner.as_str().to_string());
            }

            let program = segment.argv.first().map(|s| s.as_str()).unwrap_or("");
            check_program(program)?;

            if segment.sudo {
                parts.push("sudo".to_string());
            }
            parts.push(program.to_string());

            for arg in segment.argv.iter().skip(1) {
                check_argument(arg)?;
                parts.push(quote_arg(arg));
            }

            if let Some(path) = &segment.stdout_to {
                check_argument(path)?;
                parts.push(">".to_string());
                parts.push(quote_path(path));
            }
        }

        Ok(parts.join(" "))
    }

    fn last_mut(&mut self) -> &mut Segment {
        // Constructors always create one segment.
        let idx = self.segments.len() - 1;
        &mut self.segments[idx]
    }
}

fn check_program(program: &str) -> Result<()> {
    let valid = !program.is_empty()
        && program
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '+' | '-'));

    if valid {
        Ok(())
    } else {
        Err(Error::validation_invalid_argument(
            "program",
            format!("Invalid program name: {:?}", program),
            Some(program.to_string()),
            None,
        ))
    }
}

fn check_argument(arg: &str) -> Result<()> {
    if arg.contains('\0') {
        return Err(Error::validation_invalid_argument(
            "argument",
            "Command arguments cannot contain NUL bytes",
            None,
            None,
        ));
    }
    Ok(())
}
