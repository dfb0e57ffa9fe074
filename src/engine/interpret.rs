//! Output interpreter: best-effort decoding of `clarinet` text output.
//!
//! The CLI has no machine-readable mode for check/console, so results are
//! recovered from text in three layers:
//!
//! 1. [`classify`] tags each line (prompt echo, banner, asset balance, ...)
//! 2. matchers run in priority order (error marker, echoed prompt)
//! 3. a fallback picks the last meaningful line or a generic placeholder
//!
//! No function here fails: unexpected formats degrade to a placeholder.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Marker the console and checker print in front of diagnostics.
pub const ERROR_MARKER: &str = "error:";
const SYNTAX_ERROR_MARKER: &str = "syntax error";
/// Prompt the console echoes before each evaluated expression.
pub const PROMPT: &str = ">>";
const BANNER_MARKER: &str = "Clarinet";
const ASSET_MARKER: &str = "Asset balance";

const CHECK_FAILED: &str = "Check failed";
const ERROR_OCCURRED: &str = "Error occurred";
const EVAL_SUCCESS: &str = "Success";

static ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"error: .+").expect("valid error regex"));
static ASSET_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Asset balance (.+): (.+)").expect("valid asset regex"));

// ── Line classification ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    /// Echo of an evaluated expression (`>> (+ 1 2)`).
    Prompt,
    /// Startup banner or help text mentioning the tool.
    Banner,
    /// `Asset balance <name>: <value>` dump line.
    AssetBalance,
    /// Carries an `error:` or `syntax error` marker.
    Error,
    Text,
}

pub fn classify(line: &str) -> LineKind {
    if line.trim().is_empty() {
        LineKind::Blank
    } else if line.starts_with(PROMPT) {
        LineKind::Prompt
    } else if line.contains(ASSET_MARKER) {
        LineKind::AssetBalance
    } else if line.contains(BANNER_MARKER) {
        LineKind::Banner
    } else if line.contains(ERROR_MARKER) || line.contains(SYNTAX_ERROR_MARKER) {
        LineKind::Error
    } else {
        LineKind::Text
    }
}

// ── Static check ──────────────────────────────────────────────────────────────

/// Result of `clarinet check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub success: bool,
    pub output: String,
    pub errors: Vec<String>,
}

/// Lines that carry a diagnostic marker, in output order.
pub fn error_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|l| l.contains(ERROR_MARKER) || l.contains(SYNTAX_ERROR_MARKER))
        .map(str::to_string)
        .collect()
}

/// Success is decided by the exit status alone.
pub fn interpret_check(exit_succeeded: bool, exit_code: Option<i32>, output: String) -> CheckOutcome {
    if exit_succeeded {
        return CheckOutcome {
            success: true,
            output,
            errors: Vec::new(),
        };
    }

    let mut errors = error_lines(&output);
    if errors.is_empty() {
        errors.push(match exit_code {
            Some(code) => format!("{CHECK_FAILED} (exit status {code})"),
            None => format!("{CHECK_FAILED} (terminated by signal)"),
        });
    }

    CheckOutcome {
        success: false,
        output,
        errors,
    }
}

// ── Expression evaluation ─────────────────────────────────────────────────────

/// Result of evaluating one expression in the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalOutcome {
    pub success: bool,
    pub result: String,
    pub raw_output: String,
}

/// The last `error: ...` match in the output, if the marker is present.
fn match_error(output: &str) -> Option<String> {
    if !output.contains(ERROR_MARKER) {
        return None;
    }
    let last = ERROR_LINE
        .find_iter(output)
        .last()
        .map(|m| m.as_str().trim_end_matches('\r').to_string());
    Some(last.unwrap_or_else(|| ERROR_OCCURRED.to_string()))
}

/// The line following the echoed `>> <expression>` prompt.
fn match_echo(lines: &[&str], expression: &str) -> Option<String> {
    let needle = format!("{PROMPT} {expression}");
    let idx = lines.iter().position(|l| l.contains(&needle))?;
    let next = lines.get(idx + 1)?;
    if next.is_empty() {
        return None;
    }
    Some(next.trim().to_string())
}

/// Last line that is neither blank, a prompt, a banner nor an asset dump.
fn fallback_line(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .rev()
        .find(|l| matches!(classify(l), LineKind::Text | LineKind::Error))
        .map(|l| l.to_string())
}

/// A result is a failure when it mentions "error" anywhere, whatever the
/// exit status said.
pub fn is_failure(result: &str) -> bool {
    result.to_lowercase().contains("error")
}

pub fn interpret_eval(expression: &str, output: String) -> EvalOutcome {
    let lines: Vec<&str> = output.lines().collect();

    let result = match_error(&output)
        .or_else(|| match_echo(&lines, expression))
        .or_else(|| {
            tracing::debug!("No echoed prompt for expression; using last output line");
            fallback_line(&lines)
        })
        .unwrap_or_else(|| EVAL_SUCCESS.to_string());

    EvalOutcome {
        success: !is_failure(&result),
        result,
        raw_output: output,
    }
}

// ── State inspection ──────────────────────────────────────────────────────────

/// One asset balance reported by the console.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

pub fn interpret_state(output: &str) -> Vec<StateEntry> {
    output
        .lines()
        .filter(|l| classify(l) == LineKind::AssetBalance)
        .filter_map(|l| ASSET_LINE.captures(l))
        .map(|caps| StateEntry {
            name: caps[1].to_string(),
            kind: "asset".to_string(),
            value: caps[2].trim_end_matches('\r').to_string(),
        })
        .collect()
}
