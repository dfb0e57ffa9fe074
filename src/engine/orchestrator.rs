//! Session orchestrator: the engine's entry point for the HTTP gateway.
//!
//! Every tool-backed operation has the same shape:
//! build workspace → invoke tool → interpret → delete workspace.
//! The [`Workspace`] handle is closed explicitly on the normal path and
//! removed by `Drop` on every other one (invocation fault, panic).

use super::interpret::{self, CheckOutcome, EvalOutcome, StateEntry};
use super::invoker::{Invocation, ToolRunner};
use super::session::{SessionHandle, ASSETS_DIRECTIVE};
use super::workspace::Workspace;
use super::{Contract, EngineError, TOOL_NAME};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Placeholder chain height reported by state inspection.
pub const BLOCK_HEIGHT: u64 = 1;
/// Deployer principal of the fixed simnet accounts.
pub const DEPLOYER: &str = "ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM";

const TERMINAL_REJECTED: &str = "Only clarinet commands are allowed.";

/// Asset balances plus the fixed chain context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub success: bool,
    pub state: Vec<StateEntry>,
    pub block_height: u64,
    pub deployer: String,
}

/// Raw output of a passthrough command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalOutcome {
    pub success: bool,
    pub output: String,
}

pub struct Orchestrator {
    runner: Arc<dyn ToolRunner>,
    binary: PathBuf,
    scratch_root: PathBuf,
}

impl Orchestrator {
    /// `binary` is the already-resolved tool path; it is never re-resolved.
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        binary: impl Into<PathBuf>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            binary: binary.into(),
            scratch_root: scratch_root.into(),
        }
    }

    pub fn binary(&self) -> &std::path::Path {
        &self.binary
    }

    /// Build a workspace, run `invocation` in it, and always remove it.
    async fn run_in_workspace(
        &self,
        contracts: &[Contract],
        invocation: Invocation,
    ) -> Result<super::CommandOutput, EngineError> {
        let workspace = Workspace::create(&self.scratch_root, contracts)?;
        let result = self.runner.run(&invocation, workspace.root()).await;
        workspace.close();

        match &result {
            Ok(out) => tracing::debug!(
                "`{}` exited with {:?} ({} bytes of output)",
                invocation.display(),
                out.exit_code,
                out.stdout.len() + out.stderr.len()
            ),
            Err(e) => tracing::error!("Invocation of `{}` failed: {e}", invocation.display()),
        }
        Ok(result?)
    }

    /// Static check of a single contract. No session state is touched.
    pub async fn check(&self, contract: Contract) -> Result<CheckOutcome, EngineError> {
        contract.validated_name()?;
        tracing::info!("Running check for {}", contract.name);

        let out = self
            .run_in_workspace(
                std::slice::from_ref(&contract),
                Invocation::new(&self.binary, ["check"]),
            )
            .await?;

        Ok(interpret::interpret_check(
            out.exit_succeeded(),
            out.exit_code,
            out.combined(),
        ))
    }

    /// Make `contract` the session's active contract.
    pub async fn set_active(
        &self,
        session: &SessionHandle,
        contract: Contract,
    ) -> Result<(), EngineError> {
        contract.validated_name()?;
        tracing::info!(
            "Session {}: active contract is now {}",
            session.id(),
            contract.name
        );
        session.lock().await.set_active(contract);
        Ok(())
    }

    /// Evaluate `expression` on top of the session's replayed history.
    pub async fn evaluate(
        &self,
        session: &SessionHandle,
        expression: &str,
    ) -> Result<EvalOutcome, EngineError> {
        if expression.trim().is_empty() {
            return Err(EngineError::InvalidInput("snippet cannot be empty".into()));
        }

        let mut state = session.lock().await;
        tracing::info!("Session {}: executing snippet: {expression}", session.id());

        let script = state.replay_script(expression);
        let out = self
            .run_in_workspace(
                &state.workspace_contracts(),
                Invocation::new(&self.binary, ["console"]).with_stdin(script),
            )
            .await?;

        let outcome = interpret::interpret_eval(expression, out.combined());
        if outcome.success {
            state.record(expression);
        } else {
            tracing::debug!(
                "Session {}: snippet not recorded: {}",
                session.id(),
                outcome.result
            );
        }
        Ok(outcome)
    }

    /// Dump asset balances for the session's active contract.
    pub async fn inspect_state(
        &self,
        session: &SessionHandle,
    ) -> Result<StateSnapshot, EngineError> {
        let contracts = session.lock().await.workspace_contracts();

        let out = self
            .run_in_workspace(
                &contracts,
                Invocation::new(&self.binary, ["console"])
                    .with_stdin(format!("{ASSETS_DIRECTIVE}\n")),
            )
            .await?;

        Ok(StateSnapshot {
            success: true,
            state: interpret::interpret_state(&out.combined()),
            block_height: BLOCK_HEIGHT,
            deployer: DEPLOYER.to_string(),
        })
    }

    /// Run a raw `clarinet ...` command line in a session workspace.
    ///
    /// Anything not starting with the tool name is refused before a
    /// workspace is built.
    pub async fn terminal(
        &self,
        session: &SessionHandle,
        raw_command: &str,
    ) -> Result<TerminalOutcome, EngineError> {
        tracing::info!("Session {}: terminal command: {raw_command}", session.id());

        let Some(args) = tool_arguments(raw_command) else {
            tracing::warn!("Rejected terminal command: {raw_command}");
            return Ok(TerminalOutcome {
                success: false,
                output: TERMINAL_REJECTED.to_string(),
            });
        };

        let contracts = session.lock().await.workspace_contracts();
        let out = self
            .run_in_workspace(&contracts, Invocation::new(&self.binary, args))
            .await?;

        Ok(TerminalOutcome {
            success: out.exit_succeeded(),
            output: out.combined(),
        })
    }

    /// Forget the session's active contract and history.
    pub async fn reset(&self, session: &SessionHandle) {
        session.lock().await.reset();
        tracing::info!("Session {}: reset", session.id());
    }
}

/// Arguments following the tool name, or `None` when the command does not
/// start with it.
fn tool_arguments(raw_command: &str) -> Option<Vec<String>> {
    let mut tokens = split_command_line(raw_command.trim())?.into_iter();
    match tokens.next() {
        Some(first) if first == TOOL_NAME => Some(tokens.collect()),
        _ => None,
    }
}

/// Split a command line on whitespace, honouring single and double quotes
/// and backslash escapes outside single quotes. `None` on an unclosed quote.
fn split_command_line(line: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('\''), c) => current.push(c),
            (_, '\\') => {
                current.push(chars.next().unwrap_or('\\'));
                in_token = true;
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return None;
    }
    if in_token {
        tokens.push(current);
    }
    Some(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::invoker::{CommandOutput, InvokeError};
    use crate::engine::session::SessionRegistry;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::path::Path;
    use tempfile::TempDir;

    /// Records every invocation and answers from a script of responses.
    #[derive(Default)]
    struct FakeRunner {
        calls: Mutex<Vec<(Invocation, PathBuf, Vec<String>)>>,
        responses: Mutex<Vec<Result<CommandOutput, InvokeError>>>,
    }

    impl FakeRunner {
        fn respond(&self, stdout: &str, exit_code: i32) {
            self.responses.lock().push(Ok(CommandOutput {
                stdout: stdout.to_string(),
                stderr: String::new(),
                exit_code: Some(exit_code),
            }));
        }

        fn fail(&self) {
            self.responses
                .lock()
                .push(Err(InvokeError::NotFound("clarinet".into())));
        }

        fn calls(&self) -> Vec<(Invocation, PathBuf, Vec<String>)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl ToolRunner for FakeRunner {
        async fn run(
            &self,
            invocation: &Invocation,
            workdir: &Path,
        ) -> Result<CommandOutput, InvokeError> {
            let mut contracts: Vec<String> = std::fs::read_dir(workdir.join("contracts"))
                .map(|rd| {
                    rd.filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default();
            contracts.sort();
            self.calls
                .lock()
                .push((invocation.clone(), workdir.to_path_buf(), contracts));

            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Ok(CommandOutput {
                    exit_code: Some(0),
                    ..CommandOutput::default()
                })
            } else {
                responses.remove(0)
            }
        }
    }

    fn setup() -> (Arc<FakeRunner>, Orchestrator, SessionRegistry, TempDir) {
        let scratch = TempDir::new().unwrap();
        let runner = Arc::new(FakeRunner::default());
        let orch = Orchestrator::new(runner.clone(), "/opt/bin/clarinet", scratch.path());
        (runner, orch, SessionRegistry::new(None), scratch)
    }

    fn scratch_is_empty(scratch: &TempDir) -> bool {
        std::fs::read_dir(scratch.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn check_runs_in_single_contract_workspace() {
        let (runner, orch, _reg, scratch) = setup();
        runner.respond("✔ 1 contract checked\n", 0);

        let out = orch
            .check(Contract::new("counter.clar", "(ok u1)"))
            .await
            .unwrap();

        assert!(out.success);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.args, vec!["check"]);
        assert_eq!(calls[0].0.program, PathBuf::from("/opt/bin/clarinet"));
        assert_eq!(calls[0].2, vec!["counter.clar"]);
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn check_failure_extracts_errors() {
        let (runner, orch, _reg, _scratch) = setup();
        runner.respond("error: unexpected token\n", 1);

        let out = orch.check(Contract::new("bad", "(")).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.errors, vec!["error: unexpected token"]);
    }

    #[tokio::test]
    async fn evaluate_replays_history() {
        let (runner, orch, reg, _scratch) = setup();
        let session = reg.get("s");
        runner.respond(">> (+ 1 2)\nu3\n", 0);
        runner.respond(">> (+ 1 2)\nu3\n>> (+ 2 2)\nu4\n", 0);

        orch.evaluate(&session, "(+ 1 2)").await.unwrap();
        let out = orch.evaluate(&session, "(+ 2 2)").await.unwrap();

        assert!(out.success);
        assert_eq!(out.result, "u4");
        let calls = runner.calls();
        assert_eq!(calls[1].0.args, vec!["console"]);
        assert_eq!(
            calls[1].0.stdin.as_deref(),
            Some("(+ 1 2)\n(+ 2 2)\n::get_assets\n")
        );
        assert_eq!(session.lock().await.history(), ["(+ 1 2)", "(+ 2 2)"]);
    }

    #[tokio::test]
    async fn evaluate_error_is_not_recorded_even_with_zero_exit() {
        let (runner, orch, reg, _scratch) = setup();
        let session = reg.get("s");
        runner.respond(">> (foo)\nerror: use of unresolved function 'foo'\n", 0);

        let out = orch.evaluate(&session, "(foo)").await.unwrap();

        assert!(!out.success);
        assert_eq!(out.result, "error: use of unresolved function 'foo'");
        assert!(session.lock().await.history().is_empty());
    }

    #[tokio::test]
    async fn evaluate_seeds_workspace_with_active_contract() {
        let (runner, orch, reg, _scratch) = setup();
        let session = reg.get("s");
        orch.set_active(&session, Contract::new("token.clar", "(ok true)"))
            .await
            .unwrap();

        orch.evaluate(&session, "(contract-call? .token f)")
            .await
            .unwrap();
        assert_eq!(runner.calls()[0].2, vec!["token.clar"]);
    }

    #[tokio::test]
    async fn invocation_fault_propagates_and_cleans_up() {
        let (runner, orch, reg, scratch) = setup();
        let session = reg.get("s");
        runner.fail();

        let err = orch.evaluate(&session, "(+ 1 1)").await.unwrap_err();
        assert!(matches!(err, EngineError::Invocation(_)));
        assert!(scratch_is_empty(&scratch));
        assert!(session.lock().await.history().is_empty());
    }

    #[tokio::test]
    async fn empty_snippet_is_invalid() {
        let (runner, orch, reg, _scratch) = setup();
        let err = orch.evaluate(&reg.get("s"), "   ").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn set_active_rejects_bad_names() {
        let (_runner, orch, reg, _scratch) = setup();
        let session = reg.get("s");
        let err = orch
            .set_active(&session, Contract::new("../../etc/passwd", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
        assert!(session.lock().await.active_contract().is_none());
    }

    #[tokio::test]
    async fn inspect_state_parses_balances() {
        let (runner, orch, reg, scratch) = setup();
        runner.respond("Asset balance X: 100\nAsset balance Y: 50\n", 0);

        let snap = orch.inspect_state(&reg.get("s")).await.unwrap();

        assert!(snap.success);
        assert_eq!(snap.block_height, 1);
        assert_eq!(snap.deployer, DEPLOYER);
        let names: Vec<_> = snap.state.iter().map(|e| (e.name.as_str(), e.value.as_str())).collect();
        assert_eq!(names, vec![("X", "100"), ("Y", "50")]);
        assert_eq!(runner.calls()[0].0.stdin.as_deref(), Some("::get_assets\n"));
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn terminal_rejects_foreign_commands_without_invoking() {
        let (runner, orch, reg, scratch) = setup();
        let session = reg.get("s");
        for cmd in ["rm -rf /", "Clarinet check", "clarinetx check", "  sh -c clarinet"] {
            let out = orch.terminal(&session, cmd).await.unwrap();
            assert!(!out.success, "{cmd} should be rejected");
            assert_eq!(out.output, TERMINAL_REJECTED);
        }
        assert!(runner.calls().is_empty());
        assert!(scratch_is_empty(&scratch));
    }

    #[tokio::test]
    async fn terminal_substitutes_resolved_binary() {
        let (runner, orch, reg, _scratch) = setup();
        runner.respond("clarinet 2.11.0\n", 0);

        let out = orch
            .terminal(&reg.get("s"), "  clarinet   --version ")
            .await
            .unwrap();

        assert!(out.success);
        assert_eq!(out.output, "clarinet 2.11.0\n");
        let call = &runner.calls()[0].0;
        assert_eq!(call.program, PathBuf::from("/opt/bin/clarinet"));
        assert_eq!(call.args, vec!["--version"]);
    }

    #[tokio::test]
    async fn terminal_nonzero_exit_reports_failure_with_output() {
        let (runner, orch, reg, _scratch) = setup();
        runner.respond("error: unknown subcommand\n", 2);
        let out = orch.terminal(&reg.get("s"), "clarinet nope").await.unwrap();
        assert!(!out.success);
        assert_eq!(out.output, "error: unknown subcommand\n");
    }

    #[tokio::test]
    async fn reset_forgets_history() {
        let (_runner, orch, reg, _scratch) = setup();
        let session = reg.get("s");
        session.lock().await.record("(+ 1 1)");
        orch.reset(&session).await;
        assert!(session.lock().await.history().is_empty());
    }

    #[test]
    fn split_handles_quotes_and_escapes() {
        assert_eq!(
            split_command_line(r#"clarinet run "a b" 'c "d"' e\ f"#).unwrap(),
            vec!["clarinet", "run", "a b", "c \"d\"", "e f"]
        );
        assert_eq!(split_command_line("").unwrap(), Vec::<String>::new());
        assert_eq!(split_command_line(r#"x """#).unwrap(), vec!["x", ""]);
        assert!(split_command_line("clarinet 'open").is_none());
    }

    #[test]
    fn tool_arguments_requires_exact_first_token() {
        assert_eq!(tool_arguments("clarinet check").unwrap(), vec!["check"]);
        assert_eq!(tool_arguments("clarinet").unwrap(), Vec::<String>::new());
        assert!(tool_arguments("clarinet-evil check").is_none());
        assert!(tool_arguments("").is_none());
    }
}
