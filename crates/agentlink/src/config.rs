//! Agent options
//!
//! [`AgentOptions`] is captured once per query or session and shared behind an
//! `Arc`; nothing mutates it after the operation starts.

use crate::error::{AgentError, Result};
use crate::permissions::PermissionCallback;
use agentlink_protocol::PermissionMode;
use agentlink_transport::{ProcessConfig, StderrSink};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding [`AgentOptions::cli_path`]
pub const ENV_CLI_PATH: &str = "AGENTLINK_CLI_PATH";
/// Environment variable setting [`AgentOptions::model`]
pub const ENV_MODEL: &str = "AGENTLINK_MODEL";
/// Environment variable setting [`AgentOptions::cwd`]
pub const ENV_CWD: &str = "AGENTLINK_CWD";
/// Environment variable setting [`AgentOptions::permission_mode`]
pub const ENV_PERMISSION_MODE: &str = "AGENTLINK_PERMISSION_MODE";

/// What the router does with a line that fails to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Surface the error as a stream item and keep reading
    #[default]
    Lenient,

    /// Surface the error, then stop reading
    Strict,
}

/// Configuration for queries and sessions
#[derive(Clone)]
pub struct AgentOptions {
    /// Agent CLI executable
    pub cli_path: PathBuf,

    /// Working directory of the agent process
    pub cwd: Option<PathBuf>,

    /// Model to use
    pub model: Option<String>,

    /// Maximum number of agent turns
    pub max_turns: Option<u32>,

    /// Tool permission mode
    pub permission_mode: PermissionMode,

    /// Decides tool-use requests; the mode's static policy applies without one
    pub can_use_tool: Option<PermissionCallback>,

    /// Receives each stderr line of the agent process
    pub stderr: Option<StderrSink>,

    /// Environment overrides for the agent process
    pub env: HashMap<String, String>,

    /// System prompt replacing the default one
    pub system_prompt: Option<String>,

    /// Tools the agent may use without asking
    pub allowed_tools: Vec<String>,

    /// Tools the agent may never use
    pub disallowed_tools: Vec<String>,

    /// Session id to resume
    pub resume: Option<String>,

    /// Extra CLI arguments, appended last
    pub extra_args: Vec<String>,

    /// How long a graceful shutdown waits before killing the process
    pub grace_period: Duration,

    /// Upper bound on a permission callback; it may block forever without one
    pub permission_timeout: Option<Duration>,

    /// Handling of undecodable lines
    pub decode_policy: DecodePolicy,

    /// Messages buffered between the reader task and the consumer
    pub channel_capacity: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            cli_path: PathBuf::from("claude"),
            cwd: None,
            model: None,
            max_turns: None,
            permission_mode: PermissionMode::Default,
            can_use_tool: None,
            stderr: None,
            env: HashMap::new(),
            system_prompt: None,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            resume: None,
            extra_args: Vec::new(),
            grace_period: Duration::from_secs(5),
            permission_timeout: None,
            decode_policy: DecodePolicy::Lenient,
            channel_capacity: 64,
        }
    }
}

impl std::fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptions")
            .field("cli_path", &self.cli_path)
            .field("cwd", &self.cwd)
            .field("model", &self.model)
            .field("max_turns", &self.max_turns)
            .field("permission_mode", &self.permission_mode)
            .field("can_use_tool", &self.can_use_tool.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .field("system_prompt", &self.system_prompt)
            .field("allowed_tools", &self.allowed_tools)
            .field("disallowed_tools", &self.disallowed_tools)
            .field("resume", &self.resume)
            .field("extra_args", &self.extra_args)
            .field("grace_period", &self.grace_period)
            .field("permission_timeout", &self.permission_timeout)
            .field("decode_policy", &self.decode_policy)
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

impl AgentOptions {
    /// Create options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `AGENTLINK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut options = Self::default();
        if let Some(path) = lookup(ENV_CLI_PATH) {
            options.cli_path = PathBuf::from(path);
        }
        options.model = lookup(ENV_MODEL);
        options.cwd = lookup(ENV_CWD).map(PathBuf::from);
        if let Some(mode) = lookup(ENV_PERMISSION_MODE) {
            options.permission_mode = mode
                .parse()
                .map_err(|e: String| AgentError::Config(format!("{ENV_PERMISSION_MODE}: {e}")))?;
        }
        Ok(options)
    }

    /// Set the CLI path
    pub fn with_cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cli_path = path.into();
        self
    }

    /// Set the working directory
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the turn limit
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    /// Set the permission mode
    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    /// Set the permission callback
    pub fn with_can_use_tool(mut self, callback: PermissionCallback) -> Self {
        self.can_use_tool = Some(callback);
        self
    }

    /// Set the stderr sink
    pub fn with_stderr(mut self, sink: StderrSink) -> Self {
        self.stderr = Some(sink);
        self
    }

    /// Set an environment variable for the agent process
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Allow a tool without asking
    pub fn with_allowed_tool(mut self, tool: impl Into<String>) -> Self {
        self.allowed_tools.push(tool.into());
        self
    }

    /// Forbid a tool
    pub fn with_disallowed_tool(mut self, tool: impl Into<String>) -> Self {
        self.disallowed_tools.push(tool.into());
        self
    }

    /// Resume an earlier session
    pub fn with_resume(mut self, session_id: impl Into<String>) -> Self {
        self.resume = Some(session_id.into());
        self
    }

    /// Append a raw CLI argument
    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Set the shutdown grace period
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Bound how long a permission callback may take
    pub fn with_permission_timeout(mut self, timeout: Duration) -> Self {
        self.permission_timeout = Some(timeout);
        self
    }

    /// Set the decode policy
    pub fn with_decode_policy(mut self, policy: DecodePolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    /// Set the message buffer size
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Check option combinations that the CLI would reject
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(AgentError::Config(
                "channel_capacity must be at least 1".into(),
            ));
        }
        if self.max_turns == Some(0) {
            return Err(AgentError::Config("max_turns must be at least 1".into()));
        }
        Ok(())
    }

    /// Command-line arguments for the agent CLI
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "--output-format",
            "stream-json",
            "--input-format",
            "stream-json",
            "--verbose",
        ]
        .map(String::from)
        .into();

        let mut push = |flag: &str, value: String| {
            args.push(flag.to_string());
            args.push(value);
        };

        if let Some(model) = &self.model {
            push("--model", model.clone());
        }
        if let Some(max_turns) = self.max_turns {
            push("--max-turns", max_turns.to_string());
        }
        if self.permission_mode != PermissionMode::Default {
            push(
                "--permission-mode",
                self.permission_mode.as_cli_arg().to_string(),
            );
        }
        if let Some(prompt) = &self.system_prompt {
            push("--system-prompt", prompt.clone());
        }
        if !self.allowed_tools.is_empty() {
            push("--allowedTools", self.allowed_tools.join(","));
        }
        if !self.disallowed_tools.is_empty() {
            push("--disallowedTools", self.disallowed_tools.join(","));
        }
        if let Some(session_id) = &self.resume {
            push("--resume", session_id.clone());
        }
        if self.can_use_tool.is_some() {
            push("--permission-prompt-tool", "stdio".to_string());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Process configuration for spawning the agent CLI
    pub fn to_process_config(&self) -> ProcessConfig {
        let mut config = ProcessConfig::new(&self.cli_path)
            .with_args(self.to_cli_args())
            .with_grace_period(self.grace_period);
        config.env = self.env.clone();
        config.cwd = self.cwd.clone();
        config.stderr = self.stderr.clone();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::permission_callback;
    use agentlink_protocol::PermissionDecision;
    use std::sync::Arc;

    #[test]
    fn test_default_args() {
        let args = AgentOptions::default().to_cli_args();
        assert_eq!(
            args,
            vec![
                "--output-format",
                "stream-json",
                "--input-format",
                "stream-json",
                "--verbose"
            ]
        );
    }

    #[test]
    fn test_args_from_options() {
        let options = AgentOptions::new()
            .with_model("claude-sonnet-4-5")
            .with_max_turns(3)
            .with_permission_mode(PermissionMode::AcceptEdits)
            .with_system_prompt("be brief")
            .with_allowed_tool("Read")
            .with_allowed_tool("Grep")
            .with_disallowed_tool("Bash")
            .with_resume("sess-9")
            .with_extra_arg("--debug");

        let args = options.to_cli_args();
        let joined = args.join(" ");

        assert!(joined.contains("--model claude-sonnet-4-5"));
        assert!(joined.contains("--max-turns 3"));
        assert!(joined.contains("--permission-mode acceptEdits"));
        assert!(joined.contains("--allowedTools Read,Grep"));
        assert!(joined.contains("--disallowedTools Bash"));
        assert!(joined.contains("--resume sess-9"));
        assert!(!joined.contains("--permission-prompt-tool"));
        assert_eq!(args.last().map(String::as_str), Some("--debug"));

        let prompt_at = args.iter().position(|a| a == "--system-prompt").unwrap();
        assert_eq!(args[prompt_at + 1], "be brief");
    }

    #[test]
    fn test_callback_enables_stdio_prompt_tool() {
        let options = AgentOptions::new().with_can_use_tool(permission_callback(|_| async {
            Ok(PermissionDecision::allow())
        }));
        let joined = options.to_cli_args().join(" ");
        assert!(joined.contains("--permission-prompt-tool stdio"));
    }

    #[test]
    fn test_process_config_carries_environment_and_cwd() {
        let sink: StderrSink = Arc::new(|_line| {});
        let options = AgentOptions::new()
            .with_cli_path("/opt/agent/bin/claude")
            .with_cwd("/work")
            .with_env("ANTHROPIC_API_KEY", "sk-test")
            .with_stderr(sink)
            .with_grace_period(Duration::from_millis(100));

        let config = options.to_process_config();
        assert_eq!(config.program, PathBuf::from("/opt/agent/bin/claude"));
        assert_eq!(config.cwd, Some(PathBuf::from("/work")));
        assert_eq!(config.env.get("ANTHROPIC_API_KEY").unwrap(), "sk-test");
        assert!(config.stderr.is_some());
        assert!(!config.clear_env);
        assert_eq!(config.grace_period, Duration::from_millis(100));
        assert_eq!(config.args, options.to_cli_args());
    }

    #[test]
    fn test_from_lookup() {
        let vars = HashMap::from([
            (ENV_CLI_PATH, "/usr/local/bin/claude"),
            (ENV_MODEL, "opus"),
            (ENV_PERMISSION_MODE, "bypassPermissions"),
        ]);
        let options =
            AgentOptions::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(options.cli_path, PathBuf::from("/usr/local/bin/claude"));
        assert_eq!(options.model.as_deref(), Some("opus"));
        assert_eq!(options.permission_mode, PermissionMode::BypassPermissions);
        assert!(options.cwd.is_none());
    }

    #[test]
    fn test_from_lookup_rejects_bad_mode() {
        let err = AgentOptions::from_lookup(|key| {
            (key == ENV_PERMISSION_MODE).then(|| "sometimes".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn test_validate() {
        assert!(AgentOptions::default().validate().is_ok());
        assert!(
            AgentOptions::default()
                .with_channel_capacity(0)
                .validate()
                .is_err()
        );
        assert!(AgentOptions::default().with_max_turns(0).validate().is_err());
    }

    #[test]
    fn test_debug_hides_env_values() {
        let options = AgentOptions::new().with_env("ANTHROPIC_API_KEY", "sk-secret");
        assert!(!format!("{options:?}").contains("sk-secret"));
    }
}
