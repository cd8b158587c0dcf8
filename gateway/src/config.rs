//! Startup configuration
//!
//! Every setting is environment-derived and read exactly once at startup.
//! The container platform injects `PORT`; everything else uses `GATEWAY_*`
//! variables with documented defaults.

use clap::Parser;
use std::time::Duration;

use crate::child::ChildSpec;
use crate::error::GatewayError;

/// Gateway configuration, parsed from CLI flags or environment.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "analytics-gateway",
    about = "Supervising HTTP/SSE gateway for a stdio analytics tool server"
)]
pub struct Config {
    /// Port to listen on (injected by the container platform)
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// HTTP path exposing the bridged tool protocol
    #[arg(long, env = "GATEWAY_STREAM_PATH", default_value = "/mcp")]
    pub stream_path: String,

    /// Shared secret for bearer auth on the stream path; unset disables auth
    #[arg(long, env = "GATEWAY_API_KEY")]
    pub api_key: Option<String>,

    /// Interpreter binary used to run the tool server module
    #[arg(long, env = "GATEWAY_CHILD_INTERPRETER", default_value = "python3")]
    pub child_interpreter: String,

    /// Module implementing the tool server (run as `<interpreter> -m <module>`)
    #[arg(long, env = "GATEWAY_CHILD_MODULE", default_value = "analytics_mcp.server")]
    pub child_module: String,

    /// Full child command line; overrides interpreter/module when set
    #[arg(long, env = "GATEWAY_CHILD_COMMAND")]
    pub child_command: Option<String>,

    /// Seconds to wait for the child to come up before exiting
    #[arg(long, env = "GATEWAY_STARTUP_TIMEOUT_SECS", default_value_t = 10)]
    pub startup_timeout_secs: u64,

    /// Seconds to wait for a correlated response before failing a request
    #[arg(long, env = "GATEWAY_RESPONSE_TIMEOUT_SECS", default_value_t = 30)]
    pub response_timeout_secs: u64,
}

impl Config {
    /// Resolve the child command line.
    ///
    /// `child_command` wins when set (whitespace-split argv); otherwise the
    /// interpreter/module pair is assembled as `<interpreter> -m <module>`.
    pub fn child_spec(&self) -> Result<ChildSpec, GatewayError> {
        if let Some(command) = &self.child_command {
            let mut parts = command.split_whitespace().map(str::to_string);
            let program = parts
                .next()
                .ok_or_else(|| GatewayError::Config("child command is empty".into()))?;
            return Ok(ChildSpec {
                program,
                args: parts.collect(),
            });
        }

        if self.child_interpreter.is_empty() || self.child_module.is_empty() {
            return Err(GatewayError::Config(
                "child interpreter and module must be non-empty".into(),
            ));
        }

        Ok(ChildSpec {
            program: self.child_interpreter.clone(),
            args: vec!["-m".into(), self.child_module.clone()],
        })
    }

    /// Stream path with a guaranteed leading slash.
    pub fn normalized_stream_path(&self) -> String {
        if self.stream_path.starts_with('/') {
            self.stream_path.clone()
        } else {
            format!("/{}", self.stream_path)
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["analytics-gateway"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).expect("config should parse")
    }

    #[test]
    fn defaults() {
        let config = parse(&[]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.stream_path, "/mcp");
        assert_eq!(config.child_interpreter, "python3");
        assert_eq!(config.child_module, "analytics_mcp.server");
        assert_eq!(config.startup_timeout(), Duration::from_secs(10));
        assert_eq!(config.response_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn interpreter_and_module_assemble_child_spec() {
        let config = parse(&["--child-module", "analytics_mcp.server"]);
        let spec = config.child_spec().unwrap();
        assert_eq!(spec.program, "python3");
        assert_eq!(spec.args, vec!["-m", "analytics_mcp.server"]);
    }

    #[test]
    fn child_command_override_wins() {
        let config = parse(&["--child-command", "/bin/cat -u"]);
        let spec = config.child_spec().unwrap();
        assert_eq!(spec.program, "/bin/cat");
        assert_eq!(spec.args, vec!["-u"]);
    }

    #[test]
    fn empty_child_command_is_rejected() {
        let config = parse(&["--child-command", "   "]);
        assert!(matches!(
            config.child_spec(),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn stream_path_is_normalized() {
        let config = parse(&["--stream-path", "mcp"]);
        assert_eq!(config.normalized_stream_path(), "/mcp");
    }
}
