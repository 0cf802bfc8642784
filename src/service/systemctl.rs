// src/service/systemctl.rs

//! `systemctl`-backed service controller.

use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{ServiceController, ServiceFuture};
use crate::errors::Result;

/// Runs `<program> <verb> <extra_args..> <service>` and waits for it.
///
/// With the defaults this is `systemctl enable --now linstor-controller`.
#[derive(Debug, Clone)]
pub struct SystemctlController {
    program: String,
    extra_args: Vec<String>,
}

impl Default for SystemctlController {
    fn default() -> Self {
        Self {
            program: "systemctl".to_string(),
            extra_args: vec!["--now".to_string()],
        }
    }
}

impl SystemctlController {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }

    /// Run one verb.
    ///
    /// Only a failure to spawn or wait for the command is returned as an
    /// error; a non-zero exit status is logged, matching how `systemctl`
    /// failures are reported to the service manager's own journal anyway.
    async fn run(&self, verb: &str, service: &str) -> Result<()> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(verb)
            .args(&self.extra_args)
            .arg(service)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(program = %self.program, verb, service, "running service command");

        let status = cmd
            .status()
            .await
            .with_context(|| format!("running `{} {verb} {service}`", self.program))?;

        if status.success() {
            info!("`{}` completed normally.", self.program);
        } else if let Some(code) = status.code() {
            error!(exit_code = code, "`{}` exited with an error: {code}.", self.program);
        } else {
            report_signal(&self.program, &status);
        }

        Ok(())
    }
}

#[cfg(unix)]
fn report_signal(program: &str, status: &std::process::ExitStatus) {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => error!(signal, "`{program}` terminated by signal {signal}."),
        None => error!("`{program}` ended abnormally: {status}."),
    }
}

#[cfg(not(unix))]
fn report_signal(program: &str, status: &std::process::ExitStatus) {
    error!("`{program}` ended abnormally: {status}.");
}

impl ServiceController for SystemctlController {
    fn enable<'a>(&'a self, service: &'a str) -> ServiceFuture<'a> {
        Box::pin(self.run("enable", service))
    }

    fn disable<'a>(&'a self, service: &'a str) -> ServiceFuture<'a> {
        Box::pin(self.run("disable", service))
    }
}
