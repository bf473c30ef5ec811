// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One long-lived interactive shell to a lab host.

use crate::error::ShellError;
use slog::{debug, warn, Logger};
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::Duration;
use stratus_common::backoff;
use stratus_config::JumpHostConfig;
use tokio::time::Instant;

use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};

/// Default timeout for short commands.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

// How long the remote side must stay quiet before the banner is
// considered finished and its last line taken as the prompt.
const PROMPT_QUIET: Duration = Duration::from_millis(700);
const PROMPT_CAPTURE_MAX: Duration = Duration::from_secs(30);

/// One `(pattern, response)` step for [`ShellConnection::send_expect`].
/// A `None` response marks a prompt that is only waited for.
#[derive(Clone, Debug)]
pub struct PromptResponse {
    pub pattern: String,
    pub response: Option<String>,
}

impl PromptResponse {
    pub fn expect(pattern: &str) -> PromptResponse {
        PromptResponse { pattern: pattern.to_string(), response: None }
    }

    pub fn with_response(pattern: &str, response: &str) -> PromptResponse {
        PromptResponse {
            pattern: pattern.to_string(),
            response: Some(response.to_string()),
        }
    }
}

// Lab hosts get reinstalled all the time; accept whatever host key they
// present, as the original harness did.
#[derive(Debug)]
struct LabHostVerifier;

#[async_trait::async_trait]
impl client::Handler for LabHostVerifier {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

struct Session {
    channel: Channel<Msg>,
    handle: Handle<LabHostVerifier>,
    // kept alive for the lifetime of the tunneled connection
    _jump_handle: Option<Handle<LabHostVerifier>>,
    prompt: String,
}

// A command deadline, remembering the configured timeout for error
// reporting.
#[derive(Clone, Copy)]
struct Deadline {
    at: Instant,
    total: Duration,
}

impl Deadline {
    fn new(timeout: Duration) -> Deadline {
        Deadline { at: Instant::now() + timeout, total: timeout }
    }
}

/// A long-lived interactive shell to one host, optionally tunneled
/// through a jump host.  The remote prompt is captured at connect time
/// and every `send` runs to the next occurrence of it.
pub struct ShellConnection {
    pub name: String,
    host: String,
    user: String,
    password: String,
    ssh_port: u16,
    jump_host: Option<JumpHostConfig>,
    log: Logger,
    session: Option<Session>,
}

impl ShellConnection {
    pub fn new(
        log: &Logger,
        name: &str,
        host: &str,
        user: &str,
        password: &str,
        ssh_port: u16,
        jump_host: Option<JumpHostConfig>,
    ) -> ShellConnection {
        ShellConnection {
            name: name.to_string(),
            host: host.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            ssh_port,
            jump_host,
            log: log.new(slog::o!(
                "shell" => name.to_string(),
                "host" => host.to_string(),
            )),
            session: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| !s.handle.is_closed())
    }

    /// Establish the session if the channel is dead, retrying within
    /// the bounded reconnect window.  Auth and jump-host failures are
    /// not retried.
    pub async fn connect(&mut self) -> Result<(), ShellError> {
        if self.is_connected() {
            return Ok(());
        }
        self.session = None;

        let this = &*self;
        let log = this.log.clone();
        let session = backoff::retry_notify(
            backoff::shell_reconnect_policy(),
            move || async move {
                this.open_session().await.map_err(|error| match error {
                    fatal @ (ShellError::Auth { .. }
                    | ShellError::JumpHost { .. }) => {
                        backoff::BackoffError::permanent(fatal)
                    }
                    transient => backoff::BackoffError::transient(transient),
                })
            },
            move |error, delay| {
                warn!(
                    log,
                    "connect failed; retrying";
                    "error" => %error,
                    "retry_after" => ?delay,
                );
            },
        )
        .await?;

        debug!(self.log, "connected"; "prompt" => &session.prompt);
        self.session = Some(session);
        Ok(())
    }

    /// Close the session and the tunnel under it, if any.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session
                .handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await;
            if let Some(jump) = session._jump_handle {
                let _ = jump
                    .disconnect(Disconnect::ByApplication, "", "English")
                    .await;
            }
        }
    }

    /// Run `cmd` to the next prompt and return its output lines.  A dead
    /// channel is re-established and the command retried once; a second
    /// channel-level failure surfaces as [`ShellError::Broken`].
    pub async fn send(
        &mut self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<Vec<String>, ShellError> {
        self.connect().await?;
        match self.run_to_prompt(cmd, timeout).await {
            Err(error) if error.is_channel_level() => {
                warn!(
                    self.log,
                    "channel error; reconnecting and retrying once";
                    "error" => %error,
                );
                self.session = None;
                self.connect().await?;
                self.run_to_prompt(cmd, timeout).await
            }
            other => other,
        }
    }

    /// As [`ShellConnection::send`], escalating with `sudo` and
    /// answering the password prompt (at most once) with the lab admin
    /// password.
    pub async fn send_as_sudo(
        &mut self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<Vec<String>, ShellError> {
        self.connect().await?;
        let full_cmd = format!("sudo {}", cmd);
        let deadline = Deadline::new(timeout);
        self.write_line(&full_cmd).await?;

        let mut answered = false;
        let mut buffer = String::new();
        loop {
            buffer.push_str(&self.read_chunk(&full_cmd, deadline).await?);
            // Skip the "P" so both "Password:" and "password:" match.
            if !answered && buffer.contains("assword") {
                answered = true;
                let password = self.password.clone();
                self.write_line(&password).await?;
                continue;
            }
            let prompt = &self.session.as_ref().unwrap().prompt;
            if ends_with_prompt(&buffer, prompt) {
                let prompt = prompt.clone();
                return Ok(extract_lines(&buffer, &full_cmd, &prompt));
            }
        }
    }

    /// Run `cmd`, dispatching responses as the given prompts match in
    /// order; the last entry is the terminal prompt.  Returns the output
    /// collected while waiting for the terminal prompt.
    pub async fn send_expect(
        &mut self,
        cmd: &str,
        prompts: &[PromptResponse],
        timeout: Duration,
    ) -> Result<Vec<String>, ShellError> {
        assert!(
            !prompts.is_empty(),
            "send_expect requires at least one prompt; use send instead"
        );
        self.connect().await?;
        self.write_line(cmd).await?;

        let mut segment = String::new();
        for prompt in prompts {
            segment.clear();
            let deadline = Deadline::new(timeout);
            loop {
                segment.push_str(&self.read_chunk(cmd, deadline).await?);
                if segment.contains(&prompt.pattern) {
                    if let Some(response) = &prompt.response {
                        let response = response.clone();
                        self.write_line(&response).await?;
                    }
                    break;
                }
            }
            debug!(self.log, "prompt matched"; "pattern" => &prompt.pattern);
        }
        Ok(segment.lines().map(str::to_string).collect())
    }

    async fn run_to_prompt(
        &mut self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<Vec<String>, ShellError> {
        debug!(self.log, "send"; "cmd" => cmd);
        let deadline = Deadline::new(timeout);
        self.write_line(cmd).await?;

        let mut buffer = String::new();
        loop {
            buffer.push_str(&self.read_chunk(cmd, deadline).await?);
            let prompt = &self.session.as_ref().unwrap().prompt;
            if ends_with_prompt(&buffer, prompt) {
                let prompt = prompt.clone();
                let lines = extract_lines(&buffer, cmd, &prompt);
                for line in &lines {
                    debug!(self.log, "recv"; "line" => line);
                }
                return Ok(lines);
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), ShellError> {
        let session = self.session.as_mut().expect("connected before write");
        let payload = format!("{}\n", line);
        session.channel.data(payload.as_bytes()).await.map_err(|_| {
            ShellError::Broken {
                host: self.host.clone(),
                detail: "failed to write to channel".to_string(),
            }
        })
    }

    // Read one chunk of cleaned output, or fail when `deadline` passes.
    async fn read_chunk(
        &mut self,
        cmd: &str,
        deadline: Deadline,
    ) -> Result<String, ShellError> {
        let session = self.session.as_mut().expect("connected before read");
        loop {
            let remaining =
                deadline.at.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ShellError::Timeout {
                    command: cmd.to_string(),
                    timeout: deadline.total,
                });
            }
            let message =
                tokio::time::timeout(remaining, session.channel.wait()).await;
            match message {
                Err(_) => {
                    return Err(ShellError::Timeout {
                        command: cmd.to_string(),
                        timeout: deadline.total,
                    });
                }
                Ok(None) => {
                    return Err(ShellError::Broken {
                        host: self.host.clone(),
                        detail: "channel closed mid-command".to_string(),
                    });
                }
                Ok(Some(ChannelMsg::Data { data })) => {
                    return Ok(clean_output(&data));
                }
                Ok(Some(ChannelMsg::ExtendedData { data, .. })) => {
                    return Ok(clean_output(&data));
                }
                // Window adjustments, exit statuses of the remote shell
                // itself, and the like.
                Ok(Some(_)) => continue,
            }
        }
    }

    async fn open_session(&self) -> Result<Session, ShellError> {
        let config = Arc::new(client::Config::default());

        let (mut handle, jump_handle) = match &self.jump_host {
            Some(jump) => {
                let mut jump_handle = client::connect(
                    Arc::clone(&config),
                    (jump.host.as_str(), jump.ssh_port),
                    LabHostVerifier,
                )
                .await
                .map_err(|source| ShellError::JumpHost {
                    host: jump.host.clone(),
                    source,
                })?;
                let authed = jump_handle
                    .authenticate_password(
                        &jump.credentials.user_name,
                        &jump.credentials.password,
                    )
                    .await
                    .map_err(|source| ShellError::JumpHost {
                        host: jump.host.clone(),
                        source,
                    })?;
                if !authed {
                    return Err(ShellError::Auth {
                        host: jump.host.clone(),
                        user: jump.credentials.user_name.clone(),
                    });
                }
                let tunnel = jump_handle
                    .channel_open_direct_tcpip(
                        &self.host,
                        u32::from(self.ssh_port),
                        "127.0.0.1",
                        0,
                    )
                    .await
                    .map_err(|source| ShellError::JumpHost {
                        host: jump.host.clone(),
                        source,
                    })?;
                let handle = client::connect_stream(
                    Arc::clone(&config),
                    tunnel.into_stream(),
                    LabHostVerifier,
                )
                .await
                .map_err(|source| self.broken(source.to_string()))?;
                (handle, Some(jump_handle))
            }
            None => {
                let handle = client::connect(
                    Arc::clone(&config),
                    (self.host.as_str(), self.ssh_port),
                    LabHostVerifier,
                )
                .await
                .map_err(|source| self.broken(source.to_string()))?;
                (handle, None)
            }
        };

        let authed = handle
            .authenticate_password(&self.user, &self.password)
            .await
            .map_err(|source| self.broken(source.to_string()))?;
        if !authed {
            return Err(ShellError::Auth {
                host: self.host.clone(),
                user: self.user.clone(),
            });
        }

        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|source| self.broken(source.to_string()))?;
        channel
            .request_pty(false, "xterm", 200, 50, 0, 0, &[])
            .await
            .map_err(|source| self.broken(source.to_string()))?;
        channel
            .request_shell(true)
            .await
            .map_err(|source| self.broken(source.to_string()))?;

        let prompt = self.capture_prompt(&mut channel).await?;
        Ok(Session {
            channel,
            handle,
            _jump_handle: jump_handle,
            prompt,
        })
    }

    // Drain the login banner; once the remote side goes quiet the last
    // line is the prompt every later send waits for.
    async fn capture_prompt(
        &self,
        channel: &mut Channel<Msg>,
    ) -> Result<String, ShellError> {
        let started = Instant::now();
        let mut buffer = String::new();
        loop {
            match tokio::time::timeout(PROMPT_QUIET, channel.wait()).await {
                Ok(Some(ChannelMsg::Data { data })) => {
                    buffer.push_str(&clean_output(&data));
                }
                Ok(Some(_)) => continue,
                Ok(None) => {
                    return Err(self
                        .broken("channel closed during prompt capture"));
                }
                Err(_) => {
                    if !buffer.trim().is_empty() {
                        break;
                    }
                    if started.elapsed() > PROMPT_CAPTURE_MAX {
                        return Err(
                            self.broken("no prompt received from host")
                        );
                    }
                }
            }
        }
        let prompt = buffer
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default()
            .to_string();
        Ok(prompt)
    }

    fn broken(&self, detail: impl ToString) -> ShellError {
        ShellError::Broken {
            host: self.host.clone(),
            detail: detail.to_string(),
        }
    }
}

// Matches ANSI terminal control codes (colors, cursor movement) that
// interactive shells mix into their output.
static ANSI_ESCAPES: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\x1B(?:[@-Z\\_-]|\[[0-?]*[ -/]*[@-~])")
        .expect("static regex compiles")
});

fn clean_output(data: &[u8]) -> String {
    let text = String::from_utf8_lossy(data);
    ANSI_ESCAPES.replace_all(&text, "").replace('\r', "")
}

fn ends_with_prompt(buffer: &str, prompt: &str) -> bool {
    !prompt.is_empty() && buffer.trim_end().ends_with(prompt.trim_end())
}

// The first line of interactive output echoes the command and the last
// line is the next prompt; neither is part of the command's output.
fn extract_lines(buffer: &str, cmd: &str, prompt: &str) -> Vec<String> {
    let mut lines: Vec<&str> = buffer.lines().collect();
    if let Some(last) = lines.last() {
        if last.trim_end().ends_with(prompt.trim_end()) {
            lines.pop();
        }
    }
    if let Some(first) = lines.first() {
        if first.contains(cmd) {
            lines.remove(0);
        }
    }
    lines.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clean_output_strips_ansi_and_cr() {
        let raw = b"\x1b[01;32mcontroller-0\x1b[00m:~$ ls\r\nfile\r\n";
        assert_eq!(clean_output(raw), "controller-0:~$ ls\nfile\n");
    }

    #[test]
    fn test_ends_with_prompt() {
        let prompt = "sysadmin@controller-0:~$ ";
        let buffer = "ls\nfile-a\nfile-b\nsysadmin@controller-0:~$ ";
        assert!(ends_with_prompt(buffer, prompt));
        assert!(!ends_with_prompt("ls\nfile-a\n", prompt));
        assert!(!ends_with_prompt(buffer, ""));
    }

    #[test]
    fn test_extract_lines_drops_echo_and_prompt() {
        let prompt = "sysadmin@controller-0:~$";
        let buffer = "system host-list\n\
                      | id | hostname |\n\
                      | 1  | controller-0 |\n\
                      sysadmin@controller-0:~$ ";
        let lines = extract_lines(buffer, "system host-list", prompt);
        assert_eq!(
            lines,
            vec!["| id | hostname |", "| 1  | controller-0 |"]
        );
    }

    #[test]
    fn test_prompt_response_constructors() {
        let wait = PromptResponse::expect("~$");
        assert!(wait.response.is_none());
        let answer = PromptResponse::with_response("assword:", "secret");
        assert_eq!(answer.response.as_deref(), Some("secret"));
    }
}
