//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use capataz::cancel::CancelToken;
use capataz::clock::Clock;
use capataz::engine::{ContainerEngine, ContainerState, ContainerStatus};
use capataz::error::{DeployError, DeployResult};
use capataz::plan::Mode;
use capataz::remote::{ExecOutput, RemoteChannel};
use capataz::target::ImageRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Inspect(String),
    Materialize(String, Mode),
    Stop(String),
    Start(String, Option<String>),
}

impl Call {
    pub fn target(&self) -> &str {
        match self {
            Self::Inspect(t) | Self::Materialize(t, _) | Self::Stop(t) | Self::Start(t, _) => t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Materialize,
    Inspect,
    Stop,
    Start,
    /// `start` with a pinned image, i.e. the rollback restart.
    RestoreStart,
}

#[derive(Debug)]
struct Service {
    state: ContainerState,
    image: Option<String>,
    next_image: String,
    /// Set once the new container is started; from then on each
    /// inspect consumes the next scripted state.
    activated: bool,
    /// States reported after activation; the last one repeats.
    script: VecDeque<ContainerState>,
    failures: HashSet<Op>,
}

/// Scripted [`ContainerEngine`] that records every call.
#[derive(Debug, Default)]
pub struct FakeEngine {
    services: RefCell<HashMap<String, Service>>,
    calls: RefCell<Vec<Call>>,
    /// Interrupt fired while the named service is being started.
    interrupt: RefCell<Option<(String, CancelToken)>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service currently running `running` (or missing when
    /// `None`) whose next materialize produces `next`.
    pub fn service(self, name: &str, running: Option<&str>, next: &str) -> Self {
        self.services.borrow_mut().insert(
            name.to_string(),
            Service {
                state: if running.is_some() {
                    ContainerState::Running
                } else {
                    ContainerState::Missing
                },
                image: running.map(str::to_string),
                next_image: next.to_string(),
                activated: false,
                script: VecDeque::from([ContainerState::Running]),
                failures: HashSet::new(),
            },
        );
        self
    }

    /// States the service reports once the new container starts.
    pub fn polls(self, name: &str, states: &[ContainerState]) -> Self {
        self.with(name, |s| s.script = states.iter().copied().collect());
        self
    }

    pub fn fail(self, name: &str, op: Op) -> Self {
        self.with(name, |s| {
            s.failures.insert(op);
        });
        self
    }

    /// Cancel `token` in the middle of `name`'s activation, the way a
    /// Ctrl-C lands while a remote command is running.
    pub fn interrupt_during_start(self, name: &str, token: &CancelToken) -> Self {
        *self.interrupt.borrow_mut() = Some((name.to_string(), token.clone()));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn calls_for(&self, target: &str) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.target() == target)
            .cloned()
            .collect()
    }

    pub fn image_of(&self, name: &str) -> Option<String> {
        self.services.borrow()[name].image.clone()
    }

    pub fn state_of(&self, name: &str) -> ContainerState {
        self.services.borrow()[name].state
    }

    fn with(&self, name: &str, f: impl FnOnce(&mut Service)) {
        let mut services = self.services.borrow_mut();
        let service = services
            .get_mut(name)
            .unwrap_or_else(|| panic!("unknown fake service {name}"));
        f(service);
    }

    fn check(&self, name: &str, op: Op) -> DeployResult<()> {
        let services = self.services.borrow();
        let service = services
            .get(name)
            .ok_or_else(|| DeployError::Other(format!("no such service: {name}")))?;
        if service.failures.contains(&op) {
            return Err(DeployError::RemoteFailed {
                code: Some(1),
                stderr: format!("{op:?} failed for {name}"),
            });
        }
        Ok(())
    }
}

impl ContainerEngine for FakeEngine {
    fn inspect(&self, target: &str) -> DeployResult<ContainerStatus> {
        self.calls.borrow_mut().push(Call::Inspect(target.to_string()));
        self.check(target, Op::Inspect)?;

        let mut services = self.services.borrow_mut();
        let service = services.get_mut(target).expect("checked above");
        if service.activated {
            let next = if service.script.len() > 1 {
                service.script.pop_front()
            } else {
                service.script.front().copied()
            };
            service.state = next.unwrap_or(ContainerState::Running);
        }
        Ok(ContainerStatus {
            state: service.state,
            image: service.image.as_deref().map(ImageRef::new),
        })
    }

    fn materialize(&self, target: &str, mode: Mode) -> DeployResult<()> {
        self.calls
            .borrow_mut()
            .push(Call::Materialize(target.to_string(), mode));
        self.check(target, Op::Materialize)
    }

    fn stop(&self, target: &str) -> DeployResult<()> {
        self.calls.borrow_mut().push(Call::Stop(target.to_string()));
        self.check(target, Op::Stop)?;
        self.with(target, |s| {
            s.state = ContainerState::Exited;
            s.activated = false;
        });
        Ok(())
    }

    fn start(&self, target: &str, image: Option<&ImageRef>) -> DeployResult<()> {
        self.calls.borrow_mut().push(Call::Start(
            target.to_string(),
            image.map(ToString::to_string),
        ));

        if let Some((name, token)) = &*self.interrupt.borrow() {
            if name == target {
                token.cancel();
            }
        }

        match image {
            None => {
                self.check(target, Op::Start)?;
                self.with(target, |s| {
                    s.image = Some(s.next_image.clone());
                    s.activated = true;
                });
            }
            Some(image) => {
                self.check(target, Op::RestoreStart)?;
                self.with(target, |s| {
                    s.image = Some(image.to_string());
                    s.state = ContainerState::Running;
                });
            }
        }
        Ok(())
    }
}

/// Virtual clock: `sleep` advances time instantly.
#[derive(Debug, Default)]
pub struct FakeClock {
    now: Cell<Duration>,
    sleeps: Cell<u32>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> u32 {
        self.sleeps.get()
    }

    /// Let time pass without counting a sleep.
    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
        self.sleeps.set(self.sleeps.get() + 1);
    }
}

/// [`RemoteChannel`] that records commands and answers from a queue.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    commands: RefCell<Vec<String>>,
    replies: RefCell<VecDeque<DeployResult<ExecOutput>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, exit_code: i32, stdout: &str) -> Self {
        self.replies.borrow_mut().push_back(Ok(ExecOutput {
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }));
        self
    }

    pub fn unreachable(self) -> Self {
        self.replies
            .borrow_mut()
            .push_back(Err(DeployError::SshFailed("connection timed out".into())));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl RemoteChannel for RecordingChannel {
    fn exec(&self, command: &str) -> DeployResult<ExecOutput> {
        self.commands.borrow_mut().push(command.to_string());
        self.replies.borrow_mut().pop_front().unwrap_or_else(|| {
            Ok(ExecOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            })
        })
    }

    fn describe(&self) -> String {
        "test@fake".to_string()
    }
}

/// [`RemoteChannel`] running commands in a local `sh`, with a stub
/// `docker` script first on `PATH`.
pub struct LocalShell {
    dir: tempfile::TempDir,
}

impl LocalShell {
    /// `docker` is replaced by a shell script with body `script`.
    pub fn with_docker(script: &str) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let docker = dir.path().join("docker");
        std::fs::write(&docker, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&docker, std::fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir }
    }

    pub fn dir(&self) -> &str {
        self.dir.path().to_str().unwrap()
    }
}

impl RemoteChannel for LocalShell {
    fn exec(&self, command: &str) -> DeployResult<ExecOutput> {
        let path = format!(
            "{}:{}",
            self.dir(),
            std::env::var("PATH").unwrap_or_default()
        );
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("PATH", path)
            .output()?;

        Ok(ExecOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn describe(&self) -> String {
        "local".to_string()
    }
}
