use std::path::Path;

use docker_compose_types::Compose;

use crate::engine::{ContainerEngine, ContainerState, ContainerStatus};
use crate::error::{DeployError, DeployResult};
use crate::plan::Mode;
use crate::remote::{ExecOutput, RemoteChannel};
use crate::target::ImageRef;

/// Go template printed by `docker inspect` for a state query:
/// `<state> <image id>`.
const INSPECT_FORMAT: &str = "'{{.State.Status}} {{.Image}}'";

/// [`ContainerEngine`] driving `docker compose` in a project
/// directory on the remote host.
///
/// Every mutating command names a single service and passes
/// `--no-deps`, so one target's activation never recreates another
/// target's container.
pub struct ComposeEngine<C> {
    channel: C,
    remote_dir: String,
    query_retries: u32,
}

impl<C: RemoteChannel> ComposeEngine<C> {
    #[must_use]
    pub fn new(channel: C, remote_dir: &str) -> Self {
        Self {
            channel,
            remote_dir: remote_dir.to_string(),
            query_retries: 2,
        }
    }

    /// Extra attempts for read-only state queries. Mutating commands
    /// are never retried.
    #[must_use]
    pub const fn query_retries(mut self, retries: u32) -> Self {
        self.query_retries = retries;
        self
    }

    #[must_use]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// A failing `docker compose ps` fails the whole query rather
    /// than reading as a missing container.
    #[must_use]
    pub fn inspect_command(&self, target: &str) -> String {
        format!(
            "{} && ids=$(docker compose ps -a -q {target}) && \
             id=$(printf '%s\\n' \"$ids\" | head -n1) && \
             if [ -z \"$id\" ]; then echo missing; \
             else docker inspect --format {INSPECT_FORMAT} \"$id\"; fi",
            self.cd()
        )
    }

    #[must_use]
    pub fn materialize_command(&self, target: &str, mode: Mode) -> String {
        let verb = match mode {
            Mode::Build => "build",
            Mode::PullOnly => "pull",
        };
        format!("{} && docker compose {verb} {target}", self.cd())
    }

    #[must_use]
    pub fn stop_command(&self, target: &str) -> String {
        format!("{} && docker compose stop {target}", self.cd())
    }

    #[must_use]
    pub fn start_command(&self, target: &str, image: Option<&ImageRef>) -> String {
        match image {
            None => format!(
                "{} && docker compose up -d --no-deps --force-recreate {target}",
                self.cd()
            ),
            // Point the service's configured tag back at the pinned
            // image, then recreate without building or pulling.
            Some(image) => format!(
                "{} && docker tag {} \"$(docker compose config --images {target} | head -n1)\" && \
                 docker compose up -d --no-deps --force-recreate --no-build --pull never {target}",
                self.cd(),
                shell_quote(image.as_str())
            ),
        }
    }

    fn cd(&self) -> String {
        format!("cd {}", shell_quote(&self.remote_dir))
    }

    fn mutate(&self, command: &str) -> DeployResult<()> {
        self.channel.exec(command)?.into_stdout().map(|_| ())
    }
}

impl<C: RemoteChannel> ContainerEngine for ComposeEngine<C> {
    fn inspect(&self, target: &str) -> DeployResult<ContainerStatus> {
        let command = self.inspect_command(target);
        let mut attempt = 0;

        loop {
            let result = self
                .channel
                .exec(&command)
                .and_then(ExecOutput::into_stdout)
                .and_then(|stdout| parse_inspect(&stdout));

            match result {
                Ok(status) => return Ok(status),
                Err(e) if attempt < self.query_retries => {
                    attempt += 1;
                    tracing::warn!(
                        service = target,
                        host = %self.channel.describe(),
                        attempt,
                        error = %e,
                        "state query failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn materialize(&self, target: &str, mode: Mode) -> DeployResult<()> {
        self.mutate(&self.materialize_command(target, mode))
    }

    fn stop(&self, target: &str) -> DeployResult<()> {
        self.mutate(&self.stop_command(target))
    }

    fn start(&self, target: &str, image: Option<&ImageRef>) -> DeployResult<()> {
        self.mutate(&self.start_command(target, image))
    }
}

/// Parse the output of [`ComposeEngine::inspect_command`].
pub fn parse_inspect(output: &str) -> DeployResult<ContainerStatus> {
    let line = output.lines().next().unwrap_or("").trim();
    let mut parts = line.split_whitespace();

    let state: ContainerState = parts.next().unwrap_or("missing").parse()?;
    if state == ContainerState::Missing {
        return Ok(ContainerStatus::missing());
    }

    let image = parts.next().ok_or_else(|| {
        DeployError::Other(format!("state query returned no image: {line}"))
    })?;

    Ok(ContainerStatus::new(state, image))
}

/// Service names declared in a local compose file.
pub fn declared_services(path: &Path) -> DeployResult<Vec<String>> {
    if !path.exists() {
        return Err(DeployError::FileNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let compose: Compose = serde_yaml::from_str(&content)?;

    Ok(compose.services.0.keys().cloned().collect())
}

/// Single-quote `s` for a POSIX shell.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
