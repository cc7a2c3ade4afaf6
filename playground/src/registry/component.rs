//! Declarative component definitions.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use super::template::Template;
use crate::{
    network::AddressClass,
    runtime::{HealthCheck, PortMapping},
};

/// Where a mount's host side lives, relative to the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// `<data>/artifacts[/sub]`, written by genesis generation.
    Artifacts(Option<PathBuf>),
    /// `<data>/data/<sub>`, a component's persisted volume.
    Data(PathBuf),
    /// `<data>/config/<component>`, files rendered for this component.
    Config,
}

/// A directory mounted into a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Host side.
    pub source: MountSource,
    /// Path inside the container.
    pub target: String,
    /// Mount read-only.
    pub read_only: bool,
}

/// A file rendered into the component's config directory before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// File name within the config directory.
    pub name: String,
    /// Contents.
    pub contents: Template,
}

/// A component: one long-running container and everything needed to launch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    /// Unique name, also used as the container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Address class.
    pub class: AddressClass,
    /// Slot within the class.
    pub slot: u8,
    /// Command arguments.
    pub command: Vec<Template>,
    /// Environment variables.
    pub env: BTreeMap<String, Template>,
    /// Published ports.
    pub ports: Vec<PortMapping>,
    /// Mounts.
    pub mounts: Vec<MountSpec>,
    /// Files rendered into `<data>/config/<name>`.
    pub files: Vec<ConfigFile>,
    /// Components that must be healthy before this one starts.
    pub depends_on: Vec<String>,
    /// Readiness check.
    pub health: HealthCheck,
    /// User to run as.
    pub user: Option<String>,
    /// Component whose PID namespace is shared.
    pub share_pid_with: Option<String>,
    /// Delay the start until the genesis timestamp has passed.
    pub await_genesis: bool,
}

impl ComponentSpec {
    /// A component with no command, ports or dependencies that is healthy once running.
    pub fn new(name: impl Into<String>, image: impl Into<String>, class: AddressClass, slot: u8) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            class,
            slot,
            command: Vec::new(),
            env: BTreeMap::new(),
            ports: Vec::new(),
            mounts: Vec::new(),
            files: Vec::new(),
            depends_on: Vec::new(),
            health: HealthCheck::running(Duration::from_secs(30)),
            user: None,
            share_pid_with: None,
            await_genesis: false,
        }
    }

    /// Appends command arguments.
    pub fn with_command<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Template>,
    {
        self.command.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<Template>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Publishes container ports on the same host ports.
    pub fn with_ports(mut self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.ports.extend(ports.into_iter().map(PortMapping::same));
        self
    }

    /// Publishes a container port on a different host port.
    pub fn with_port_mapping(mut self, container: u16, host: u16) -> Self {
        self.ports.push(PortMapping { container, host });
        self
    }

    /// Adds a mount.
    pub fn with_mount(mut self, source: MountSource, target: impl Into<String>, read_only: bool) -> Self {
        self.mounts.push(MountSpec { source, target: target.into(), read_only });
        self
    }

    /// Adds a rendered config file and mounts the config directory at `/config`.
    pub fn with_file(mut self, name: impl Into<String>, contents: Template) -> Self {
        if self.files.is_empty() {
            self.mounts.push(MountSpec {
                source: MountSource::Config,
                target: "/config".to_string(),
                read_only: true,
            });
        }
        self.files.push(ConfigFile { name: name.into(), contents });
        self
    }

    /// Adds dependencies.
    pub fn depends_on<'a>(mut self, deps: impl IntoIterator<Item = &'a str>) -> Self {
        self.depends_on.extend(deps.into_iter().map(str::to_string));
        self
    }

    /// Sets the health check.
    pub fn with_health(mut self, health: HealthCheck) -> Self {
        self.health = health;
        self
    }

    /// Sets the container user.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Shares the PID namespace of another component.
    pub fn with_shared_pid(mut self, component: impl Into<String>) -> Self {
        self.share_pid_with = Some(component.into());
        self
    }

    /// Waits for the genesis timestamp before starting.
    pub const fn awaiting_genesis(mut self) -> Self {
        self.await_genesis = true;
        self
    }

    /// Every component name this spec refers to: dependencies, template peers and PID sharing.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.depends_on
            .iter()
            .map(String::as_str)
            .chain(self.command.iter().flat_map(Template::peers))
            .chain(self.env.values().flat_map(Template::peers))
            .chain(self.files.iter().flat_map(|f| f.contents.peers()))
            .chain(self.share_pid_with.as_deref())
    }
}
