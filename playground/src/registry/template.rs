//! Templated command and environment values.
//!
//! A [`Template`] is a sequence of literal and placeholder segments. Placeholders
//! name peers (by component name) or per-run genesis values and are substituted at
//! start time from a [`RenderContext`].

use std::{collections::BTreeMap, fmt, net::Ipv4Addr};

use thiserror::Error;

/// Mount point of the artifacts directory inside every container that needs it.
pub const ARTIFACTS_MOUNT: &str = "/artifacts";

/// Errors from template rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// A placeholder names a component that is not in the resolved set.
    #[error("template references unknown component `{0}`")]
    UnknownPeer(String),
}

/// A generated artifact, addressed by its in-container path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// Execution-layer genesis JSON.
    ElGenesis,
    /// Engine API JWT secret.
    JwtSecret,
    /// Consensus-layer testnet directory.
    TestnetDir,
}

impl Artifact {
    /// Path of the artifact inside a container.
    pub const fn container_path(self) -> &'static str {
        match self {
            Self::ElGenesis => "/artifacts/genesis.json",
            Self::JwtSecret => "/artifacts/jwt.hex",
            Self::TestnetDir => "/artifacts/beacon",
        }
    }
}

/// One piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal text.
    Lit(String),
    /// Network address of a peer.
    Addr(String),
    /// `scheme://<peer address>:port`.
    Url {
        /// URL scheme.
        scheme: &'static str,
        /// Peer component name.
        peer: String,
        /// Port on the peer.
        port: u16,
    },
    /// Genesis unix timestamp.
    GenesisTime,
    /// Genesis validators root as 0x-prefixed hex.
    ValidatorsRoot,
    /// In-container path of a generated artifact.
    Artifact(Artifact),
}

/// Values substituted into templates for one run.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Address of every component in the resolved set.
    pub addresses: &'a BTreeMap<String, Ipv4Addr>,
    /// Genesis unix timestamp.
    pub genesis_time: u64,
    /// Genesis validators root.
    pub validators_root: &'a str,
}

impl RenderContext<'_> {
    fn address(&self, peer: &str) -> Result<Ipv4Addr, RenderError> {
        self.addresses.get(peer).copied().ok_or_else(|| RenderError::UnknownPeer(peer.to_string()))
    }
}

/// A value assembled from segments at start time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// A template with no segments.
    pub const fn new() -> Self {
        Self { segments: Vec::new() }
    }

    /// A purely literal template.
    pub fn lit(text: impl Into<String>) -> Self {
        Self::new().then_lit(text)
    }

    /// The address of `peer`.
    pub fn addr(peer: &str) -> Self {
        Self::new().then(Segment::Addr(peer.to_string()))
    }

    /// `scheme://peer:port`.
    pub fn url(scheme: &'static str, peer: &str, port: u16) -> Self {
        Self::new().then_url(scheme, peer, port)
    }

    /// The genesis timestamp.
    pub fn genesis_time() -> Self {
        Self::new().then(Segment::GenesisTime)
    }

    /// The genesis validators root.
    pub fn validators_root() -> Self {
        Self::new().then(Segment::ValidatorsRoot)
    }

    /// The in-container path of an artifact.
    pub fn artifact(artifact: Artifact) -> Self {
        Self::new().then(Segment::Artifact(artifact))
    }

    /// Appends a segment.
    pub fn then(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    /// Appends literal text.
    pub fn then_lit(self, text: impl Into<String>) -> Self {
        self.then(Segment::Lit(text.into()))
    }

    /// Appends a peer URL.
    pub fn then_url(self, scheme: &'static str, peer: &str, port: u16) -> Self {
        self.then(Segment::Url { scheme, peer: peer.to_string(), port })
    }

    /// Appends a peer address.
    pub fn then_addr(self, peer: &str) -> Self {
        self.then(Segment::Addr(peer.to_string()))
    }

    /// The segments making up this template.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Component names this template refers to.
    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Addr(peer) | Segment::Url { peer, .. } => Some(peer.as_str()),
            _ => None,
        })
    }

    /// Substitutes every placeholder.
    pub fn render(&self, ctx: &RenderContext<'_>) -> Result<String, RenderError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Lit(text) => out.push_str(text),
                Segment::Addr(peer) => out.push_str(&ctx.address(peer)?.to_string()),
                Segment::Url { scheme, peer, port } => {
                    out.push_str(&format!("{scheme}://{}:{port}", ctx.address(peer)?));
                }
                Segment::GenesisTime => out.push_str(&ctx.genesis_time.to_string()),
                Segment::ValidatorsRoot => out.push_str(ctx.validators_root),
                Segment::Artifact(artifact) => out.push_str(artifact.container_path()),
            }
        }
        Ok(out)
    }
}

impl From<&str> for Template {
    fn from(text: &str) -> Self {
        Self::lit(text)
    }
}

impl From<String> for Template {
    fn from(text: String) -> Self {
        Self::lit(text)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Lit(text) => f.write_str(text)?,
                Segment::Addr(peer) => write!(f, "{{{peer}}}")?,
                Segment::Url { scheme, peer, port } => write!(f, "{scheme}://{{{peer}}}:{port}")?,
                Segment::GenesisTime => f.write_str("{genesis_time}")?,
                Segment::ValidatorsRoot => f.write_str("{validators_root}")?,
                Segment::Artifact(artifact) => f.write_str(artifact.container_path())?,
            }
        }
        Ok(())
    }
}

/// Renders a list of templates.
pub fn render_all(templates: &[Template], ctx: &RenderContext<'_>) -> Result<Vec<String>, RenderError> {
    templates.iter().map(|t| t.render(ctx)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addresses() -> BTreeMap<String, Ipv4Addr> {
        BTreeMap::from([
            ("execution-client".to_string(), Ipv4Addr::new(172, 28, 1, 1)),
            ("relay".to_string(), Ipv4Addr::new(172, 28, 2, 1)),
        ])
    }

    #[test]
    fn test_render_peer_url_and_genesis_values() {
        let addresses = addresses();
        let ctx = RenderContext { addresses: &addresses, genesis_time: 1_700_000_000, validators_root: "0xabc" };
        let template = Template::lit("http://0xpub@")
            .then_addr("relay")
            .then_lit(":80?t=")
            .then(Segment::GenesisTime)
            .then_lit("&root=")
            .then(Segment::ValidatorsRoot);
        assert_eq!(
            template.render(&ctx).unwrap(),
            "http://0xpub@172.28.2.1:80?t=1700000000&root=0xabc"
        );
        assert_eq!(
            Template::url("http", "execution-client", 8551).render(&ctx).unwrap(),
            "http://172.28.1.1:8551"
        );
    }

    #[test]
    fn test_unknown_peer() {
        let addresses = addresses();
        let ctx = RenderContext { addresses: &addresses, genesis_time: 0, validators_root: "" };
        let err = Template::addr("builder").render(&ctx).unwrap_err();
        assert_eq!(err, RenderError::UnknownPeer("builder".into()));
    }

    #[test]
    fn test_peers_and_display() {
        let template = Template::url("ws", "execution-client", 8546).then_lit("/").then_addr("relay");
        assert_eq!(template.peers().collect::<Vec<_>>(), vec!["execution-client", "relay"]);
        assert_eq!(template.to_string(), "ws://{execution-client}:8546/{relay}");
        assert_eq!(Template::artifact(Artifact::JwtSecret).to_string(), "/artifacts/jwt.hex");
    }
}
