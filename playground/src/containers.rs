//! Component names and well-known ports.

/// Name of the execution client (Reth) component.
pub const EXECUTION_CLIENT: &str = "execution-client";
/// Name of the Lighthouse beacon node component.
pub const CONSENSUS_BEACON: &str = "consensus-beacon";
/// Name of the Lighthouse validator client component.
pub const CONSENSUS_VALIDATOR: &str = "consensus-validator";
/// Name of the relay's Redis component.
pub const RELAY_REDIS: &str = "relay-redis";
/// Name of the relay's main Postgres database.
pub const RELAY_MEVDB: &str = "relay-mevdb";
/// Name of the relay's local Postgres database.
pub const RELAY_LOCALDB: &str = "relay-localdb";
/// Name of the relay's global Postgres database.
pub const RELAY_GLOBALDB: &str = "relay-globaldb";
/// Name of the relay component.
pub const RELAY: &str = "relay";
/// Name of the block builder component.
pub const BUILDER: &str = "builder";
/// Name of the mev-boost sidecar component.
pub const BOOST_SIDECAR: &str = "boost-sidecar";
/// Name of the Dora explorer component.
pub const EXPLORER: &str = "explorer";
/// Name of the Contender load generator component.
pub const LOAD_GENERATOR: &str = "load-generator";

/// Execution client HTTP RPC port.
pub const EL_HTTP_PORT: u16 = 8545;
/// Execution client WebSocket port.
pub const EL_WS_PORT: u16 = 8546;
/// Execution client engine API port.
pub const EL_AUTH_PORT: u16 = 8551;
/// Execution client metrics port.
pub const EL_METRICS_PORT: u16 = 9001;
/// Beacon node HTTP API port.
pub const CL_HTTP_PORT: u16 = 3500;
/// Beacon node metrics port.
pub const CL_METRICS_PORT: u16 = 5054;
/// Beacon node P2P port.
pub const CL_P2P_PORT: u16 = 9000;
/// Validator client HTTP API port.
pub const VC_HTTP_PORT: u16 = 5062;
/// mev-boost listen port.
pub const BOOST_PORT: u16 = 18550;
/// Relay HTTP port.
pub const RELAY_HTTP_PORT: u16 = 80;
/// Redis port.
pub const REDIS_PORT: u16 = 6379;
/// Postgres port.
pub const POSTGRES_PORT: u16 = 5432;
/// Builder JSON-RPC port.
pub const BUILDER_RPC_PORT: u16 = 8645;
/// Builder telemetry port.
pub const BUILDER_TELEMETRY_PORT: u16 = 6060;
/// Explorer HTTP port.
pub const EXPLORER_HTTP_PORT: u16 = 8080;

/// Host ports published by default, keyed by component.
///
/// Postgres and Redis stay internal to the network.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PlaygroundPorts {
    /// Execution client HTTP RPC.
    pub el_http: u16,
    /// Execution client WebSocket.
    pub el_ws: u16,
    /// Execution client engine API.
    pub el_auth: u16,
    /// Beacon node HTTP API.
    pub cl_http: u16,
    /// mev-boost.
    pub boost: u16,
    /// Relay HTTP.
    pub relay_http: u16,
    /// Builder RPC.
    pub builder_rpc: u16,
    /// Explorer web UI.
    pub explorer: u16,
}

impl PlaygroundPorts {
    /// Standard playground port assignments.
    pub const fn standard() -> Self {
        Self {
            el_http: EL_HTTP_PORT,
            el_ws: EL_WS_PORT,
            el_auth: EL_AUTH_PORT,
            cl_http: CL_HTTP_PORT,
            boost: BOOST_PORT,
            relay_http: RELAY_HTTP_PORT,
            builder_rpc: BUILDER_RPC_PORT,
            explorer: EXPLORER_HTTP_PORT,
        }
    }
}

impl Default for PlaygroundPorts {
    fn default() -> Self {
        Self::standard()
    }
}
