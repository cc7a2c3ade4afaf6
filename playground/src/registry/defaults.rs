//! The stock component table.

use std::time::Duration;

use super::{
    Artifact, ComponentSpec, MountSource, Registry, RegistryError, Template,
    template::ARTIFACTS_MOUNT,
};
use crate::{
    config::{BuilderVariant, ForkName, PlaygroundConfig},
    containers::*,
    genesis::{
        BELLATRIX_FORK_VERSION, CAPELLA_FORK_VERSION, DENEB_FORK_VERSION, ELECTRA_FORK_VERSION,
        FULU_FORK_VERSION, GENESIS_FORK_VERSION, fork_epoch,
    },
    network::AddressClass,
    runtime::{HealthCheck, Probe},
};

/// BLS public key the relay signs with.
pub const RELAY_PUBKEY: &str = "0xa55c1285d84ba83a5ad26420cd5ad3091e49c55a813eee651cd467db38a8c8e63192f47955e9376f6b42f6d190571cb5";
/// BLS secret key matching [`RELAY_PUBKEY`].
pub const RELAY_SECRET_KEY: &str =
    "0x607a11b45a7219cc61a3d9c5fd08c7eebd602a6a19a977f8d3771d5711a550f2";
/// Key the builder pays block rewards from.
const BUILDER_COINBASE_KEY: &str =
    "0x0101010101010101010101010101010101010101010101010101010101010101";
/// Fee recipient used by the consensus clients.
const FEE_RECIPIENT: &str = "0x0000000000000000000000000000000000000000";
/// Token for the relay's private and admin routes.
const RELAY_DEV_TOKEN: &str = "localdevtoken";

const fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn artifacts() -> MountSource {
    MountSource::Artifacts(None)
}

fn postgres_url(db: &str) -> Template {
    Template::lit("postgres://postgres:postgres@")
        .then_addr(db)
        .then_lit(format!(":{POSTGRES_PORT}/postgres?sslmode=disable"))
}

fn execution_client(config: &PlaygroundConfig) -> ComponentSpec {
    let ports = &config.ports;
    ComponentSpec::new(EXECUTION_CLIENT, &config.images.execution, AddressClass::Chain, 1)
        .with_command(["node", "--chain"])
        .with_command([Template::artifact(Artifact::ElGenesis)])
        .with_command([
            "--datadir".to_string(),
            "/data".to_string(),
            "--http".to_string(),
            "--http.addr".to_string(),
            "0.0.0.0".to_string(),
            "--http.port".to_string(),
            EL_HTTP_PORT.to_string(),
            "--http.api".to_string(),
            "eth,net,web3,debug,trace,txpool,admin".to_string(),
            "--http.corsdomain".to_string(),
            "*".to_string(),
            "--ws".to_string(),
            "--ws.addr".to_string(),
            "0.0.0.0".to_string(),
            "--ws.port".to_string(),
            EL_WS_PORT.to_string(),
            "--ws.api".to_string(),
            "eth,net,web3,debug,trace,txpool".to_string(),
            "--authrpc.addr".to_string(),
            "0.0.0.0".to_string(),
            "--authrpc.port".to_string(),
            EL_AUTH_PORT.to_string(),
            "--authrpc.jwtsecret".to_string(),
        ])
        .with_command([Template::artifact(Artifact::JwtSecret)])
        .with_command([
            "--metrics".to_string(),
            format!("0.0.0.0:{EL_METRICS_PORT}"),
            "--log.stdout.format".to_string(),
            "terminal".to_string(),
            "--full".to_string(),
            // The builder reads state over IPC from the shared data dir.
            "--ipcpath".to_string(),
            "/data/reth.ipc".to_string(),
            "--engine.persistence-threshold".to_string(),
            "0".to_string(),
            "--engine.memory-block-buffer-target".to_string(),
            "0".to_string(),
        ])
        .with_port_mapping(EL_HTTP_PORT, ports.el_http)
        .with_port_mapping(EL_WS_PORT, ports.el_ws)
        .with_port_mapping(EL_AUTH_PORT, ports.el_auth)
        .with_mount(MountSource::Data("reth".into()), "/data", false)
        .with_mount(artifacts(), ARTIFACTS_MOUNT, true)
        .with_health(HealthCheck::new(Probe::Tcp(EL_HTTP_PORT), secs(60)).with_start_period(secs(10)))
}

fn consensus_beacon(config: &PlaygroundConfig) -> ComponentSpec {
    ComponentSpec::new(CONSENSUS_BEACON, &config.images.consensus, AddressClass::Chain, 2)
        .with_command(["lighthouse", "beacon_node", "--datadir", "/data", "--testnet-dir"])
        .with_command([Template::artifact(Artifact::TestnetDir)])
        .with_command(["--execution-endpoint"])
        .with_command([Template::url("http", EXECUTION_CLIENT, EL_AUTH_PORT)])
        .with_command(["--execution-jwt"])
        .with_command([Template::artifact(Artifact::JwtSecret)])
        .with_command([
            "--http".to_string(),
            "--http-address".to_string(),
            "0.0.0.0".to_string(),
            "--http-port".to_string(),
            CL_HTTP_PORT.to_string(),
            "--http-allow-origin".to_string(),
            "*".to_string(),
            "--metrics".to_string(),
            "--metrics-address".to_string(),
            "0.0.0.0".to_string(),
            "--metrics-port".to_string(),
            CL_METRICS_PORT.to_string(),
            "--staking".to_string(),
            "--disable-peer-scoring".to_string(),
            "--disable-packet-filter".to_string(),
            "--enable-private-discovery".to_string(),
            "--target-peers".to_string(),
            "0".to_string(),
            "--disable-upnp".to_string(),
            "--disable-enr-auto-update".to_string(),
            "--enr-address".to_string(),
        ])
        .with_command([Template::addr(CONSENSUS_BEACON)])
        .with_command([
            "--enr-udp-port".to_string(),
            CL_P2P_PORT.to_string(),
            "--enr-tcp-port".to_string(),
            CL_P2P_PORT.to_string(),
            "--port".to_string(),
            CL_P2P_PORT.to_string(),
            "--always-prepare-payload".to_string(),
            "--prepare-payload-lookahead".to_string(),
            "8000".to_string(),
            "--suggested-fee-recipient".to_string(),
            FEE_RECIPIENT.to_string(),
            "--builder".to_string(),
        ])
        .with_command([Template::url("http", BOOST_SIDECAR, BOOST_PORT)])
        .with_command([
            "--builder-fallback-epochs-since-finalization",
            "0",
            "--builder-fallback-disable-checks",
            "--builder-header-timeout",
            "3000",
        ])
        .with_port_mapping(CL_HTTP_PORT, config.ports.cl_http)
        .with_mount(MountSource::Data("lighthouse/beacon".into()), "/data", false)
        .with_mount(artifacts(), ARTIFACTS_MOUNT, true)
        .depends_on([EXECUTION_CLIENT])
        .with_health(HealthCheck::new(Probe::Tcp(CL_HTTP_PORT), secs(120)).with_start_period(secs(30)))
}

fn consensus_validator(config: &PlaygroundConfig) -> ComponentSpec {
    ComponentSpec::new(CONSENSUS_VALIDATOR, &config.images.consensus, AddressClass::Chain, 3)
        .with_command(["lighthouse", "validator_client", "--datadir", "/data", "--testnet-dir"])
        .with_command([Template::artifact(Artifact::TestnetDir)])
        .with_command(["--beacon-nodes"])
        .with_command([Template::url("http", CONSENSUS_BEACON, CL_HTTP_PORT)])
        .with_command([
            "--init-slashing-protection".to_string(),
            "--http".to_string(),
            "--http-address".to_string(),
            "0.0.0.0".to_string(),
            "--http-port".to_string(),
            VC_HTTP_PORT.to_string(),
            "--http-allow-origin".to_string(),
            "*".to_string(),
            "--unencrypted-http-transport".to_string(),
            "--graffiti".to_string(),
            "mev-playground".to_string(),
            "--suggested-fee-recipient".to_string(),
            FEE_RECIPIENT.to_string(),
            "--builder-proposals".to_string(),
            "--prefer-builder-proposals".to_string(),
        ])
        .with_mount(MountSource::Data("lighthouse/validator".into()), "/data", false)
        .with_mount(artifacts(), ARTIFACTS_MOUNT, true)
        // Lighthouse expects keys under $DATADIR/validators.
        .with_mount(MountSource::Artifacts(Some("validators".into())), "/data/validators", false)
        .depends_on([CONSENSUS_BEACON])
        .with_health(HealthCheck::new(Probe::Tcp(VC_HTTP_PORT), secs(60)).with_start_period(secs(10)))
}

fn relay_redis(config: &PlaygroundConfig) -> ComponentSpec {
    ComponentSpec::new(RELAY_REDIS, &config.images.redis, AddressClass::Relay, 2)
        .with_command(["redis-server", "--appendonly", "no", "--save", ""])
        .with_health(
            HealthCheck::new(Probe::Command(vec!["redis-cli".into(), "ping".into()]), secs(30))
                .with_start_period(secs(3)),
        )
}

fn relay_postgres(config: &PlaygroundConfig, name: &str, slot: u8) -> ComponentSpec {
    let volume = name.trim_start_matches("relay-");
    ComponentSpec::new(name, &config.images.postgres, AddressClass::Relay, slot)
        .with_env("POSTGRES_USER", "postgres")
        .with_env("POSTGRES_PASSWORD", "postgres")
        .with_env("POSTGRES_DB", "postgres")
        .with_mount(
            MountSource::Data(format!("postgres/{volume}").into()),
            "/var/lib/postgresql/data",
            false,
        )
        // The entrypoint drops privileges itself.
        .with_user("root")
        .with_health(
            HealthCheck::new(
                Probe::Command(vec!["pg_isready".into(), "-U".into(), "postgres".into()]),
                secs(45),
            )
            .with_start_period(secs(5)),
        )
}

fn relay(config: &PlaygroundConfig) -> ComponentSpec {
    let fork = config.chain.fork;
    let epoch = |at: ForkName| fork_epoch(fork, at).to_string();
    let redis = Template::addr(RELAY_REDIS).then_lit(format!(":{REDIS_PORT}"));
    let literal_env = [
        ("RELAY_SECRET_KEY", RELAY_SECRET_KEY.to_string()),
        ("PRIVATE_ROUTE_AUTH_TOKEN", RELAY_DEV_TOKEN.to_string()),
        ("ADMIN_TOKEN", RELAY_DEV_TOKEN.to_string()),
        ("GEO", "rbx".to_string()),
        ("BIND_IP_ADDR", "0.0.0.0".to_string()),
        ("API_TIMEOUT", "10000".to_string()),
        ("TOKIO_WORKER_THREADS", "4".to_string()),
        ("LOG_JSON", "false".to_string()),
        ("RUST_LOG", "info".to_string()),
        // No flashbots validation on the local execution client, so simulation is off.
        ("TOP_BID_DEBOUNCE_MS_LOCAL", "2".to_string()),
        ("SKIP_SIM_PROBABILITY", "1.0".to_string()),
        ("FORCED_TIMEOUT_MAX_BID_VALUE", "0".to_string()),
        ("X_TIMEOUT_HEADER_CORRECTION", "1500".to_string()),
        ("ADJUSTMENT_LOOKBACK_MS", "50".to_string()),
        ("ADJUSTMENT_MIN_DELTA", "0".to_string()),
        ("SKIP_SIMULATION", "true".to_string()),
        ("DISABLE_BLOCK_SIMULATION", "true".to_string()),
        ("FORCE_FAST_START", "true".to_string()),
        ("FF_ENABLE_TOP_BID_GOSSIP", "false".to_string()),
        ("FF_LOWBALL_AMOUNT", "1".to_string()),
        ("FF_ENABLE_V3_SUBMISSIONS", "false".to_string()),
        ("FF_ENABLE_DEHYDRATED_SUBMISSIONS", "false".to_string()),
        ("FF_PRIMEV_ENABLED", "false".to_string()),
        ("FF_PRIMEV_ENFORCE", "false".to_string()),
        ("NETWORK", "custom".to_string()),
        ("GENESIS_FORK_VERSION", GENESIS_FORK_VERSION.to_string()),
        ("BELLATRIX_FORK_VERSION", BELLATRIX_FORK_VERSION.to_string()),
        ("BELLATRIX_FORK_EPOCH", "0".to_string()),
        ("CAPELLA_FORK_VERSION", CAPELLA_FORK_VERSION.to_string()),
        ("CAPELLA_FORK_EPOCH", "0".to_string()),
        ("DENEB_FORK_VERSION", DENEB_FORK_VERSION.to_string()),
        ("DENEB_FORK_EPOCH", epoch(ForkName::Deneb)),
        ("ELECTRA_FORK_VERSION", ELECTRA_FORK_VERSION.to_string()),
        ("ELECTRA_FORK_EPOCH", epoch(ForkName::Electra)),
        ("FULU_FORK_VERSION", FULU_FORK_VERSION.to_string()),
        ("FULU_FORK_EPOCH", epoch(ForkName::Fulu)),
        ("TELEGRAM_API_KEY", String::new()),
        ("TELEGRAM_CHANNEL_ID", String::new()),
    ];

    literal_env
        .into_iter()
        .fold(
            ComponentSpec::new(RELAY, &config.images.relay, AddressClass::Relay, 1),
            |spec, (key, value)| spec.with_env(key, value),
        )
        .with_env("MEV_DATABASE_URL", postgres_url(RELAY_MEVDB))
        .with_env("LOCAL_DATABASE_URL", postgres_url(RELAY_LOCALDB))
        .with_env("GLOBAL_DATABASE_URL", postgres_url(RELAY_GLOBALDB))
        .with_env("REDIS_URI", redis.clone())
        .with_env("REDIS_READ_URI", redis)
        .with_env("CONSENSUS_NODES", Template::url("http", CONSENSUS_BEACON, CL_HTTP_PORT))
        .with_env("EXECUTION_CLIENT_URLS", Template::url("http", EXECUTION_CLIENT, EL_HTTP_PORT))
        .with_env("BLOCKSIM_URI", Template::url("http", EXECUTION_CLIENT, EL_HTTP_PORT))
        .with_env("GENESIS_TIMESTAMP", Template::genesis_time())
        .with_env("GENESIS_VALIDATORS_ROOT", Template::validators_root())
        .with_port_mapping(RELAY_HTTP_PORT, config.ports.relay_http)
        .depends_on([
            RELAY_REDIS,
            RELAY_MEVDB,
            RELAY_LOCALDB,
            RELAY_GLOBALDB,
            CONSENSUS_BEACON,
            EXECUTION_CLIENT,
        ])
        // supervisord inside the image needs root to drop privileges.
        .with_user("root")
        .awaiting_genesis()
        .with_health(
            HealthCheck::new(Probe::Tcp(RELAY_HTTP_PORT), secs(300))
                .with_interval(secs(5))
                .with_start_period(secs(10)),
        )
}

fn builder_config() -> Template {
    let coinbase = BUILDER_COINBASE_KEY.trim_start_matches("0x");
    let relay_key = RELAY_SECRET_KEY.trim_start_matches("0x");
    // `[[relays]]` must follow every scalar key.
    Template::lit(format!(
        "chain = \"{genesis}\"\n\
         reth_datadir = \"/reth_data\"\n\
         el_node_ipc_path = \"/reth_data/reth.ipc\"\n\
         cl_node_url = [\"",
        genesis = Artifact::ElGenesis.container_path(),
    ))
    .then_url("http", CONSENSUS_BEACON, CL_HTTP_PORT)
    .then_lit(format!(
        "\"]\n\
         enabled_relays = [\"playground-relay\"]\n\
         coinbase_secret_key = \"{coinbase}\"\n\
         relay_secret_key = \"{relay_key}\"\n\
         live_builders = [\"fast-ordering\"]\n\
         jsonrpc_server_port = {BUILDER_RPC_PORT}\n\
         jsonrpc_server_ip = \"0.0.0.0\"\n\
         log_level = \"info,rbuilder=debug\"\n\
         log_json = false\n\
         full_telemetry_server_port = {BUILDER_TELEMETRY_PORT}\n\
         full_telemetry_server_ip = \"0.0.0.0\"\n\
         root_hash_use_sparse_trie = true\n\
         root_hash_compare_sparse_trie = false\n\
         slot_delta_to_start_bidding_ms = -12000\n\
         \n\
         [[builders]]\n\
         name = \"fast-ordering\"\n\
         algo = \"ordering-builder\"\n\
         discard_txs = true\n\
         sorting = \"mev-gas-price\"\n\
         failed_order_retries = 1\n\
         drop_failed_orders = true\n\
         build_duration_deadline_ms = 3000\n\
         \n\
         [[relays]]\n\
         name = \"playground-relay\"\n\
         url = \""
    ))
    .then_url("http", RELAY, RELAY_HTTP_PORT)
    .then_lit(
        "\"\n\
         use_ssz_for_submit = false\n\
         use_gzip_for_submit = false\n\
         priority = 0\n",
    )
}

fn builder(config: &PlaygroundConfig, image: &str) -> ComponentSpec {
    ComponentSpec::new(BUILDER, image, AddressClass::Builder, 1)
        .with_command(["run", "/config/rbuilder.toml"])
        .with_file("rbuilder.toml", builder_config())
        .with_env("COINBASE_SECRET_KEY", BUILDER_COINBASE_KEY)
        .with_env("RELAY_SECRET_KEY", RELAY_SECRET_KEY)
        .with_port_mapping(BUILDER_RPC_PORT, config.ports.builder_rpc)
        .with_ports([BUILDER_TELEMETRY_PORT])
        .with_mount(MountSource::Data("reth".into()), "/reth_data", false)
        .with_mount(artifacts(), ARTIFACTS_MOUNT, true)
        .with_shared_pid(EXECUTION_CLIENT)
        .depends_on([EXECUTION_CLIENT, CONSENSUS_BEACON, RELAY])
        .with_health(HealthCheck::running(secs(60)))
}

fn boost_sidecar(config: &PlaygroundConfig) -> ComponentSpec {
    let relay_url = Template::lit(format!("http://{RELAY_PUBKEY}@"))
        .then_addr(RELAY)
        .then_lit(format!(":{RELAY_HTTP_PORT}"));
    ComponentSpec::new(BOOST_SIDECAR, &config.images.sidecar, AddressClass::Chain, 4)
        .with_command(["-addr".to_string(), format!("0.0.0.0:{BOOST_PORT}"), "-relay".to_string()])
        .with_command([relay_url])
        .with_command(["-relay-check", "-genesis-fork-version", GENESIS_FORK_VERSION, "-genesis-timestamp"])
        .with_command([Template::genesis_time()])
        .with_command([
            "-request-timeout-getheader",
            "2900",
            "-request-timeout-getpayload",
            "4000",
            "-request-timeout-regval",
            "6000",
            "-loglevel",
            "debug",
        ])
        .with_port_mapping(BOOST_PORT, config.ports.boost)
        .depends_on([RELAY, BUILDER])
        .with_health(
            HealthCheck::new(
                Probe::Http { port: BOOST_PORT, path: "/eth/v1/builder/status".to_string() },
                secs(60),
            )
            .with_interval(secs(5)),
        )
}

fn explorer_config() -> Template {
    Template::lit(format!(
        "logging:\n  outputLevel: \"info\"\n\n\
         chain:\n  displayName: \"MEV Playground Devnet\"\n\n\
         server:\n  host: \"0.0.0.0\"\n  port: \"{EXPLORER_HTTP_PORT}\"\n\n\
         frontend:\n  enabled: true\n  siteName: \"MEV Playground Explorer\"\n  siteSubtitle: \"Local Devnet\"\n  ethExplorerLink: \"\"\n\n\
         beaconapi:\n  endpoints:\n    - name: \"lighthouse\"\n      url: \""
    ))
    .then_url("http", CONSENSUS_BEACON, CL_HTTP_PORT)
    .then_lit("\"\n  localCacheSize: 100\n\nexecutionapi:\n  endpoints:\n    - name: \"reth\"\n      url: \"")
    .then_url("http", EXECUTION_CLIENT, EL_HTTP_PORT)
    .then_lit(
        "\"\n  depositDeployBlock: 0\n\n\
         indexer:\n  inMemoryEpochs: 3\n  activityHistoryLength: 6\n  disableSynchronizer: false\n  syncEpochCooldown: 1\n  maxParallelValidatorSetRequests: 1\n\n\
         database:\n  engine: \"sqlite\"\n  sqlite:\n    file: \"/data/dora.sqlite\"\n",
    )
}

fn explorer(config: &PlaygroundConfig) -> ComponentSpec {
    ComponentSpec::new(EXPLORER, &config.images.explorer, AddressClass::Tools, 1)
        .with_command(["-config", "/config/config.yaml"])
        .with_file("config.yaml", explorer_config())
        .with_port_mapping(EXPLORER_HTTP_PORT, config.ports.explorer)
        .with_mount(MountSource::Data("dora".into()), "/data", false)
        .depends_on([CONSENSUS_BEACON, EXECUTION_CLIENT])
        .with_health(HealthCheck::new(Probe::Tcp(EXPLORER_HTTP_PORT), secs(60)))
}

fn load_generator(config: &PlaygroundConfig) -> ComponentSpec {
    let load = &config.load_generator;
    ComponentSpec::new(LOAD_GENERATOR, &config.images.load_generator, AddressClass::Tools, 2)
        .with_command(["spam", "--rpc-url"])
        .with_command([Template::url("http", EXECUTION_CLIENT, EL_HTTP_PORT)])
        .with_command([
            "--min-balance".to_string(),
            "10 ether".to_string(),
            "--tps".to_string(),
            load.tps.to_string(),
            "--forever".to_string(),
        ])
        .with_command(load.extra_args.iter().cloned())
        .with_command(["transfers"])
        .depends_on([EXECUTION_CLIENT, CONSENSUS_VALIDATOR])
        .with_health(HealthCheck::running(secs(30)))
}

/// Builds the stock registry for `config`, resolved for its builder variant.
///
/// The load generator is included only when enabled. Per-component `extra_env`
/// entries override the defaults.
pub fn default_registry(config: &PlaygroundConfig) -> Result<Registry, RegistryError> {
    let builder_image = config.builder_image();
    let mut components = vec![
        execution_client(config),
        consensus_beacon(config),
        consensus_validator(config),
        relay_redis(config),
        relay_postgres(config, RELAY_MEVDB, 3),
        relay_postgres(config, RELAY_LOCALDB, 4),
        relay_postgres(config, RELAY_GLOBALDB, 5),
        relay(config),
        builder(config, builder_image.as_deref().unwrap_or_default()),
        boost_sidecar(config),
        explorer(config),
    ];
    if config.load_generator.enabled {
        components.push(load_generator(config));
    }
    for component in &mut components {
        if let Some(extra) = config.extra_env.get(&component.name) {
            for (key, value) in extra {
                component.env.insert(key.clone(), Template::lit(value.clone()));
            }
        }
        if let Some(secs) = config.health_timeouts.get(&component.name) {
            component.health.timeout = Duration::from_secs(*secs);
        }
    }
    if config.builder == BuilderVariant::None {
        // Dropped before validation so its host ports cannot conflict.
        components.retain(|c| c.name != BUILDER);
        for component in &mut components {
            component.depends_on.retain(|d| d != BUILDER);
        }
    }
    Registry::new(components)?.resolve(config.builder, builder_image.as_deref())
}
