//! Genesis generator inputs: `values.env` and preloaded contracts.

use alloy_primitives::{Address, U256, address};
use serde_json::json;

use crate::config::{ChainConfig, ForkName};

/// Genesis fork version.
pub const GENESIS_FORK_VERSION: &str = "0x10000038";
/// Altair fork version.
pub const ALTAIR_FORK_VERSION: &str = "0x20000038";
/// Bellatrix fork version.
pub const BELLATRIX_FORK_VERSION: &str = "0x30000038";
/// Capella fork version.
pub const CAPELLA_FORK_VERSION: &str = "0x40000038";
/// Deneb fork version.
pub const DENEB_FORK_VERSION: &str = "0x50000038";
/// Electra fork version.
pub const ELECTRA_FORK_VERSION: &str = "0x60000038";
/// Fulu fork version.
pub const FULU_FORK_VERSION: &str = "0x70000038";
/// Epoch used for forks that never activate.
pub const FAR_FUTURE_EPOCH: u64 = u64::MAX;

/// Deposit contract address.
pub const DEPOSIT_CONTRACT_ADDRESS: Address = address!("0x4242424242424242424242424242424242424242");
/// Withdrawal address for genesis validators.
pub const WITHDRAWAL_ADDRESS: Address = address!("0x8943545177806ED17B9F23F0a21ee5948eCaa776");
/// Address of the preloaded Disperse contract.
pub const DISPERSE_CONTRACT_ADDRESS: Address =
    address!("0xD152f549545093347A162Dce210e7293f1452150");
const DISPERSE_CONTRACT_CODE: &str = "0x608060405260043610610057576000357c0100000000000000000000000000000000000000000000000000000000900463ffffffff16806351ba162c1461005c578063c73a2d60146100cf578063e63d38ed14610142575b600080fd5b34801561006857600080fd5b506100cd600480360381019080803573ffffffffffffffffffffffffffffffffffffffff169060200190929190803590602001908201803590602001919091929391929390803590602001908201803590602001919091929391929390505050610188565b005b3480156100db57600080fd5b50610140600480360381019080803573ffffffffffffffffffffffffffffffffffffffff169060200190929190803590602001908201803590602001919091929391929390803590602001908201803590602001919091929391929390505050610309565b005b6101866004803603810190808035906020019082018035906020019190919293919293908035906020019082018035906020019190919293919293905050506105b0565b005b60008090505b84849050811015610301578573ffffffffffffffffffffffffffffffffffffffff166323b872dd3387878581811015156101c457fe5b9050602002013573ffffffffffffffffffffffffffffffffffffffff1686868681811015156101ef57fe5b905060200201356040518463ffffffff167c0100000000000000000000000000000000000000000000000000000000028152600401808473ffffffffffffffffffffffffffffffffffffffff1673ffffffffffffffffffffffffffffffffffffffff1681526020018373ffffffffffffffffffffffffffffffffffffffff1673ffffffffffffffffffffffffffffffffffffffff1681526020018281526020019350505050602060405180830381600087803b1580156102ae57600080fd5b505af11580156102c2573d6000803e3d6000fd5b505050506040513d60208110156102d857600080fd5b810190808051906020019092919050505015156102f457600080fd5b808060010191505061018e565b505050505050565b60008060009150600090505b8585905081101561034657838382818110151561032e57fe5b90506020020135820191508080600101915050610315565b8673ffffffffffffffffffffffffffffffffffffffff166323b872dd3330856040518463ffffffff167c0100000000000000000000000000000000000000000000000000000000028152600401808473ffffffffffffffffffffffffffffffffffffffff1673ffffffffffffffffffffffffffffffffffffffff1681526020018373ffffffffffffffffffffffffffffffffffffffff1673ffffffffffffffffffffffffffffffffffffffff1681526020018281526020019350505050602060405180830381600087803b15801561041d57600080fd5b505af1158015610431573d6000803e3d6000fd5b505050506040513d602081101561044757600080fd5b8101908080519060200190929190505050151561046357600080fd5b600090505b858590508110156105a7578673ffffffffffffffffffffffffffffffffffffffff1663a9059cbb878784818110151561049d57fe5b9050602002013573ffffffffffffffffffffffffffffffffffffffff1686868581811015156104c857fe5b905060200201356040518363ffffffff167c0100000000000000000000000000000000000000000000000000000000028152600401808373ffffffffffffffffffffffffffffffffffffffff1673ffffffffffffffffffffffffffffffffffffffff16815260200182815260200192505050602060405180830381600087803b15801561055457600080fd5b505af1158015610568573d6000803e3d6000fd5b505050506040513d602081101561057e57600080fd5b8101908080519060200190929190505050151561059a57600080fd5b8080600101915050610468565b50505050505050565b600080600091505b858590508210156106555785858381811015156105d157fe5b9050602002013573ffffffffffffffffffffffffffffffffffffffff1673ffffffffffffffffffffffffffffffffffffffff166108fc858585818110151561061557fe5b905060200201359081150290604051600060405180830381858888f19350505050158015610647573d6000803e3d6000fd5b5081806001019250506105b8565b3073ffffffffffffffffffffffffffffffffffffffff1631905060008111156106c0573373ffffffffffffffffffffffffffffffffffffffff166108fc829081150290604051600060405180830381858888f193505050501580156106be573d6000803e3d6000fd5b505b5050505050505600a165627a7a72305820104eaf57909eb0d29f37ba9e3196e8e88438f83546136cf61270ca5d3b491e160029";

/// Well-known development accounts funded at genesis.
pub const PREFUNDED_ACCOUNTS: [Address; 10] = [
    address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
    address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8"),
    address!("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC"),
    address!("0x90F79bf6EB2c4f870365E785982E1f101E93b906"),
    address!("0x15d34AAf54267DB7D7c367839AAf71A00a2C6A65"),
    address!("0x9965507D1a55bcC2695C58ba16FB37d819B0A4dc"),
    address!("0x976EA74026E726554dB657fA54763abd0C3a0aa9"),
    address!("0x14dC79964da2C08b23698B3D3cc7Ca32193d9955"),
    address!("0x23618e81E3f5cdF7f54C3d65f7FBc0aBf5B21E8f"),
    address!("0xa0Ee7A142d267C1f36714E4a8F75612F20a79720"),
];

const PREFUND_ETH: u64 = 10_000;
const VALIDATOR_BALANCE_GWEI: u64 = 32_000_000_000;
const GAS_LIMIT: u64 = 30_000_000;

/// Activation epoch of `fork` when `active` is the latest fork live at genesis.
pub fn fork_epoch(active: ForkName, fork: ForkName) -> u64 {
    if fork <= active { 0 } else { FAR_FUTURE_EPOCH }
}

fn prefund_balance() -> U256 {
    U256::from(PREFUND_ETH) * U256::from(10u64).pow(U256::from(18u64))
}

/// JSON map of prefunded accounts as expected by `EL_PREMINE_ADDRS`.
pub fn premine_json() -> String {
    let balance = format!("0x{:x}", prefund_balance());
    let accounts: serde_json::Map<String, serde_json::Value> = PREFUNDED_ACCOUNTS
        .iter()
        .map(|account| (account.to_checksum(None), json!({ "balance": balance })))
        .collect();
    serde_json::Value::Object(accounts).to_string()
}

/// Contents of `additional-contracts.json`.
pub fn additional_contracts_json() -> String {
    let mut contracts = serde_json::Map::new();
    contracts.insert(
        DISPERSE_CONTRACT_ADDRESS.to_checksum(None),
        json!({
            "balance": "0x0",
            "code": DISPERSE_CONTRACT_CODE,
            "storage": {},
            "nonce": "0x1",
        }),
    );
    serde_json::Value::Object(contracts).to_string()
}

/// Renders `values.env` for a genesis at `timestamp`.
pub fn render_values_env(chain: &ChainConfig, timestamp: u64) -> String {
    let active = chain.fork;
    let far = FAR_FUTURE_EPOCH;
    let mut lines = vec![
        r#"export PRESET_BASE="mainnet""#.to_string(),
        format!(r#"export CHAIN_ID="{}""#, chain.chain_id),
        format!(r#"export DEPOSIT_CONTRACT_ADDRESS="{DEPOSIT_CONTRACT_ADDRESS}""#),
        format!(r#"export EL_AND_CL_MNEMONIC="{}""#, chain.mnemonic),
        r#"export CL_EXEC_BLOCK="0""#.to_string(),
        format!("export SLOT_DURATION_IN_SECONDS={}", chain.seconds_per_slot),
        format!("export SLOT_DURATION_MS={}", chain.seconds_per_slot * 1000),
        r#"export DEPOSIT_CONTRACT_BLOCK="0x0000000000000000000000000000000000000000000000000000000000000000""#
            .to_string(),
        format!("export NUMBER_OF_VALIDATORS={}", chain.validator_count),
        format!(r#"export GENESIS_FORK_VERSION="{GENESIS_FORK_VERSION}""#),
    ];
    let forks = [
        ("ALTAIR", ALTAIR_FORK_VERSION, 0),
        ("BELLATRIX", BELLATRIX_FORK_VERSION, 0),
        ("CAPELLA", CAPELLA_FORK_VERSION, 0),
        ("DENEB", DENEB_FORK_VERSION, fork_epoch(active, ForkName::Deneb)),
        ("ELECTRA", ELECTRA_FORK_VERSION, fork_epoch(active, ForkName::Electra)),
        ("FULU", FULU_FORK_VERSION, fork_epoch(active, ForkName::Fulu)),
        ("GLOAS", "0x80000038", far),
        ("EIP7805", "0x90000038", far),
        ("EIP7441", "0xa0000038", far),
    ];
    for (name, version, epoch) in forks {
        lines.push(format!(r#"export {name}_FORK_VERSION="{version}""#));
        lines.push(format!(r#"export {name}_FORK_EPOCH="{epoch}""#));
    }
    lines.extend([
        r#"export WITHDRAWAL_TYPE="0x01""#.to_string(),
        format!(r#"export WITHDRAWAL_ADDRESS="{WITHDRAWAL_ADDRESS}""#),
        format!(r#"export VALIDATOR_BALANCE="{VALIDATOR_BALANCE_GWEI}""#),
        format!("export GENESIS_TIMESTAMP={timestamp}"),
        // The delay is already folded into the timestamp.
        "export GENESIS_DELAY=0".to_string(),
        format!("export GENESIS_GASLIMIT={GAS_LIMIT}"),
        "export MAX_PER_EPOCH_ACTIVATION_CHURN_LIMIT=8".to_string(),
        "export CHURN_LIMIT_QUOTIENT=65536".to_string(),
        "export EJECTION_BALANCE=16000000000".to_string(),
        "export ETH1_FOLLOW_DISTANCE=2048".to_string(),
        r#"export SHADOW_FORK_FILE="""#.to_string(),
        "export MIN_VALIDATOR_WITHDRAWABILITY_DELAY=256".to_string(),
        "export SHARD_COMMITTEE_PERIOD=256".to_string(),
        "export DATA_COLUMN_SIDECAR_SUBNET_COUNT=128".to_string(),
        "export SAMPLES_PER_SLOT=8".to_string(),
        "export CUSTODY_REQUIREMENT=4".to_string(),
        "export MAX_BLOBS_PER_BLOCK_ELECTRA=9".to_string(),
        "export TARGET_BLOBS_PER_BLOCK_ELECTRA=6".to_string(),
        "export MAX_REQUEST_BLOCKS_DENEB=128".to_string(),
        "export MAX_REQUEST_BLOB_SIDECARS_ELECTRA=1152".to_string(),
        "export BASEFEE_UPDATE_FRACTION_ELECTRA=5007716".to_string(),
        "export ADDITIONAL_PRELOADED_CONTRACTS=/config/additional-contracts.json".to_string(),
        format!("export EL_PREMINE_ADDRS='{}'", premine_json()),
        "export MAX_PAYLOAD_SIZE=10485760".to_string(),
    ]);
    for bpo in 1..=5 {
        lines.push(format!(r#"export BPO_{bpo}_EPOCH="{far}""#));
        lines.push(format!("export BPO_{bpo}_MAX_BLOBS=0"));
        lines.push(format!("export BPO_{bpo}_TARGET_BLOBS=0"));
        lines.push(format!("export BPO_{bpo}_BASE_FEE_UPDATE_FRACTION=0"));
    }
    lines.extend(
        [
            "export MIN_EPOCHS_FOR_DATA_COLUMN_SIDECARS_REQUESTS=4096",
            "export MIN_EPOCHS_FOR_BLOCK_REQUESTS=33024",
            "export ATTESTATION_DUE_BPS_GLOAS=4000",
            "export AGGREGATE_DUE_BPS_GLOAS=8000",
            "export SYNC_MESSAGE_DUE_BPS_GLOAS=4000",
            "export CONTRIBUTION_DUE_BPS_GLOAS=8000",
            "export PAYLOAD_ATTESTATION_DUE_BPS=5000",
            "export VIEW_FREEZE_CUTOFF_BPS=6000",
            "export INCLUSION_LIST_SUBMISSION_DUE_BPS=5000",
            "export PROPOSER_INCLUSION_LIST_CUTOFF_BPS=6000",
        ]
        .map(str::to_string),
    );
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Reads `GENESIS_TIMESTAMP` back out of a rendered `values.env`.
pub fn values_env_timestamp(values_env: &str) -> Option<u64> {
    values_env
        .lines()
        .find_map(|line| line.strip_prefix("export GENESIS_TIMESTAMP="))
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ForkName::Electra, ForkName::Deneb, 0)]
    #[case(ForkName::Electra, ForkName::Electra, 0)]
    #[case(ForkName::Electra, ForkName::Fulu, FAR_FUTURE_EPOCH)]
    #[case(ForkName::Deneb, ForkName::Electra, FAR_FUTURE_EPOCH)]
    #[case(ForkName::Fulu, ForkName::Fulu, 0)]
    fn test_fork_epoch(#[case] active: ForkName, #[case] fork: ForkName, #[case] expected: u64) {
        assert_eq!(fork_epoch(active, fork), expected);
    }

    #[test]
    fn test_values_env_contents() {
        let chain = ChainConfig::default();
        let env = render_values_env(&chain, 1_700_000_000);
        assert!(env.contains(r#"export CHAIN_ID="3151908""#));
        assert!(env.contains("export NUMBER_OF_VALIDATORS=100"));
        assert!(env.contains("export SLOT_DURATION_MS=12000"));
        assert!(env.contains(r#"export ELECTRA_FORK_EPOCH="0""#));
        assert!(env.contains(r#"export FULU_FORK_EPOCH="18446744073709551615""#));
        assert!(env.contains(r#"export DEPOSIT_CONTRACT_ADDRESS="0x4242424242424242424242424242424242424242""#));
        assert!(env.ends_with('\n'));
        assert_eq!(values_env_timestamp(&env), Some(1_700_000_000));
    }

    #[test]
    fn test_premine_balances() {
        let premine: serde_json::Value = serde_json::from_str(&premine_json()).unwrap();
        let accounts = premine.as_object().unwrap();
        assert_eq!(accounts.len(), 10);
        assert_eq!(
            accounts["0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"]["balance"],
            "0x21e19e0c9bab2400000"
        );
    }

    #[test]
    fn test_additional_contracts_include_disperse() {
        let contracts: serde_json::Value =
            serde_json::from_str(&additional_contracts_json()).unwrap();
        let disperse = &contracts["0xD152f549545093347A162Dce210e7293f1452150"];
        assert_eq!(disperse["nonce"], "0x1");
        assert!(disperse["code"].as_str().unwrap().starts_with("0x6080"));
    }
}
