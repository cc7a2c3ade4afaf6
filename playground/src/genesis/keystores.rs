//! Rearranges generated validator keys into the layout the validator client loads.
//!
//! The keystore tool writes `keys/0x<pubkey>/voting-keystore.json` and
//! `secrets/0x<pubkey>`. The validator client reads
//! `keystores/validator_N/voting-keystore.json`, `secrets/validator_N` and a
//! `validator_definitions.yml` listing both paths as seen inside its container.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::GenesisError;

/// Password protecting every generated keystore.
pub const KEYSTORE_PASSWORD: &str = "secret";

/// Where the validators directory is mounted in the validator client.
const VALIDATORS_MOUNT: &str = "/data/validators";

/// One entry of `validator_definitions.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorDefinition {
    /// Whether the validator signs.
    pub enabled: bool,
    /// BLS public key, 0x-prefixed.
    pub voting_public_key: String,
    /// Signer kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// In-container keystore path.
    pub voting_keystore_path: String,
    /// In-container password file path.
    pub voting_keystore_password_path: String,
}

fn io_err(context: &str) -> impl FnOnce(std::io::Error) -> GenesisError + '_ {
    move |e| GenesisError::Io(format!("{context}: {e}"))
}

/// Copies keys from the tool's `output` into `dest` and writes the definitions file.
///
/// Keys are numbered in public-key order. Returns the definitions written.
pub fn arrange_keystores(
    output: &Path,
    dest: &Path,
    expected: u32,
) -> Result<Vec<ValidatorDefinition>, GenesisError> {
    let keys_dir = output.join("keys");
    let secrets_dir = output.join("secrets");
    let mut pubkeys = std::fs::read_dir(&keys_dir)
        .map_err(|e| GenesisError::MissingOutput {
            tool: "keystores",
            path: format!("{}: {e}", keys_dir.display()),
        })?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    pubkeys.sort();

    if pubkeys.len() != expected as usize {
        return Err(GenesisError::ToolFailed {
            tool: "keystores",
            diagnostic: format!("expected {expected} keystores, found {}", pubkeys.len()),
        });
    }

    let keystores_dest = dest.join("keystores");
    let secrets_dest = dest.join("secrets");
    std::fs::create_dir_all(&keystores_dest).map_err(io_err("create keystores dir"))?;
    std::fs::create_dir_all(&secrets_dest).map_err(io_err("create secrets dir"))?;

    let mut definitions = Vec::with_capacity(pubkeys.len());
    for (index, pubkey) in pubkeys.iter().enumerate() {
        let slot = format!("validator_{index}");
        let keystore_dir = keystores_dest.join(&slot);
        std::fs::create_dir_all(&keystore_dir).map_err(io_err("create keystore dir"))?;
        std::fs::copy(
            keys_dir.join(pubkey).join("voting-keystore.json"),
            keystore_dir.join("voting-keystore.json"),
        )
        .map_err(io_err("copy keystore"))?;

        let secret = secrets_dir.join(pubkey);
        if secret.is_file() {
            std::fs::copy(&secret, secrets_dest.join(&slot)).map_err(io_err("copy secret"))?;
        } else {
            std::fs::write(secrets_dest.join(&slot), KEYSTORE_PASSWORD)
                .map_err(io_err("write secret"))?;
        }

        definitions.push(ValidatorDefinition {
            enabled: true,
            voting_public_key: pubkey.clone(),
            kind: "local_keystore".to_string(),
            voting_keystore_path: format!("{VALIDATORS_MOUNT}/keystores/{slot}/voting-keystore.json"),
            voting_keystore_password_path: format!("{VALIDATORS_MOUNT}/secrets/{slot}"),
        });
    }

    let yaml = serde_yaml::to_string(&definitions)
        .map_err(|e| GenesisError::Io(format!("serialize validator definitions: {e}")))?;
    std::fs::write(dest.join("validator_definitions.yml"), yaml)
        .map_err(io_err("write validator definitions"))?;
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_tool_output(dir: &Path, pubkeys: &[&str], with_secret: bool) {
        for pubkey in pubkeys {
            let key_dir = dir.join("keys").join(pubkey);
            std::fs::create_dir_all(&key_dir).unwrap();
            std::fs::write(key_dir.join("voting-keystore.json"), format!("{{\"pubkey\":\"{pubkey}\"}}"))
                .unwrap();
            if with_secret {
                std::fs::create_dir_all(dir.join("secrets")).unwrap();
                std::fs::write(dir.join("secrets").join(pubkey), "from-tool").unwrap();
            }
        }
    }

    #[test]
    fn test_layout_and_definitions() {
        let tool = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fake_tool_output(tool.path(), &["0xbb", "0xaa"], true);

        let definitions = arrange_keystores(tool.path(), dest.path(), 2).unwrap();
        assert_eq!(definitions[0].voting_public_key, "0xaa");
        assert_eq!(
            definitions[1].voting_keystore_path,
            "/data/validators/keystores/validator_1/voting-keystore.json"
        );
        let keystore = std::fs::read_to_string(
            dest.path().join("keystores/validator_1/voting-keystore.json"),
        )
        .unwrap();
        assert!(keystore.contains("0xbb"));
        assert_eq!(std::fs::read_to_string(dest.path().join("secrets/validator_0")).unwrap(), "from-tool");

        let yaml = std::fs::read_to_string(dest.path().join("validator_definitions.yml")).unwrap();
        let parsed: Vec<ValidatorDefinition> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, definitions);
        assert!(yaml.contains("type: local_keystore"));
    }

    #[test]
    fn test_missing_secret_falls_back_to_password() {
        let tool = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fake_tool_output(tool.path(), &["0xaa"], false);
        arrange_keystores(tool.path(), dest.path(), 1).unwrap();
        assert_eq!(
            std::fs::read_to_string(dest.path().join("secrets/validator_0")).unwrap(),
            KEYSTORE_PASSWORD
        );
    }

    #[test]
    fn test_count_mismatch() {
        let tool = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fake_tool_output(tool.path(), &["0xaa"], true);
        let err = arrange_keystores(tool.path(), dest.path(), 3).unwrap_err();
        assert!(matches!(err, GenesisError::ToolFailed { tool: "keystores", .. }));
    }

    #[test]
    fn test_missing_keys_dir() {
        let tool = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let err = arrange_keystores(tool.path(), dest.path(), 1).unwrap_err();
        assert!(matches!(err, GenesisError::MissingOutput { .. }));
    }
}
