//! The shared bridge network and the static address plan.

use std::{fmt, net::Ipv4Addr};

use ipnet::Ipv4Net;
use tracing::{debug, info};

use crate::{error::PlaygroundError, runtime::ContainerRuntime};

/// Name of the playground network.
pub const NETWORK_NAME: &str = "mev-playground";
/// Subnet of the playground network.
pub const NETWORK_SUBNET: &str = "172.28.0.0/16";

/// Address class, encoded as the third octet of a component's address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressClass {
    /// Execution, consensus and the boost sidecar.
    Chain = 1,
    /// Relay and its data stores.
    Relay = 2,
    /// Block builders.
    Builder = 3,
    /// Explorer and load generation.
    Tools = 4,
}

impl AddressClass {
    /// Third octet for this class.
    pub const fn octet(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for AddressClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chain => "chain",
            Self::Relay => "relay",
            Self::Builder => "builder",
            Self::Tools => "tools",
        };
        f.write_str(name)
    }
}

/// Desired network identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    /// Network name.
    pub name: String,
    /// Subnet; must be at least a /16 so every class fits.
    pub subnet: Ipv4Net,
}

impl NetworkSpec {
    /// Creates a network spec, rejecting subnets narrower than /16.
    pub fn new(name: impl Into<String>, subnet: Ipv4Net) -> Result<Self, PlaygroundError> {
        if subnet.prefix_len() > 16 {
            return Err(PlaygroundError::InvalidConfig(format!(
                "subnet {subnet} is narrower than /16"
            )));
        }
        Ok(Self { name: name.into(), subnet: subnet.trunc() })
    }

    /// The `mev-playground` network on `172.28.0.0/16`.
    pub fn playground() -> Self {
        Self {
            name: NETWORK_NAME.to_string(),
            subnet: Ipv4Net::new_assert(Ipv4Addr::new(172, 28, 0, 0), 16),
        }
    }

    /// Static address for `slot` within `class`.
    ///
    /// Slot 0 would be the network address of the class block, so slots start at 1.
    pub fn address(&self, class: AddressClass, slot: u8) -> Result<Ipv4Addr, PlaygroundError> {
        if slot == 0 {
            return Err(PlaygroundError::InvalidConfig(format!(
                "address slot 0 is reserved in class {class}"
            )));
        }
        let [a, b, _, _] = self.subnet.network().octets();
        Ok(Ipv4Addr::new(a, b, class.octet(), slot))
    }
}

/// A network that exists and matches its [`NetworkSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    /// Engine id.
    pub id: String,
    /// Network name.
    pub name: String,
    /// Subnet.
    pub subnet: Ipv4Net,
}

/// Ensures the network exists with the expected subnet.
///
/// Reuses a matching network and creates a missing one. An existing network with
/// a different subnet is a [`PlaygroundError::NetworkConflict`] and is left untouched.
/// Runtime failures are reported as [`PlaygroundError::Network`].
pub async fn ensure_network<R>(runtime: &R, spec: &NetworkSpec) -> Result<NetworkHandle, PlaygroundError>
where
    R: ContainerRuntime + ?Sized,
{
    if let Some(existing) = runtime.inspect_network(&spec.name).await.map_err(PlaygroundError::Network)? {
        let matches = existing
            .subnets
            .iter()
            .filter_map(|s| s.parse::<Ipv4Net>().ok())
            .any(|s| s.trunc() == spec.subnet);
        if !matches {
            return Err(PlaygroundError::NetworkConflict {
                name: spec.name.clone(),
                existing: existing.subnets.join(", "),
                expected: spec.subnet.to_string(),
            });
        }
        debug!(network = %spec.name, id = %existing.id, "reusing network");
        return Ok(NetworkHandle { id: existing.id, name: existing.name, subnet: spec.subnet });
    }

    let id = runtime
        .create_network(&spec.name, &spec.subnet.to_string())
        .await
        .map_err(PlaygroundError::Network)?;
    info!(network = %spec.name, subnet = %spec.subnet, "network ready");
    Ok(NetworkHandle { id, name: spec.name.clone(), subnet: spec.subnet })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(AddressClass::Chain, 1, "172.28.1.1")]
    #[case(AddressClass::Chain, 4, "172.28.1.4")]
    #[case(AddressClass::Relay, 5, "172.28.2.5")]
    #[case(AddressClass::Builder, 1, "172.28.3.1")]
    #[case(AddressClass::Tools, 2, "172.28.4.2")]
    fn test_address_plan(#[case] class: AddressClass, #[case] slot: u8, #[case] expected: &str) {
        let spec = NetworkSpec::playground();
        assert_eq!(spec.address(class, slot).unwrap().to_string(), expected);
    }

    #[test]
    fn test_slot_zero_rejected() {
        assert!(NetworkSpec::playground().address(AddressClass::Chain, 0).is_err());
    }

    #[test]
    fn test_narrow_subnet_rejected() {
        let subnet: Ipv4Net = "10.0.0.0/24".parse().unwrap();
        assert!(NetworkSpec::new("x", subnet).is_err());
        let subnet: Ipv4Net = "10.9.0.0/16".parse().unwrap();
        let spec = NetworkSpec::new("x", subnet).unwrap();
        assert_eq!(spec.address(AddressClass::Relay, 1).unwrap(), Ipv4Addr::new(10, 9, 2, 1));
    }

    #[test]
    fn test_playground_subnet_constant() {
        assert_eq!(NetworkSpec::playground().subnet.to_string(), NETWORK_SUBNET);
    }
}
