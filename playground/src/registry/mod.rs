//! Component registry: declarations, dependency ordering and variant resolution.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;

mod component;
pub use component::{ComponentSpec, ConfigFile, MountSource, MountSpec};

mod defaults;
pub use defaults::{RELAY_PUBKEY, RELAY_SECRET_KEY, default_registry};

mod template;
pub use template::{
    ARTIFACTS_MOUNT, Artifact, RenderContext, RenderError, Segment, Template, render_all,
};

use crate::{config::BuilderVariant, containers::BUILDER};

/// Errors found while validating a set of components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Two components share a name.
    #[error("duplicate component `{0}`")]
    DuplicateComponent(String),
    /// A dependency names no declared component.
    #[error("component `{component}` depends on unknown component `{dependency}`")]
    UnknownDependency {
        /// Declaring component.
        component: String,
        /// Missing dependency.
        dependency: String,
    },
    /// A template or PID share names no declared component.
    #[error("component `{component}` references unknown component `{reference}`")]
    UnknownReference {
        /// Declaring component.
        component: String,
        /// Missing reference.
        reference: String,
    },
    /// The dependency graph has a cycle through these components.
    #[error("dependency cycle among: {}", .0.join(", "))]
    Cycle(Vec<String>),
    /// Two components claim the same static address.
    #[error("components `{first}` and `{second}` share address {class}.{slot}")]
    DuplicateAddress {
        /// First claimant.
        first: String,
        /// Second claimant.
        second: String,
        /// Address class.
        class: crate::network::AddressClass,
        /// Slot.
        slot: u8,
    },
    /// Two components publish the same host port.
    #[error("host port {port} is published by both `{first}` and `{second}`")]
    PortConflict {
        /// Host port.
        port: u16,
        /// First publisher.
        first: String,
        /// Second publisher.
        second: String,
    },
}

/// A validated, acyclic set of components in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    components: Vec<ComponentSpec>,
}

impl Registry {
    /// Validates the components and builds a registry.
    ///
    /// Rejects duplicate names, unknown dependencies or references, shared
    /// addresses, shared host ports and dependency cycles.
    pub fn new(components: Vec<ComponentSpec>) -> Result<Self, RegistryError> {
        let mut names = BTreeSet::new();
        for component in &components {
            if !names.insert(component.name.as_str()) {
                return Err(RegistryError::DuplicateComponent(component.name.clone()));
            }
        }

        let mut addresses = HashMap::new();
        let mut ports: HashMap<u16, &str> = HashMap::new();
        for component in &components {
            for dep in &component.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(RegistryError::UnknownDependency {
                        component: component.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            if let Some(reference) = component.references().find(|r| !names.contains(r)) {
                return Err(RegistryError::UnknownReference {
                    component: component.name.clone(),
                    reference: reference.to_string(),
                });
            }
            if let Some(first) = addresses.insert((component.class, component.slot), &component.name) {
                return Err(RegistryError::DuplicateAddress {
                    first: first.clone(),
                    second: component.name.clone(),
                    class: component.class,
                    slot: component.slot,
                });
            }
            for port in &component.ports {
                if let Some(first) = ports.insert(port.host, &component.name) {
                    return Err(RegistryError::PortConflict {
                        port: port.host,
                        first: first.to_string(),
                        second: component.name.clone(),
                    });
                }
            }
        }

        let registry = Self { components };
        registry.order_indices()?;
        Ok(registry)
    }

    /// Kahn's algorithm; among ready components the earliest declared goes first.
    fn order_indices(&self) -> Result<Vec<usize>, RegistryError> {
        let index: HashMap<&str, usize> =
            self.components.iter().enumerate().map(|(i, c)| (c.name.as_str(), i)).collect();
        let mut pending: Vec<usize> = self.components.iter().map(|c| c.depends_on.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.components.len()];
        for (i, component) in self.components.iter().enumerate() {
            for dep in &component.depends_on {
                dependents[index[dep.as_str()]].push(i);
            }
        }

        let mut ready: BTreeSet<usize> =
            pending.iter().enumerate().filter(|(_, n)| **n == 0).map(|(i, _)| i).collect();
        let mut order = Vec::with_capacity(self.components.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &dependents[next] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.components.len() {
            let stuck = pending
                .iter()
                .enumerate()
                .filter(|(_, n)| **n > 0)
                .map(|(i, _)| self.components[i].name.clone())
                .collect();
            return Err(RegistryError::Cycle(stuck));
        }
        Ok(order)
    }

    /// Components in a deterministic order where every dependency precedes its dependents.
    pub fn startup_order(&self) -> Vec<&ComponentSpec> {
        // Acyclicity is checked in `new`, so ordering cannot fail here.
        self.order_indices()
            .unwrap_or_default()
            .into_iter()
            .map(|i| &self.components[i])
            .collect()
    }

    /// The reverse of [`Self::startup_order`].
    pub fn shutdown_order(&self) -> Vec<&ComponentSpec> {
        let mut order = self.startup_order();
        order.reverse();
        order
    }

    /// Looks up a component by name.
    pub fn get(&self, name: &str) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Whether a component is part of this registry.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Components in declaration order.
    pub fn components(&self) -> &[ComponentSpec] {
        &self.components
    }

    /// Component names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.name.as_str())
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Host ports published by each component.
    pub fn host_ports(&self) -> BTreeMap<&str, Vec<u16>> {
        self.components
            .iter()
            .map(|c| (c.name.as_str(), c.ports.iter().map(|p| p.host).collect()))
            .collect()
    }

    /// Returns a registry without `name`, with every dependency edge on it dropped.
    pub fn without(self, name: &str) -> Result<Self, RegistryError> {
        let components = self
            .components
            .into_iter()
            .filter(|c| c.name != name)
            .map(|mut c| {
                c.depends_on.retain(|d| d != name);
                c
            })
            .collect();
        Self::new(components)
    }

    /// Applies a builder variant to the `builder` component.
    ///
    /// [`BuilderVariant::None`] removes it and its edges; the other variants run
    /// `builder_image` in its place.
    pub fn resolve(self, variant: BuilderVariant, builder_image: Option<&str>) -> Result<Self, RegistryError> {
        match (variant, builder_image) {
            (BuilderVariant::None, _) => self.without(BUILDER),
            (_, Some(image)) => {
                let components = self
                    .components
                    .into_iter()
                    .map(|mut c| {
                        if c.name == BUILDER {
                            c.image = image.to_string();
                        }
                        c
                    })
                    .collect();
                Self::new(components)
            }
            (_, None) => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::network::AddressClass;

    fn component(name: &str, slot: u8, deps: &[&str]) -> ComponentSpec {
        ComponentSpec::new(name, "example/image:latest", AddressClass::Tools, slot)
            .depends_on(deps.iter().copied())
    }

    fn names(order: Vec<&ComponentSpec>) -> Vec<&str> {
        order.into_iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let registry = Registry::new(vec![
            component("d", 1, &["b", "c"]),
            component("b", 2, &["a"]),
            component("c", 3, &["a"]),
            component("a", 4, &[]),
        ])
        .unwrap();
        assert_eq!(names(registry.startup_order()), vec!["a", "b", "c", "d"]);
        assert_eq!(names(registry.shutdown_order()), vec!["d", "c", "b", "a"]);
    }

    #[rstest]
    #[case(vec![("x", vec![]), ("y", vec![]), ("z", vec![])], vec!["x", "y", "z"])]
    #[case(vec![("z", vec![]), ("y", vec![]), ("x", vec![])], vec!["z", "y", "x"])]
    #[case(vec![("x", vec!["z"]), ("y", vec![]), ("z", vec![])], vec!["y", "z", "x"])]
    fn test_ties_follow_declaration_order(
        #[case] decl: Vec<(&str, Vec<&str>)>,
        #[case] expected: Vec<&str>,
    ) {
        let components = decl
            .iter()
            .enumerate()
            .map(|(i, (name, deps))| component(name, i as u8 + 1, deps))
            .collect();
        let registry = Registry::new(components).unwrap();
        assert_eq!(names(registry.startup_order()), expected);
    }

    #[test]
    fn test_cycle_rejected() {
        let err = Registry::new(vec![
            component("a", 1, &["c"]),
            component("b", 2, &["a"]),
            component("c", 3, &["b"]),
            component("d", 4, &[]),
        ])
        .unwrap_err();
        assert_eq!(err, RegistryError::Cycle(vec!["a".into(), "b".into(), "c".into()]));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let err = Registry::new(vec![component("a", 1, &["ghost"])]).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownDependency { .. }));
    }

    #[test]
    fn test_unknown_template_reference_rejected() {
        let spec = component("a", 1, &[]).with_env("PEER", Template::addr("ghost"));
        let err = Registry::new(vec![spec]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownReference { component: "a".into(), reference: "ghost".into() }
        );
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = Registry::new(vec![component("a", 1, &[]), component("a", 2, &[])]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateComponent("a".into()));

        let err = Registry::new(vec![component("a", 1, &[]), component("b", 1, &[])]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateAddress { .. }));
    }

    #[test]
    fn test_host_port_conflict_rejected() {
        let err = Registry::new(vec![
            component("a", 1, &[]).with_ports([8080]),
            component("b", 2, &[]).with_port_mapping(9090, 8080),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            RegistryError::PortConflict { port: 8080, first: "a".into(), second: "b".into() }
        );
    }

    #[test]
    fn test_without_drops_edges() {
        let registry = Registry::new(vec![
            component("a", 1, &[]),
            component(BUILDER, 2, &["a"]),
            component("c", 3, &["a", BUILDER]),
        ])
        .unwrap();
        let resolved = registry.resolve(BuilderVariant::None, None).unwrap();
        assert!(!resolved.contains(BUILDER));
        assert_eq!(resolved.get("c").unwrap().depends_on, vec!["a".to_string()]);
    }

    #[test]
    fn test_custom_swaps_builder_image() {
        let registry = Registry::new(vec![component(BUILDER, 1, &[])]).unwrap();
        let resolved = registry.resolve(BuilderVariant::Custom, Some("example/builder:dev")).unwrap();
        assert_eq!(resolved.get(BUILDER).unwrap().image, "example/builder:dev");
    }
}
