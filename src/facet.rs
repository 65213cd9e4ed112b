//! Facets: named capabilities attached to a subsystem, built from `Hook`
//! values in topological dependency order (spec.md §4.3).

use std::any::Any;
use std::collections::{BinaryHeap, HashMap};
use std::cmp::Reverse;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain_types::SubsystemName;
use crate::error::FacetError;

/// The closed set of facet kinds this runtime recognises, with an
/// open-ended escape hatch for user-defined capabilities (SPEC_FULL.md
/// §9, translating the source's duck-typed `find(kind)`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FacetKind {
    /// Persistence/caching capability backed by a [`crate::storage::StorageBackend`].
    Storage,
    /// Outbound/inbound networking or transport capability.
    Network,
    /// Structured logging/metrics capability.
    Observability,
    /// Authentication/authorization helper capability local to a subsystem.
    Security,
    /// Any capability not covered by the kinds above.
    Other(String),
}

/// Name of a method a facet claims to provide, used only for the
/// contract-validation check (SPEC_FULL.md §3.1).
pub type MethodName = String;

/// Name of a registered contract, matched against a facet's declared
/// `methods`.
pub type ContractName = String;

/// `HashMap<ContractName, Vec<MethodName>>`: describes, for each named
/// contract, the method names a facet claiming that contract must expose
/// (SPEC_FULL.md §3.1).
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: HashMap<ContractName, Vec<MethodName>>,
}

impl ContractRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the method list required by `contract`.
    pub fn register(&mut self, contract: impl Into<String>, methods: Vec<MethodName>) {
        self.contracts.insert(contract.into(), methods);
    }

    /// Looks up the required methods for a contract name, if registered.
    #[must_use]
    pub fn required_methods(&self, contract: &str) -> Option<&[MethodName]> {
        self.contracts.get(contract).map(Vec::as_slice)
    }
}

/// The `ctx` argument passed to every hook builder: `{ms, config, debug}`
/// (spec.md §4.3 step 3).
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Milliseconds elapsed since the owning subsystem was built.
    pub ms: u64,
    /// This hook's slice of `RuntimeConfig`'s per-facet config map.
    pub config: Value,
    /// Whether the runtime is in debug mode.
    pub debug: bool,
}

/// The `api` argument passed to every hook builder: the subsystem's name
/// and a read-only view of facets already built earlier in the
/// topological order (spec.md §4.3 step 3).
pub struct HookApi<'a> {
    /// The owning subsystem's name.
    pub name: SubsystemName,
    facets: &'a HashMap<FacetKind, Facet>,
}

impl<'a> HookApi<'a> {
    /// Looks up an already-built facet by kind.
    #[must_use]
    pub fn find(&self, kind: &FacetKind) -> Option<&Facet> {
        self.facets.get(kind)
    }
}

/// A lifecycle callback invoked on a facet's own value after construction
/// (`init`) or during teardown (`dispose`).
pub type FacetLifecycleFn = Arc<dyn Fn(&Facet) -> Result<(), FacetError> + Send + Sync>;

/// A capability attached to a subsystem: the tuple named in spec.md §3
/// (kind, attached?, dependencies, init/dispose callbacks, method table,
/// source origin, optional contract).
pub struct Facet {
    kind: FacetKind,
    attached: bool,
    dependencies: Vec<FacetKind>,
    methods: Vec<MethodName>,
    source: String,
    contract: Option<ContractName>,
    value: Arc<dyn Any + Send + Sync>,
    init: Option<FacetLifecycleFn>,
    dispose: Option<FacetLifecycleFn>,
    initialized: bool,
}

impl Facet {
    /// Builds a facet. Called from within a hook's builder function.
    #[must_use]
    pub fn new(
        kind: FacetKind,
        attached: bool,
        dependencies: Vec<FacetKind>,
        methods: Vec<MethodName>,
        source: impl Into<String>,
        contract: Option<ContractName>,
        value: Arc<dyn Any + Send + Sync>,
        init: Option<FacetLifecycleFn>,
        dispose: Option<FacetLifecycleFn>,
    ) -> Self {
        Self {
            kind,
            attached,
            dependencies,
            methods,
            source: source.into(),
            contract,
            value,
            init,
            dispose,
            initialized: false,
        }
    }

    /// This facet's kind.
    #[must_use]
    pub fn kind(&self) -> &FacetKind {
        &self.kind
    }

    /// Whether this facet should be exposed as direct named access on the
    /// subsystem surface, in addition to `subsystem.find(kind)`.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// The method names this facet declares, for contract validation.
    #[must_use]
    pub fn methods(&self) -> &[MethodName] {
        &self.methods
    }

    /// Where this facet's hook was defined (for error reporting on cycles
    /// and missing dependencies).
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether `init` has run successfully.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Downcasts this facet's attached capability value to a concrete type.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

/// A factory that builds a [`Facet`], declaring its dependencies and
/// origin (spec.md §4.3).
pub struct Hook {
    kind: FacetKind,
    required: Vec<FacetKind>,
    attach: bool,
    overwrite: bool,
    contract: Option<ContractName>,
    origin: String,
    builder: Arc<dyn Fn(&HookContext, &HookApi) -> Result<Facet, FacetError> + Send + Sync>,
}

impl Hook {
    /// Declares a new hook.
    #[must_use]
    pub fn new(
        kind: FacetKind,
        required: Vec<FacetKind>,
        attach: bool,
        overwrite: bool,
        contract: Option<ContractName>,
        origin: impl Into<String>,
        builder: impl Fn(&HookContext, &HookApi) -> Result<Facet, FacetError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            required,
            attach,
            overwrite,
            contract,
            origin: origin.into(),
            builder: Arc::new(builder),
        }
    }

    /// The facet kind this hook produces.
    #[must_use]
    pub fn kind(&self) -> &FacetKind {
        &self.kind
    }
}

/// The per-subsystem store of built facets, keyed by kind (spec.md §4.3,
/// component L3).
pub struct FacetManager {
    facets: HashMap<FacetKind, Facet>,
    build_order: Vec<FacetKind>,
}

impl FacetManager {
    /// Runs the four-step build algorithm from spec.md §4.3: topological
    /// sort by `required`, then invoke each hook's builder in that order,
    /// validating contracts and rejecting duplicate kinds.
    ///
    /// `hooks` must already include both explicitly installed hooks and
    /// any coordinator-defined defaults (step 1 is the caller's
    /// responsibility).
    ///
    /// # Errors
    ///
    /// Returns [`FacetError::DependencyCycle`] if `required` edges form a
    /// cycle, [`FacetError::MissingDependency`] if a hook's dependency
    /// isn't present among `hooks`, [`FacetError::DuplicateKind`] if two
    /// hooks produce the same kind without `overwrite`, or
    /// [`FacetError::ContractViolation`] if a built facet's declared
    /// contract requires a method it doesn't list, or whatever
    /// [`FacetError::InitFailed`]-shaped error a builder itself returns.
    pub fn build(
        hooks: Vec<Hook>,
        ctx: &HookContext,
        subsystem_name: &SubsystemName,
        contracts: &ContractRegistry,
    ) -> Result<Self, FacetError> {
        let order = topological_order(&hooks)?;

        let mut facets: HashMap<FacetKind, Facet> = HashMap::new();
        let mut build_order = Vec::with_capacity(order.len());

        for idx in order {
            let hook = &hooks[idx];

            if facets.contains_key(&hook.kind) && !hook.overwrite {
                return Err(FacetError::DuplicateKind {
                    kind: format!("{:?}", hook.kind),
                });
            }

            let api = HookApi {
                name: subsystem_name.clone(),
                facets: &facets,
            };
            let facet = (hook.builder)(ctx, &api)?;

            if let Some(contract_name) = &hook.contract {
                if let Some(required) = contracts.required_methods(contract_name) {
                    let missing: Vec<String> = required
                        .iter()
                        .filter(|method| !facet.methods.contains(method))
                        .cloned()
                        .collect();
                    if !missing.is_empty() {
                        return Err(FacetError::ContractViolation {
                            kind: format!("{:?}", hook.kind),
                            contract: contract_name.clone(),
                            missing,
                        });
                    }
                }
            }

            facets.insert(hook.kind.clone(), facet);
            build_order.push(hook.kind.clone());
        }

        Ok(Self { facets, build_order })
    }

    /// Invokes every facet's init callback in build order. On any failure,
    /// disposes already-initialised facets in reverse and propagates the
    /// error (spec.md §4.3 step 4).
    ///
    /// # Errors
    ///
    /// Propagates whatever error the first failing `init` callback
    /// returns.
    pub fn init_all(&mut self) -> Result<(), FacetError> {
        let mut initialized_order: Vec<FacetKind> = Vec::new();

        for kind in self.build_order.clone() {
            let outcome = {
                let facet = self
                    .facets
                    .get(&kind)
                    .expect("facet present for every kind in build_order");
                facet.init.clone().map(|init| init(facet))
            };

            match outcome {
                None | Some(Ok(())) => {
                    if let Some(facet) = self.facets.get_mut(&kind) {
                        facet.initialized = true;
                    }
                    initialized_order.push(kind);
                }
                Some(Err(err)) => {
                    for already in initialized_order.iter().rev() {
                        if let Some(facet) = self.facets.get(already) {
                            if let Some(dispose) = &facet.dispose {
                                let _ = dispose(facet);
                            }
                        }
                    }
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Disposes every initialised facet in reverse build order.
    pub fn dispose_all(&mut self) {
        for kind in self.build_order.clone().into_iter().rev() {
            if let Some(facet) = self.facets.get(&kind) {
                if facet.initialized {
                    if let Some(dispose) = &facet.dispose {
                        let _ = dispose(facet);
                    }
                }
            }
        }
    }

    /// Looks up a facet by kind (`subsystem.find(kind)` in spec.md §4.3
    /// step 5).
    #[must_use]
    pub fn find(&self, kind: &FacetKind) -> Option<&Facet> {
        self.facets.get(kind)
    }

    /// The kinds of every attached (directly-accessible) facet.
    #[must_use]
    pub fn attached_kinds(&self) -> Vec<&FacetKind> {
        self.facets
            .values()
            .filter(|f| f.attached)
            .map(Facet::kind)
            .collect()
    }

    /// The order facets were built in; deterministic given the same input
    /// hook order (I3).
    #[must_use]
    pub fn build_order(&self) -> &[FacetKind] {
        &self.build_order
    }
}

/// Kahn's algorithm with a min-heap frontier, so ties between
/// simultaneously-ready hooks always resolve in original input order —
/// the stability I3 requires.
fn topological_order(hooks: &[Hook]) -> Result<Vec<usize>, FacetError> {
    let n = hooks.len();
    let index_of: HashMap<&FacetKind, usize> =
        hooks.iter().enumerate().map(|(i, h)| (&h.kind, i)).collect();

    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, hook) in hooks.iter().enumerate() {
        for dep in &hook.required {
            match index_of.get(dep) {
                Some(&dep_idx) => {
                    dependents[dep_idx].push(i);
                    in_degree[i] += 1;
                }
                None => {
                    return Err(FacetError::MissingDependency {
                        kind: format!("{:?}", hook.kind),
                        dependency: format!("{dep:?}"),
                    });
                }
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() != n {
        let stuck: Vec<String> = (0..n)
            .filter(|i| !order.contains(i))
            .map(|i| format!("{:?}", hooks[i].kind))
            .collect();
        return Err(FacetError::DependencyCycle { kinds: stuck });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::SubsystemName;

    fn ctx() -> HookContext {
        HookContext {
            ms: 0,
            config: Value::Null,
            debug: false,
        }
    }

    fn name() -> SubsystemName {
        SubsystemName::try_new("test").unwrap()
    }

    fn leaf_hook(kind: FacetKind, required: Vec<FacetKind>) -> Hook {
        Hook::new(kind.clone(), required, false, false, None, "test", move |_ctx, _api| {
            Ok(Facet::new(
                kind.clone(),
                false,
                vec![],
                vec![],
                "test",
                None,
                Arc::new(()),
                None,
                None,
            ))
        })
    }

    #[test]
    fn builds_in_dependency_order() {
        let hooks = vec![
            leaf_hook(FacetKind::Security, vec![FacetKind::Storage]),
            leaf_hook(FacetKind::Storage, vec![]),
        ];
        let manager = FacetManager::build(hooks, &ctx(), &name(), &ContractRegistry::new()).unwrap();
        assert_eq!(
            manager.build_order(),
            &[FacetKind::Storage, FacetKind::Security]
        );
    }

    #[test]
    fn ties_resolve_in_input_order() {
        let hooks = vec![
            leaf_hook(FacetKind::Other("b".into()), vec![]),
            leaf_hook(FacetKind::Other("a".into()), vec![]),
        ];
        let manager = FacetManager::build(hooks, &ctx(), &name(), &ContractRegistry::new()).unwrap();
        assert_eq!(
            manager.build_order(),
            &[FacetKind::Other("b".into()), FacetKind::Other("a".into())]
        );
    }

    #[test]
    fn detects_dependency_cycle() {
        let hooks = vec![
            leaf_hook(FacetKind::Storage, vec![FacetKind::Network]),
            leaf_hook(FacetKind::Network, vec![FacetKind::Storage]),
        ];
        let err = FacetManager::build(hooks, &ctx(), &name(), &ContractRegistry::new()).unwrap_err();
        assert!(matches!(err, FacetError::DependencyCycle { .. }));
    }

    #[test]
    fn rejects_unsatisfiable_dependency() {
        let hooks = vec![leaf_hook(FacetKind::Security, vec![FacetKind::Storage])];
        let err = FacetManager::build(hooks, &ctx(), &name(), &ContractRegistry::new()).unwrap_err();
        match err {
            FacetError::MissingDependency { kind, dependency } => {
                assert_eq!(kind, format!("{:?}", FacetKind::Security));
                assert_eq!(dependency, format!("{:?}", FacetKind::Storage));
            }
            other => panic!("expected MissingDependency, got {other:?}"),
        }
    }

    #[test]
    fn rejects_duplicate_kind_without_overwrite() {
        let hooks = vec![
            leaf_hook(FacetKind::Storage, vec![]),
            leaf_hook(FacetKind::Storage, vec![]),
        ];
        let err = FacetManager::build(hooks, &ctx(), &name(), &ContractRegistry::new()).unwrap_err();
        assert!(matches!(err, FacetError::DuplicateKind { .. }));
    }

    #[test]
    fn contract_violation_is_fatal() {
        let mut contracts = ContractRegistry::new();
        contracts.register("storable", vec!["get".to_string(), "put".to_string()]);

        let hook = Hook::new(
            FacetKind::Storage,
            vec![],
            false,
            false,
            Some("storable".to_string()),
            "test",
            |_ctx, _api| {
                Ok(Facet::new(
                    FacetKind::Storage,
                    false,
                    vec![],
                    vec!["get".to_string()],
                    "test",
                    Some("storable".to_string()),
                    Arc::new(()),
                    None,
                    None,
                ))
            },
        );

        let err = FacetManager::build(vec![hook], &ctx(), &name(), &contracts).unwrap_err();
        assert!(matches!(err, FacetError::ContractViolation { .. }));
    }

    #[test]
    fn init_failure_disposes_already_initialized_facets_in_reverse() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let disposed = Arc::new(AtomicUsize::new(0));
        let disposed_clone = disposed.clone();

        let first = Hook::new(
            FacetKind::Storage,
            vec![],
            false,
            false,
            None,
            "test",
            move |_ctx, _api| {
                let disposed = disposed_clone.clone();
                Ok(Facet::new(
                    FacetKind::Storage,
                    false,
                    vec![],
                    vec![],
                    "test",
                    None,
                    Arc::new(()),
                    Some(Arc::new(|_: &Facet| Ok(()))),
                    Some(Arc::new(move |_: &Facet| {
                        disposed.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })),
                ))
            },
        );

        let second = Hook::new(
            FacetKind::Network,
            vec![FacetKind::Storage],
            false,
            false,
            None,
            "test",
            |_ctx, _api| {
                Ok(Facet::new(
                    FacetKind::Network,
                    false,
                    vec![],
                    vec![],
                    "test",
                    None,
                    Arc::new(()),
                    Some(Arc::new(|_: &Facet| {
                        Err(FacetError::InitFailed {
                            kind: "network".to_string(),
                            source: Box::new(std::io::Error::other("boom")),
                        })
                    })),
                    None,
                ))
            },
        );

        let mut manager =
            FacetManager::build(vec![first, second], &ctx(), &name(), &ContractRegistry::new()).unwrap();
        let err = manager.init_all().unwrap_err();
        assert!(matches!(err, FacetError::InitFailed { .. }));
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }
}
