//! The algebra of mathematical types.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use thiserror::Error;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Name(Arc<str>);

impl Name {
    pub fn new(value: impl AsRef<str>) -> Name {
        Name(Arc::from(value.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name::new(value)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name(Arc::from(value))
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// Identifies the [`TypeGraph`](crate::graph::TypeGraph) a node was built by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(usize);

static GRAPH_COUNTER: AtomicUsize = AtomicUsize::new(0);

impl GraphId {
    pub(crate) fn fresh() -> GraphId {
        GraphId(GRAPH_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("component index {index} out of bounds for arity {arity}")]
pub struct IndexOutOfBounds {
    pub index: usize,
    pub arity: usize,
}

#[derive(Clone)]
pub struct MathType(Arc<TypeNode>);

pub(crate) struct TypeNode {
    graph: GraphId,
    hash: u64,
    kind: TypeKind,
    alpha_cache: Mutex<Vec<Weak<TypeNode>>>,
    subtype_cache: Mutex<Vec<(Weak<TypeNode>, HashMap<Name, MathType>)>>,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Named(Name),
    Generic(Name),
    Proper(Proper),
    Function(Function),
    FunctionApplication(FunctionApplication),
    PowersetApplication(FunctionApplication),
    BigUnion(BigUnion),
    Intersect(Vec<MathType>),
    Union(Vec<MathType>),
    Cartesian(Vec<Factor>),
    SetRestriction(SetRestriction),
}

#[derive(Debug, Clone)]
pub struct Proper {
    pub name: Name,
    pub ty: Option<MathType>,
    pub contains_only_mtypes: bool,
    pub members_contain_only_mtypes: bool,
}

/// How a function type turns an application of itself into a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationBuilder {
    Vanilla,
    Powerset,
    Union,
    Intersect,
    FunctionConstructor,
    CartesianProduct,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub domain: MathType,
    pub range: MathType,
    pub single_parameter: Option<Name>,
    pub restriction: bool,
    pub builder: ApplicationBuilder,
}

#[derive(Debug, Clone)]
pub struct FunctionApplication {
    pub function: MathType,
    pub name: Name,
    pub arguments: Vec<MathType>,
}

#[derive(Debug, Clone)]
pub struct BigUnion {
    variables: OnceLock<BTreeMap<Name, MathType>>,
    anonymous: Option<(usize, MathType)>,
    body: MathType,
}

#[derive(Debug, Clone)]
pub struct Factor {
    pub tag: Option<Name>,
    pub ty: MathType,
}

#[derive(Debug, Clone)]
pub struct SetRestriction {
    pub base: MathType,
    pub variable: Name,
    pub predicate: Arc<str>,
}

impl BigUnion {
    pub(crate) fn named(variables: BTreeMap<Name, MathType>, body: MathType) -> BigUnion {
        BigUnion {
            variables: OnceLock::from(variables),
            anonymous: None,
            body,
        }
    }

    /// `mtype` is the type every anonymous variable is bound to.
    pub(crate) fn anonymous(count: usize, mtype: MathType, body: MathType) -> BigUnion {
        BigUnion {
            variables: OnceLock::new(),
            anonymous: Some((count, mtype)),
            body,
        }
    }

    /// Quantified variables in name order, materializing `*0`, `*1`, ... for
    /// an anonymous union.
    pub fn variables(&self) -> &BTreeMap<Name, MathType> {
        self.variables.get_or_init(|| match &self.anonymous {
            Some((count, mtype)) => (0..*count)
                .map(|i| (Name::from(format!("*{i}")), mtype.clone()))
                .collect(),
            None => BTreeMap::new(),
        })
    }

    pub fn variable_count(&self) -> usize {
        match (&self.anonymous, self.variables.get()) {
            (_, Some(variables)) => variables.len(),
            (Some((count, _)), None) => *count,
            (None, None) => 0,
        }
    }

    pub fn body(&self) -> &MathType {
        &self.body
    }
}

impl Function {
    pub fn domain(&self) -> &MathType {
        &self.domain
    }

    pub fn range(&self) -> &MathType {
        &self.range
    }
}

// Per-variant salts mixed into every hash so that differently shaped
// types practically never collide.
const fn salt(name: &str) -> u64 {
    let bytes = name.as_bytes();
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
        i += 1;
    }
    hash
}

const NAMED_SALT: u64 = salt("MTNamed");
const GENERIC_SALT: u64 = salt("MTGeneric");
const PROPER_SALT: u64 = salt("MTProper");
const FUNCTION_SALT: u64 = salt("MTFunction");
const APPLICATION_SALT: u64 = salt("MTFunctionApplication");
const POWERSET_SALT: u64 = salt("MTPowersetApplication");
const BIG_UNION_SALT: u64 = salt("MTBigUnion");
const INTERSECT_SALT: u64 = salt("MTIntersect");
const UNION_SALT: u64 = salt("MTUnion");
const CARTESIAN_SALT: u64 = salt("MTCartesian");
const SET_RESTRICTION_SALT: u64 = salt("MTSetRestriction");

fn str_hash(value: &str) -> u64 {
    value.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

fn fold_hashes<'a>(base: u64, types: impl IntoIterator<Item = &'a MathType>) -> u64 {
    types
        .into_iter()
        .fold(base, |acc, t| acc.wrapping_mul(31).wrapping_add(t.hash_value()))
}

// Named nodes hash to a constant: their names are subject to alpha-renaming.
fn compute_hash(kind: &TypeKind) -> u64 {
    match kind {
        TypeKind::Named(_) => NAMED_SALT,
        TypeKind::Generic(name) => GENERIC_SALT.wrapping_mul(31).wrapping_add(str_hash(name.as_str())),
        TypeKind::Proper(p) => PROPER_SALT.wrapping_mul(31).wrapping_add(str_hash(p.name.as_str())),
        TypeKind::Function(f) => FUNCTION_SALT
            .wrapping_add(f.domain.hash_value().wrapping_mul(31))
            .wrapping_add(f.range.hash_value()),
        TypeKind::FunctionApplication(app) => fold_hashes(
            APPLICATION_SALT.wrapping_add(str_hash(app.name.as_str())),
            std::iter::once(&app.function).chain(&app.arguments),
        ),
        TypeKind::PowersetApplication(app) => fold_hashes(POWERSET_SALT, &app.arguments),
        TypeKind::BigUnion(u) => {
            let variables = match &u.anonymous {
                Some((count, mtype)) => mtype.hash_value().wrapping_mul(*count as u64),
                None => u
                    .variables()
                    .values()
                    .fold(0u64, |acc, t| acc.wrapping_add(t.hash_value())),
            };
            BIG_UNION_SALT
                .wrapping_add(variables)
                .wrapping_mul(57)
                .wrapping_add(u.body.hash_value())
        }
        TypeKind::Intersect(members) => fold_hashes(INTERSECT_SALT, members),
        TypeKind::Union(members) => fold_hashes(UNION_SALT, members),
        TypeKind::Cartesian(factors) => fold_hashes(CARTESIAN_SALT, factors.iter().map(|f| &f.ty)),
        TypeKind::SetRestriction(r) => SET_RESTRICTION_SALT.wrapping_add(r.base.hash_value()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MathType {
    pub(crate) fn new(graph: GraphId, kind: TypeKind) -> MathType {
        let hash = compute_hash(&kind);
        MathType(Arc::new(TypeNode {
            graph,
            hash,
            kind,
            alpha_cache: Mutex::new(Vec::new()),
            subtype_cache: Mutex::new(Vec::new()),
        }))
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0.kind
    }

    pub fn graph_id(&self) -> GraphId {
        self.0.graph
    }

    /// Alpha-equivalence-invariant hash.
    pub fn hash_value(&self) -> u64 {
        self.0.hash
    }

    pub fn ptr_eq(&self, other: &MathType) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn as_named(&self) -> Option<&Name> {
        match self.kind() {
            TypeKind::Named(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self.kind() {
            TypeKind::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Both plain and powerset applications.
    pub fn as_application(&self) -> Option<&FunctionApplication> {
        match self.kind() {
            TypeKind::FunctionApplication(app) | TypeKind::PowersetApplication(app) => Some(app),
            _ => None,
        }
    }

    pub fn as_big_union(&self) -> Option<&BigUnion> {
        match self.kind() {
            TypeKind::BigUnion(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_proper(&self) -> Option<&Proper> {
        match self.kind() {
            TypeKind::Proper(p) => Some(p),
            _ => None,
        }
    }

    /// Everything except named references and primitive types.
    pub fn is_abstract(&self) -> bool {
        !matches!(self.kind(), TypeKind::Named(_) | TypeKind::Proper(_))
    }

    /// Ordered children, sufficient to rebuild this node.
    pub fn components(&self) -> Vec<MathType> {
        match self.kind() {
            TypeKind::Named(_)
            | TypeKind::Generic(_)
            | TypeKind::Proper(_)
            | TypeKind::SetRestriction(_) => vec![],
            TypeKind::Function(f) => vec![f.domain.clone(), f.range.clone()],
            TypeKind::FunctionApplication(app) | TypeKind::PowersetApplication(app) => {
                let mut components = Vec::with_capacity(app.arguments.len() + 1);
                components.push(app.function.clone());
                components.extend(app.arguments.iter().cloned());
                components
            }
            TypeKind::BigUnion(u) => {
                let mut components: Vec<MathType> = u.variables().values().cloned().collect();
                components.push(u.body.clone());
                components
            }
            TypeKind::Intersect(members) | TypeKind::Union(members) => members.clone(),
            TypeKind::Cartesian(factors) => factors.iter().map(|f| f.ty.clone()).collect(),
        }
    }

    pub fn arity(&self) -> usize {
        match self.kind() {
            TypeKind::Named(_)
            | TypeKind::Generic(_)
            | TypeKind::Proper(_)
            | TypeKind::SetRestriction(_) => 0,
            TypeKind::Function(_) => 2,
            TypeKind::FunctionApplication(app) | TypeKind::PowersetApplication(app) => {
                app.arguments.len() + 1
            }
            TypeKind::BigUnion(u) => u.variable_count() + 1,
            TypeKind::Intersect(members) | TypeKind::Union(members) => members.len(),
            TypeKind::Cartesian(factors) => factors.len(),
        }
    }

    pub fn with_component_replaced(
        &self,
        index: usize,
        replacement: MathType,
    ) -> Result<MathType, IndexOutOfBounds> {
        self.with_components_replaced([(index, replacement)])
    }

    pub fn with_components_replaced(
        &self,
        replacements: impl IntoIterator<Item = (usize, MathType)>,
    ) -> Result<MathType, IndexOutOfBounds> {
        let mut components = self.components();
        let arity = components.len();
        for (index, replacement) in replacements {
            match components.get_mut(index) {
                Some(slot) => *slot = replacement,
                None => return Err(IndexOutOfBounds { index, arity }),
            }
        }
        Ok(self.from_components(components))
    }

    /// Rebuilds this variant around `components`, whose length must equal the
    /// arity of `self`.
    pub(crate) fn from_components(&self, components: Vec<MathType>) -> MathType {
        debug_assert_eq!(components.len(), self.arity());
        let graph = self.graph_id();
        let mut components = components.into_iter();
        let mut next = |fallback: &MathType| components.next().unwrap_or_else(|| fallback.clone());
        let kind = match self.kind() {
            TypeKind::Named(_)
            | TypeKind::Generic(_)
            | TypeKind::Proper(_)
            | TypeKind::SetRestriction(_) => return self.clone(),
            TypeKind::Function(f) => TypeKind::Function(Function {
                domain: next(&f.domain),
                range: next(&f.range),
                ..f.clone()
            }),
            TypeKind::FunctionApplication(app) => {
                TypeKind::FunctionApplication(rebuild_application(app, &mut next))
            }
            TypeKind::PowersetApplication(app) => {
                let rebuilt = rebuild_application(app, &mut next);
                if rebuilt.function.ptr_eq(&app.function) {
                    TypeKind::PowersetApplication(rebuilt)
                } else {
                    TypeKind::FunctionApplication(rebuilt)
                }
            }
            TypeKind::BigUnion(u) => {
                let variables = u
                    .variables()
                    .iter()
                    .map(|(name, ty)| (name.clone(), next(ty)))
                    .collect();
                TypeKind::BigUnion(BigUnion::named(variables, next(&u.body)))
            }
            TypeKind::Intersect(members) => {
                TypeKind::Intersect(members.iter().map(|m| next(m)).collect())
            }
            TypeKind::Union(members) => TypeKind::Union(members.iter().map(|m| next(m)).collect()),
            TypeKind::Cartesian(factors) => TypeKind::Cartesian(
                factors
                    .iter()
                    .map(|f| Factor {
                        tag: f.tag.clone(),
                        ty: next(&f.ty),
                    })
                    .collect(),
            ),
        };
        MathType::new(graph, kind)
    }

    /// Whether every instance of this type can itself be used as a type.
    pub fn is_known_to_contain_only_mtypes(&self) -> bool {
        match self.kind() {
            TypeKind::Proper(p) => p.contains_only_mtypes,
            TypeKind::PowersetApplication(_) => true,
            TypeKind::BigUnion(u) => u.body.is_known_to_contain_only_mtypes(),
            TypeKind::FunctionApplication(app) => app
                .function
                .as_function()
                .is_some_and(|f| f.range.members_known_to_contain_only_mtypes()),
            TypeKind::Union(members) => {
                !members.is_empty() && members.iter().all(MathType::is_known_to_contain_only_mtypes)
            }
            TypeKind::Intersect(members) => {
                members.iter().any(MathType::is_known_to_contain_only_mtypes)
            }
            _ => false,
        }
    }

    /// Whether every instance of this type contains only types.
    pub fn members_known_to_contain_only_mtypes(&self) -> bool {
        match self.kind() {
            TypeKind::Proper(p) => p.members_contain_only_mtypes,
            TypeKind::PowersetApplication(app) => app
                .arguments
                .iter()
                .all(MathType::is_known_to_contain_only_mtypes),
            TypeKind::BigUnion(u) => u.body.members_known_to_contain_only_mtypes(),
            TypeKind::FunctionApplication(app) => {
                app.arguments.iter().all(MathType::is_known_to_contain_only_mtypes)
                    && app.function.as_function().is_some_and(|f| f.restriction)
            }
            _ => false,
        }
    }

    pub(crate) fn cached_alpha_equal(&self, other: &MathType) -> bool {
        lock(&self.0.alpha_cache)
            .iter()
            .any(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(&other.0)))
    }

    pub(crate) fn remember_alpha_equal(&self, other: &MathType) {
        let mut cache = lock(&self.0.alpha_cache);
        cache.retain(|weak| weak.strong_count() > 0);
        cache.push(Arc::downgrade(&other.0));
    }

    pub(crate) fn cached_subtype_bindings(&self, other: &MathType) -> Option<HashMap<Name, MathType>> {
        lock(&self.0.subtype_cache)
            .iter()
            .find(|(weak, _)| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(&other.0)))
            .map(|(_, bindings)| bindings.clone())
    }

    pub(crate) fn remember_subtype_bindings(&self, other: &MathType, bindings: HashMap<Name, MathType>) {
        let mut cache = lock(&self.0.subtype_cache);
        cache.retain(|(weak, _)| weak.strong_count() > 0);
        cache.push((Arc::downgrade(&other.0), bindings));
    }
}

fn rebuild_application(
    app: &FunctionApplication,
    next: &mut impl FnMut(&MathType) -> MathType,
) -> FunctionApplication {
    FunctionApplication {
        function: next(&app.function),
        name: app.name.clone(),
        arguments: app.arguments.iter().map(|a| next(a)).collect(),
    }
}

impl PartialEq for MathType {
    fn eq(&self, other: &Self) -> bool {
        crate::alpha::equivalent(self, other)
    }
}

impl Eq for MathType {}

impl Hash for MathType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl Debug for MathType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MathType({self})")
    }
}

impl Display for MathType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn join(f: &mut std::fmt::Formatter<'_>, items: &[MathType], sep: &str) -> std::fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, "{sep}")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }
        match self.kind() {
            TypeKind::Named(name) | TypeKind::Generic(name) => write!(f, "{name}"),
            TypeKind::Proper(p) => write!(f, "{}", p.name),
            TypeKind::Function(fun) => write!(f, "({} -> {})", fun.domain, fun.range),
            TypeKind::FunctionApplication(app) | TypeKind::PowersetApplication(app) => {
                if app.arguments.is_empty() {
                    write!(f, "{}", app.name)
                } else {
                    write!(f, "{}(", app.name)?;
                    join(f, &app.arguments, ", ")?;
                    write!(f, ")")
                }
            }
            TypeKind::BigUnion(u) => {
                write!(f, "BigUnion{{")?;
                for (i, (name, ty)) in u.variables().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} : {ty}")?;
                }
                write!(f, "}}{{{}}}", u.body)
            }
            TypeKind::Intersect(members) => {
                write!(f, "(")?;
                join(f, members, " ∩ ")?;
                write!(f, ")")
            }
            TypeKind::Union(members) => {
                write!(f, "(")?;
                join(f, members, " ∪ ")?;
                write!(f, ")")
            }
            TypeKind::Cartesian(factors) => {
                write!(f, "(")?;
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        write!(f, " * ")?;
                    }
                    match &factor.tag {
                        Some(tag) => write!(f, "{tag} : {}", factor.ty)?,
                        None => write!(f, "{}", factor.ty)?,
                    }
                }
                write!(f, ")")
            }
            TypeKind::SetRestriction(r) => {
                write!(f, "{{{} : {} | {}}}", r.variable, r.base, r.predicate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TypeGraph;

    struct Fixture {
        g: TypeGraph,
    }

    impl Fixture {
        fn new() -> Fixture {
            Fixture { g: TypeGraph::new() }
        }

        fn samples(&self) -> Vec<MathType> {
            let g = &self.g;
            let t = g.named("T");
            vec![
                g.function(g.z.clone(), g.boolean.clone()),
                g.function_application(g.function(g.z.clone(), g.mtype.clone()), "F", vec![g.z.clone()]),
                g.powerset(g.z.clone()),
                g.big_union([("T", g.mtype.clone())], t.clone()),
                g.anonymous_big_union(2, g.z.clone()),
                g.intersect(vec![g.z.clone(), g.boolean.clone()]),
                g.union(vec![g.z.clone(), g.boolean.clone()]),
                g.cartesian(vec![Factor { tag: Some("x".into()), ty: g.z.clone() }, Factor { tag: None, ty: t }]),
            ]
        }
    }

    #[test]
    fn replacing_a_component_with_itself_is_a_no_op() {
        let fx = Fixture::new();
        for t in fx.samples() {
            for (i, component) in t.components().into_iter().enumerate() {
                let replaced = t.with_component_replaced(i, component).unwrap();
                assert_eq!(replaced, t, "component {i} of {t}");
            }
        }
    }

    #[test]
    fn generic_has_no_components() {
        let fx = Fixture::new();
        let generic = fx.g.generic("E");
        assert!(generic.components().is_empty());
        for index in [0, 1, 7] {
            assert_eq!(
                generic.with_component_replaced(index, fx.g.z.clone()),
                Err(IndexOutOfBounds { index, arity: 0 })
            );
        }
    }

    #[test]
    fn out_of_bounds_index_is_rejected() {
        let fx = Fixture::new();
        let f = fx.g.function(fx.g.z.clone(), fx.g.boolean.clone());
        assert!(f.with_component_replaced(2, fx.g.z.clone()).is_err());
    }

    #[test]
    fn application_components_are_function_then_arguments() {
        let fx = Fixture::new();
        let g = &fx.g;
        let f = g.function(g.cartesian_of([g.z.clone(), g.z.clone()]), g.z.clone());
        let app = g.function_application(f, "plus", vec![g.z.clone(), g.boolean.clone()]);
        let replaced = app.with_component_replaced(2, g.z.clone()).unwrap();
        insta::assert_snapshot!(replaced, @"plus(Z, Z)");
        let h = g.function(g.cartesian_of([g.z.clone(), g.z.clone()]), g.boolean.clone());
        let replaced = app.with_component_replaced(0, h.clone()).unwrap();
        assert!(replaced.as_application().unwrap().function.ptr_eq(&h));
    }

    #[test]
    fn powerset_stays_powerset_when_argument_replaced() {
        let fx = Fixture::new();
        let g = &fx.g;
        let p = g.powerset(g.z.clone());
        let replaced = p.with_component_replaced(1, g.boolean.clone()).unwrap();
        assert!(matches!(replaced.kind(), TypeKind::PowersetApplication(_)));
        insta::assert_snapshot!(replaced, @"Powerset(B)");
    }

    #[test]
    fn anonymous_union_materializes_names() {
        let fx = Fixture::new();
        let u = fx.g.anonymous_big_union(2, fx.g.z.clone());
        assert_eq!(u.as_big_union().unwrap().variable_count(), 2);
        insta::assert_snapshot!(u, @"BigUnion{*0 : MType, *1 : MType}{Z}");
        assert_eq!(u.components().len(), 3);
    }

    #[test]
    fn anonymous_and_named_unions_are_interchangeable() {
        let fx = Fixture::new();
        let g = &fx.g;
        let anonymous = g.anonymous_big_union(1, g.z.clone());
        let named = g.big_union([("x", g.mtype.clone())], g.z.clone());
        assert_eq!(anonymous.hash_value(), named.hash_value());
        assert_eq!(anonymous, named);
    }

    #[test]
    fn hash_ignores_bound_names() {
        let fx = Fixture::new();
        let g = &fx.g;
        let a = g.big_union([("t", g.mtype.clone())], g.named("t"));
        let b = g.big_union([("r", g.mtype.clone())], g.named("r"));
        assert_eq!(a.hash_value(), b.hash_value());
        assert_ne!(g.intersect(vec![g.z.clone()]).hash_value(), g.union(vec![g.z.clone()]).hash_value());
    }

    #[test]
    fn display_cartesian_function() {
        let fx = Fixture::new();
        let g = &fx.g;
        let f = g.function_with_parameters(
            vec![("x".into(), g.z.clone()), ("b".into(), g.boolean.clone())],
            g.z.clone(),
        );
        insta::assert_snapshot!(f, @"((x : Z * b : B) -> Z)");
    }

    #[test]
    fn contains_only_mtypes() {
        let fx = Fixture::new();
        let g = &fx.g;
        assert!(g.mtype.is_known_to_contain_only_mtypes());
        assert!(!g.z.is_known_to_contain_only_mtypes());
        assert!(g.powerset(g.z.clone()).is_known_to_contain_only_mtypes());
        assert!(g
            .big_union([("T", g.mtype.clone())], g.powerset(g.named("T")))
            .is_known_to_contain_only_mtypes());
    }
}
