use std::collections::{BTreeMap, BTreeSet, HashMap};

use thiserror::Error;

use crate::graph::TypeGraph;
use crate::mtype::{BigUnion, MathType, Name, TypeKind};
use crate::subtype::NoSolution;
use crate::visit::{visit_pair, walk, BoundScopes, SymmetricVisitor, TypeVisitor};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("cannot bind {pattern} to {target}")]
    Mismatch { pattern: String, target: String },
    #[error("{0} is bound to two different values")]
    Inconsistent(Name),
}

impl BindingError {
    pub fn mismatch(pattern: impl ToString, target: impl ToString) -> BindingError {
        BindingError::Mismatch {
            pattern: pattern.to_string(),
            target: target.to_string(),
        }
    }
}

/// A call-site argument as seen by [`MathType::deschematize`].
pub trait TypedArgument {
    /// The type of the argument.
    fn math_type(&self) -> &MathType;

    /// The type the argument denotes, when the argument is itself a type.
    fn math_type_value(&self) -> Option<&MathType>;
}

impl MathType {
    /// Matches `self` against `target`, binding the free names of `self`
    /// that are declared in `context`.
    pub fn bind_to(
        &self,
        target: &MathType,
        context: &BTreeMap<Name, MathType>,
    ) -> Result<HashMap<Name, MathType>, BindingError> {
        self.bind_to_with_contexts(target, context, &BTreeMap::new())
    }

    /// As [`bind_to`](MathType::bind_to), but free names of `target`
    /// declared in `target_context` may also bind to subtrees of `self`.
    pub fn bind_to_with_contexts(
        &self,
        target: &MathType,
        context: &BTreeMap<Name, MathType>,
        target_context: &BTreeMap<Name, MathType>,
    ) -> Result<HashMap<Name, MathType>, BindingError> {
        Binder::new(context, target_context).run(self, target)
    }

    /// Replaces free named references. Bound variables that would capture a
    /// free name of a replacement are renamed first.
    pub fn substitute(&self, substitutions: &HashMap<Name, MathType>) -> MathType {
        if substitutions.is_empty() {
            return self.clone();
        }
        substitute_free(self, substitutions)
    }

    /// Names referenced but not bound within this type.
    pub fn named_variables(&self) -> BTreeSet<Name> {
        let mut collector = FreeNames::default();
        walk(&mut collector, self);
        collector.found
    }

    pub fn contains_named(&self, name: &Name) -> bool {
        self.named_variables().contains(name)
    }

    /// Instantiates the top-level type parameters of this function type from
    /// the call-site `arguments`. Parameters are processed left to right so
    /// that later formals see the values inferred for earlier ones.
    pub fn deschematize<A: TypedArgument>(&self, g: &TypeGraph, arguments: &[A]) -> Result<MathType, NoSolution> {
        let function = self.as_function().ok_or(NoSolution)?;
        let mut values = HashMap::new();
        if function.domain == g.void {
            if !arguments.is_empty() {
                log::trace!("{self}: arguments given to a nullary function");
                return Err(NoSolution);
            }
            return Ok(self.clone());
        }
        match function.domain.kind() {
            TypeKind::Cartesian(factors) if factors.len() == arguments.len() => {
                for (factor, argument) in factors.iter().zip(arguments) {
                    deschematize_parameter(g, factor.tag.as_ref(), &factor.ty, argument, &mut values)?;
                }
            }
            TypeKind::Cartesian(_) => match (arguments, &function.single_parameter) {
                ([argument], Some(name)) => {
                    deschematize_parameter(g, Some(name), &function.domain, argument, &mut values)?
                }
                _ => {
                    log::trace!("{self}: expected a different number of arguments than {}", arguments.len());
                    return Err(NoSolution);
                }
            },
            _ => match arguments {
                [argument] => deschematize_parameter(
                    g,
                    function.single_parameter.as_ref(),
                    &function.domain,
                    argument,
                    &mut values,
                )?,
                _ => return Err(NoSolution),
            },
        }
        Ok(self.substitute(&values))
    }
}

fn deschematize_parameter<A: TypedArgument>(
    g: &TypeGraph,
    name: Option<&Name>,
    formal: &MathType,
    actual: &A,
    values: &mut HashMap<Name, MathType>,
) -> Result<(), NoSolution> {
    let formal = formal.substitute(values);
    // Only parameters ranging over types are instantiated.
    if !formal.is_known_to_contain_only_mtypes() {
        return Ok(());
    }
    let actual_type = actual.math_type().substitute(values);
    let value = if actual_type == formal {
        actual.math_type_value().cloned().unwrap_or(actual_type)
    } else if let TypeKind::FunctionApplication(app) = actual_type.kind() {
        let range = app.function.as_function().map(|f| f.range.clone()).ok_or(NoSolution)?;
        if range != formal {
            log::trace!("argument of type {actual_type} generates {range}, expected {formal}");
            return Err(NoSolution);
        }
        actual_type
    } else if let TypeKind::FunctionApplication(app) = formal.kind() {
        let range = app.function.as_function().map(|f| f.range.clone()).ok_or(NoSolution)?;
        if !g.is_subtype(&actual_type, &range) {
            return Err(NoSolution);
        }
        formal.clone()
    } else {
        let value = actual.math_type_value().cloned().ok_or(NoSolution)?;
        if !g.is_known_to_be_in(&value, &formal) {
            log::trace!("{value} is not known to be in {formal}");
            return Err(NoSolution);
        }
        value
    };
    if let Some(name) = name {
        values.insert(name.clone(), value);
    }
    Ok(())
}

fn substitute_free(t: &MathType, substitutions: &HashMap<Name, MathType>) -> MathType {
    match t.kind() {
        TypeKind::Named(name) => substitutions.get(name).cloned().unwrap_or_else(|| t.clone()),
        TypeKind::BigUnion(u) => substitute_under_binder(t, u, substitutions),
        _ => {
            let components = t.components();
            let rebuilt: Vec<MathType> = components.iter().map(|c| substitute_free(c, substitutions)).collect();
            if rebuilt.iter().zip(&components).all(|(a, b)| a.ptr_eq(b)) {
                t.clone()
            } else {
                t.from_components(rebuilt)
            }
        }
    }
}

fn substitute_under_binder(t: &MathType, u: &BigUnion, substitutions: &HashMap<Name, MathType>) -> MathType {
    let variables = u.variables();
    let mut inner: HashMap<Name, MathType> = substitutions
        .iter()
        .filter(|(name, _)| !variables.contains_key(*name))
        .map(|(name, ty)| (name.clone(), ty.clone()))
        .collect();
    let body_free = u.body().named_variables();
    inner.retain(|name, _| body_free.contains(name));
    let captured: BTreeSet<Name> = inner.values().flat_map(MathType::named_variables).collect();

    let mut renamed = BTreeMap::new();
    let mut changed = false;
    for (name, ty) in variables {
        let ty_rebuilt = substitute_free(ty, substitutions);
        changed |= !ty_rebuilt.ptr_eq(ty);
        let name = if captured.contains(name) {
            let fresh = fresh_name(name, |candidate| {
                captured.contains(candidate) || variables.contains_key(candidate) || body_free.contains(candidate)
            });
            inner.insert(name.clone(), MathType::new(t.graph_id(), TypeKind::Named(fresh.clone())));
            changed = true;
            fresh
        } else {
            name.clone()
        };
        renamed.insert(name, ty_rebuilt);
    }
    let body = if inner.is_empty() { u.body().clone() } else { substitute_free(u.body(), &inner) };
    if !changed && body.ptr_eq(u.body()) {
        return t.clone();
    }
    MathType::new(t.graph_id(), TypeKind::BigUnion(BigUnion::named(renamed, body)))
}

fn fresh_name(base: &Name, taken: impl Fn(&Name) -> bool) -> Name {
    let mut candidate = format!("{base}'");
    while taken(&Name::from(candidate.as_str())) {
        candidate.push('\'');
    }
    Name::from(candidate)
}

#[derive(Default)]
struct FreeNames {
    scopes: BoundScopes,
    found: BTreeSet<Name>,
}

impl TypeVisitor for FreeNames {
    fn begin_named(&mut self, t: &MathType) {
        if let Some(name) = t.as_named() {
            if !self.scopes.is_bound(name) {
                self.found.insert(name.clone());
            }
        }
    }

    fn begin_big_union(&mut self, t: &MathType) {
        if let Some(u) = t.as_big_union() {
            self.scopes.push_big_union(u);
        }
    }

    fn end_big_union(&mut self, _t: &MathType) {
        self.scopes.pop();
    }
}

struct Binder<'c> {
    context1: &'c BTreeMap<Name, MathType>,
    context2: &'c BTreeMap<Name, MathType>,
    scopes1: BoundScopes,
    scopes2: BoundScopes,
    bindings: HashMap<Name, MathType>,
    failure: Option<BindingError>,
}

impl<'c> Binder<'c> {
    fn new(context1: &'c BTreeMap<Name, MathType>, context2: &'c BTreeMap<Name, MathType>) -> Binder<'c> {
        Binder {
            context1,
            context2,
            scopes1: BoundScopes::new(),
            scopes2: BoundScopes::new(),
            bindings: HashMap::new(),
            failure: None,
        }
    }

    fn run(mut self, pattern: &MathType, target: &MathType) -> Result<HashMap<Name, MathType>, BindingError> {
        visit_pair(&mut self, pattern, target);
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.bindings),
        }
    }

    fn fail(&mut self, err: BindingError) -> bool {
        if self.failure.is_none() {
            self.failure = Some(err);
        }
        false
    }

    fn bindable1(&self, t: &MathType) -> Option<Name> {
        let name = t.as_named()?;
        (!self.scopes1.is_bound(name) && self.context1.contains_key(name)).then(|| name.clone())
    }

    fn bindable2(&self, t: &MathType) -> Option<Name> {
        let name = t.as_named()?;
        (!self.scopes2.is_bound(name) && self.context2.contains_key(name)).then(|| name.clone())
    }

    fn bind(&mut self, name: Name, value: &MathType) -> bool {
        match self.bindings.get(&name) {
            Some(existing) if existing == value => true,
            Some(_) => self.fail(BindingError::Inconsistent(name)),
            None => {
                self.bindings.insert(name, value.clone());
                true
            }
        }
    }

    /// Binds whichever side is a bindable name. `None` when neither is.
    fn try_bind(&mut self, t1: &MathType, t2: &MathType) -> Option<bool> {
        if let Some(name) = self.bindable1(t1) {
            return Some(self.bind(name, t2));
        }
        if let Some(name) = self.bindable2(t2) {
            return Some(self.bind(name, t1));
        }
        None
    }

    fn ok(&self) -> bool {
        self.failure.is_none()
    }
}

impl SymmetricVisitor for Binder<'_> {
    fn begin_type(&mut self, _t1: &MathType, _t2: &MathType) -> bool {
        self.ok()
    }

    fn begin_named(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if let Some(bound) = self.try_bind(t1, t2) {
            return bound;
        }
        let (Some(n1), Some(n2)) = (t1.as_named(), t2.as_named()) else {
            return self.ok();
        };
        let same = match (self.scopes1.lookup(n1), self.scopes2.lookup(n2)) {
            (Some((d1, _)), Some((d2, _))) => d1 == d2,
            (None, None) => n1 == n2,
            _ => false,
        };
        if !same {
            return self.fail(BindingError::mismatch(t1, t2));
        }
        true
    }

    fn begin_generic(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if let (TypeKind::Generic(a), TypeKind::Generic(b)) = (t1.kind(), t2.kind()) {
            if a != b {
                return self.fail(BindingError::mismatch(t1, t2));
            }
        }
        self.ok()
    }

    fn begin_proper(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if !t1.ptr_eq(t2) {
            return self.fail(BindingError::mismatch(t1, t2));
        }
        self.ok()
    }

    fn begin_function_application(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if let (Some(a), Some(b)) = (t1.as_application(), t2.as_application()) {
            if a.name != b.name {
                return self.fail(BindingError::mismatch(t1, t2));
            }
        }
        self.ok()
    }

    fn begin_set_restriction(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if !t1.ptr_eq(t2) {
            return self.fail(BindingError::mismatch(t1, t2));
        }
        self.ok()
    }

    fn begin_big_union(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if let (Some(u1), Some(u2)) = (t1.as_big_union(), t2.as_big_union()) {
            self.scopes1.push_big_union(u1);
            self.scopes2.push_big_union(u2);
        }
        self.ok()
    }

    fn end_big_union(&mut self, _t1: &MathType, _t2: &MathType) -> bool {
        self.scopes1.pop();
        self.scopes2.pop();
        self.ok()
    }

    fn end_type(&mut self, _t1: &MathType, _t2: &MathType) -> bool {
        self.ok()
    }

    fn mismatch(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if !self.ok() {
            return false;
        }
        match self.try_bind(t1, t2) {
            Some(bound) => bound,
            None => self.fail(BindingError::mismatch(t1, t2)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Arg {
        ty: MathType,
        value: Option<MathType>,
    }

    impl TypedArgument for Arg {
        fn math_type(&self) -> &MathType {
            &self.ty
        }

        fn math_type_value(&self) -> Option<&MathType> {
            self.value.as_ref()
        }
    }

    fn context(g: &TypeGraph, names: &[&str]) -> BTreeMap<Name, MathType> {
        names.iter().map(|n| (Name::from(*n), g.mtype.clone())).collect()
    }

    /// `(T : MType, S : Str(R : MType), t : T) -> (T * S)`
    fn schematic(g: &TypeGraph) -> MathType {
        let str_fn = g.function_with_parameters(vec![("R".into(), g.mtype.clone())], g.mtype.clone());
        let str_of_r = g.big_union(
            [("R", g.mtype.clone())],
            g.function_application(str_fn, "Str", vec![g.named("R")]),
        );
        g.function_with_parameters(
            vec![
                ("T".into(), g.mtype.clone()),
                ("S".into(), str_of_r),
                ("t".into(), g.named("T")),
            ],
            g.cartesian_of([g.named("T"), g.named("S")]),
        )
    }

    #[test]
    fn deschematize_binds_top_level_type_parameters() {
        let g = TypeGraph::new();
        let str_fn = g.function(g.mtype.clone(), g.mtype.clone());
        let args = [
            Arg { ty: g.mtype.clone(), value: Some(g.z.clone()) },
            Arg { ty: g.function_application(str_fn, "Str", vec![g.boolean.clone()]), value: None },
            Arg { ty: g.boolean.clone(), value: None },
        ];
        let result = schematic(&g).deschematize(&g, &args).unwrap();
        insta::assert_snapshot!(result, @"((T : MType * S : BigUnion{R : MType}{Str(R)} * t : Z) -> (Z * S))");
    }

    #[test]
    fn deschematize_rejects_arity_mismatch() {
        let g = TypeGraph::new();
        let args = [Arg { ty: g.mtype.clone(), value: Some(g.z.clone()) }, Arg { ty: g.z.clone(), value: None }];
        assert_eq!(schematic(&g).deschematize(&g, &args), Err(NoSolution));
        let nullary = g.function_with_parameters(vec![], g.z.clone());
        assert_eq!(nullary.deschematize(&g, &args), Err(NoSolution));
        assert_eq!(nullary.deschematize::<Arg>(&g, &[]), Ok(nullary.clone()));
    }

    #[test]
    fn deschematize_requires_a_type_value() {
        let g = TypeGraph::new();
        let f = g.function_with_parameters(vec![("T".into(), g.powerset(g.z.clone()))], g.named("T"));
        let missing = [Arg { ty: g.boolean.clone(), value: None }];
        assert_eq!(f.deschematize(&g, &missing), Err(NoSolution));

        let n = g.proper("N", Some(g.powerset(g.z.clone())), false);
        let present = [Arg { ty: g.boolean.clone(), value: Some(n.clone()) }];
        assert_eq!(f.deschematize(&g, &present).unwrap().as_function().unwrap().range, n);
    }

    #[test]
    fn substitution_respects_binders() {
        let g = TypeGraph::new();
        let t = g.cartesian_of([
            g.named("x"),
            g.big_union([("x", g.mtype.clone())], g.cartesian_of([g.named("x"), g.named("y")])),
        ]);
        let map = HashMap::from([("x".into(), g.z.clone()), ("y".into(), g.named("x"))]);
        insta::assert_snapshot!(t.substitute(&map), @"(Z * BigUnion{x' : MType}{(x' * x)})");
    }

    #[test]
    fn named_variables_are_free_names() {
        let g = TypeGraph::new();
        let t = g.big_union([("T", g.mtype.clone())], g.function(g.named("T"), g.named("U")));
        assert_eq!(t.named_variables().into_iter().collect::<Vec<_>>(), vec![Name::from("U")]);
        assert!(t.contains_named(&"U".into()));
        assert!(!t.contains_named(&"T".into()));
    }

    #[test]
    fn bind_to_collects_context_variables() {
        let g = TypeGraph::new();
        let pattern = g.function(g.named("D"), g.powerset(g.named("R")));
        let target = g.function(g.z.clone(), g.powerset(g.boolean.clone()));
        let bindings = pattern.bind_to(&target, &context(&g, &["D", "R"])).unwrap();
        assert!(bindings[&Name::from("D")].ptr_eq(&g.z));
        assert!(bindings[&Name::from("R")].ptr_eq(&g.boolean));
    }

    #[test]
    fn bind_to_is_consistent() {
        let g = TypeGraph::new();
        let pattern = g.cartesian_of([g.named("T"), g.named("T")]);
        let target = g.cartesian_of([g.z.clone(), g.boolean.clone()]);
        assert_eq!(
            pattern.bind_to(&target, &context(&g, &["T"])),
            Err(BindingError::Inconsistent("T".into()))
        );
        let free = g.cartesian_of([g.named("U"), g.z.clone()]);
        assert!(matches!(
            free.bind_to(&target, &context(&g, &["T"])),
            Err(BindingError::Mismatch { .. })
        ));
    }

    #[test]
    fn bind_with_two_contexts() {
        let g = TypeGraph::new();
        let pattern = g.cartesian_of([g.named("A"), g.z.clone()]);
        let target = g.cartesian_of([g.boolean.clone(), g.named("B")]);
        let bindings = pattern
            .bind_to_with_contexts(&target, &context(&g, &["A"]), &context(&g, &["B"]))
            .unwrap();
        assert!(bindings[&Name::from("A")].ptr_eq(&g.boolean));
        assert!(bindings[&Name::from("B")].ptr_eq(&g.z));

        // Without a target context the target's names stay rigid.
        assert!(matches!(
            pattern.bind_to(&target, &context(&g, &["A"])),
            Err(BindingError::Mismatch { .. })
        ));
        assert_eq!(
            pattern.bind_to(&target, &context(&g, &["A"])),
            pattern.bind_to_with_contexts(&target, &context(&g, &["A"]), &BTreeMap::new())
        );
    }
}
