use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::mtype::{
    ApplicationBuilder, BigUnion, Factor, Function, FunctionApplication, GraphId, MathType, Name,
    Proper, SetRestriction, TypeKind,
};
use crate::subtype::SubtypeError;

pub struct TypeGraph {
    id: GraphId,
    /// The type of all types.
    pub mtype: MathType,
    pub sset: MathType,
    pub entity: MathType,
    pub element: MathType,
    pub boolean: MathType,
    pub z: MathType,
    pub atom: MathType,
    pub void: MathType,
    pub empty_set: MathType,
    pub powerset_fn: MathType,
    pub union_fn: MathType,
    pub intersect_fn: MathType,
    pub function_fn: MathType,
    pub cross_fn: MathType,
    subtypes: Mutex<Vec<(MathType, MathType)>>,
}

impl Default for TypeGraph {
    fn default() -> Self {
        TypeGraph::new()
    }
}

impl std::fmt::Debug for TypeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeGraph").field("id", &self.id).finish_non_exhaustive()
    }
}

fn proper(id: GraphId, name: &str, ty: Option<&MathType>, contains_only_mtypes: bool) -> MathType {
    MathType::new(
        id,
        TypeKind::Proper(Proper {
            name: name.into(),
            ty: ty.cloned(),
            contains_only_mtypes,
            members_contain_only_mtypes: false,
        }),
    )
}

fn builtin_function(id: GraphId, domain: MathType, range: MathType, builder: ApplicationBuilder) -> MathType {
    MathType::new(
        id,
        TypeKind::Function(Function {
            domain,
            range,
            single_parameter: None,
            restriction: builder == ApplicationBuilder::Powerset,
            builder,
        }),
    )
}

impl TypeGraph {
    pub fn new() -> TypeGraph {
        let id = GraphId::fresh();
        let mtype = proper(id, "MType", None, true);
        let m = Some(&mtype);
        let pair = || {
            MathType::new(
                id,
                TypeKind::Cartesian(vec![
                    Factor { tag: None, ty: mtype.clone() },
                    Factor { tag: None, ty: mtype.clone() },
                ]),
            )
        };
        TypeGraph {
            id,
            sset: proper(id, "SSet", m, true),
            entity: proper(id, "Entity", None, false),
            element: proper(id, "Element", None, false),
            boolean: proper(id, "B", m, false),
            z: proper(id, "Z", m, false),
            atom: proper(id, "Atom", m, false),
            void: proper(id, "Void", m, false),
            empty_set: proper(id, "Empty_Set", m, false),
            powerset_fn: builtin_function(id, mtype.clone(), mtype.clone(), ApplicationBuilder::Powerset),
            union_fn: builtin_function(id, pair(), mtype.clone(), ApplicationBuilder::Union),
            intersect_fn: builtin_function(id, pair(), mtype.clone(), ApplicationBuilder::Intersect),
            function_fn: builtin_function(id, pair(), mtype.clone(), ApplicationBuilder::FunctionConstructor),
            cross_fn: builtin_function(id, pair(), mtype.clone(), ApplicationBuilder::CartesianProduct),
            mtype,
            subtypes: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    /// The class of all classes; the same node as `mtype`.
    pub fn cls(&self) -> &MathType {
        &self.mtype
    }

    pub fn named(&self, name: impl Into<Name>) -> MathType {
        MathType::new(self.id, TypeKind::Named(name.into()))
    }

    pub fn generic(&self, name: impl Into<Name>) -> MathType {
        MathType::new(self.id, TypeKind::Generic(name.into()))
    }

    /// A new primitive type. Primitives are equal only to themselves.
    pub fn proper(&self, name: impl Into<Name>, ty: Option<MathType>, contains_only_mtypes: bool) -> MathType {
        MathType::new(
            self.id,
            TypeKind::Proper(Proper {
                name: name.into(),
                ty,
                contains_only_mtypes,
                members_contain_only_mtypes: false,
            }),
        )
    }

    pub fn function(&self, domain: MathType, range: MathType) -> MathType {
        self.function_with_builder(domain, range, ApplicationBuilder::Vanilla, false)
    }

    pub fn function_with_builder(
        &self,
        domain: MathType,
        range: MathType,
        builder: ApplicationBuilder,
        restriction: bool,
    ) -> MathType {
        MathType::new(
            self.id,
            TypeKind::Function(Function {
                domain,
                range,
                single_parameter: None,
                restriction,
                builder,
            }),
        )
    }

    /// Packs named parameters into the domain: none gives `Void`, one gives a
    /// single named parameter, more give a tagged cartesian product.
    pub fn function_with_parameters(&self, parameters: Vec<(Name, MathType)>, range: MathType) -> MathType {
        let (domain, single_parameter) = match parameters.len() {
            0 => (self.void.clone(), None),
            1 => {
                let (name, ty) = parameters.into_iter().next().unzip();
                (ty.unwrap_or_else(|| self.void.clone()), name)
            }
            _ => (
                self.cartesian(
                    parameters
                        .into_iter()
                        .map(|(tag, ty)| Factor { tag: Some(tag), ty })
                        .collect(),
                ),
                None,
            ),
        };
        MathType::new(
            self.id,
            TypeKind::Function(Function {
                domain,
                range,
                single_parameter,
                restriction: false,
                builder: ApplicationBuilder::Vanilla,
            }),
        )
    }

    pub fn function_application(
        &self,
        function: MathType,
        name: impl Into<Name>,
        arguments: Vec<MathType>,
    ) -> MathType {
        MathType::new(
            self.id,
            TypeKind::FunctionApplication(FunctionApplication {
                function,
                name: name.into(),
                arguments,
            }),
        )
    }

    /// Applies `function` through its application builder.
    pub fn apply(&self, function: &MathType, name: impl Into<Name>, arguments: Vec<MathType>) -> MathType {
        let builder = function.as_function().map(|f| f.builder);
        match (builder, arguments.as_slice()) {
            (Some(ApplicationBuilder::Powerset), [argument]) => self.powerset(argument.clone()),
            (Some(ApplicationBuilder::Union), _) => self.union(arguments),
            (Some(ApplicationBuilder::Intersect), _) => self.intersect(arguments),
            (Some(ApplicationBuilder::FunctionConstructor), [domain, range]) => {
                self.function(domain.clone(), range.clone())
            }
            (Some(ApplicationBuilder::CartesianProduct), _) => self.cartesian_of(arguments),
            _ => self.function_application(function.clone(), name, arguments),
        }
    }

    pub fn powerset(&self, argument: MathType) -> MathType {
        MathType::new(
            self.id,
            TypeKind::PowersetApplication(FunctionApplication {
                function: self.powerset_fn.clone(),
                name: "Powerset".into(),
                arguments: vec![argument],
            }),
        )
    }

    pub fn big_union<N: Into<Name>>(
        &self,
        variables: impl IntoIterator<Item = (N, MathType)>,
        body: MathType,
    ) -> MathType {
        let variables: BTreeMap<Name, MathType> =
            variables.into_iter().map(|(name, ty)| (name.into(), ty)).collect();
        MathType::new(self.id, TypeKind::BigUnion(BigUnion::named(variables, body)))
    }

    /// A union over `count` fresh variables, each ranging over `MType`.
    pub fn anonymous_big_union(&self, count: usize, body: MathType) -> MathType {
        MathType::new(
            self.id,
            TypeKind::BigUnion(BigUnion::anonymous(count, self.mtype.clone(), body)),
        )
    }

    pub fn intersect(&self, members: Vec<MathType>) -> MathType {
        MathType::new(self.id, TypeKind::Intersect(members))
    }

    pub fn union(&self, members: Vec<MathType>) -> MathType {
        MathType::new(self.id, TypeKind::Union(members))
    }

    pub fn cartesian(&self, factors: Vec<Factor>) -> MathType {
        MathType::new(self.id, TypeKind::Cartesian(factors))
    }

    pub fn cartesian_of(&self, types: impl IntoIterator<Item = MathType>) -> MathType {
        self.cartesian(types.into_iter().map(|ty| Factor { tag: None, ty }).collect())
    }

    pub fn set_restriction(&self, base: MathType, variable: impl Into<Name>, predicate: &str) -> MathType {
        MathType::new(
            self.id,
            TypeKind::SetRestriction(SetRestriction {
                base,
                variable: variable.into(),
                predicate: predicate.into(),
            }),
        )
    }

    /// Registers `sub` as a subtype of `sup`.
    pub fn add_subtype(&self, sub: MathType, sup: MathType) {
        log::debug!("registering subtype {sub} <: {sup}");
        self.subtypes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((sub, sup));
    }

    pub fn type_of(&self, t: &MathType) -> Option<MathType> {
        match t.kind() {
            TypeKind::Proper(p) => p.ty.clone(),
            _ => Some(self.mtype.clone()),
        }
    }

    pub fn is_subtype(&self, subtype: &MathType, supertype: &MathType) -> bool {
        self.is_structural_subtype(subtype, supertype)
            || self.is_known_to_be_in(subtype, &self.powerset(supertype.clone()))
    }

    pub fn is_known_to_be_in(&self, value: &MathType, expected: &MathType) -> bool {
        // Nothing can be said about the type of MType itself.
        if !value.ptr_eq(&self.mtype) {
            if let Some(ty) = self.type_of(value) {
                if self.is_subtype(&ty, expected) {
                    return true;
                }
            }
        }
        match expected.kind() {
            TypeKind::PowersetApplication(app) => app
                .arguments
                .first()
                .is_some_and(|argument| self.is_structural_subtype(value, argument)),
            _ => false,
        }
    }

    fn is_structural_subtype(&self, subtype: &MathType, supertype: &MathType) -> bool {
        if *supertype == self.entity || *supertype == self.mtype || subtype == supertype {
            return true;
        }
        match subtype.syntactic_subtype_of(self, supertype) {
            Ok(_) => return true,
            Err(SubtypeError::NoSolution(_) | SubtypeError::FreeVariable(_)) => {}
            Err(err) => log::warn!("subtype check {subtype} <: {supertype} failed: {err}"),
        }
        self.is_registered_subtype(subtype, supertype)
    }

    fn is_registered_subtype(&self, subtype: &MathType, supertype: &MathType) -> bool {
        let edges = self.subtypes.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let mut frontier = vec![subtype.clone()];
        let mut seen: Vec<MathType> = vec![];
        while let Some(current) = frontier.pop() {
            if seen.contains(&current) {
                continue;
            }
            for (sub, sup) in &edges {
                if *sub == current {
                    if sup == supertype {
                        return true;
                    }
                    frontier.push(sup.clone());
                }
            }
            seen.push(current);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everything_is_in_mtype() {
        let g = TypeGraph::new();
        assert!(g.is_subtype(&g.z, &g.mtype));
        assert!(g.is_subtype(&g.powerset(g.z.clone()), &g.entity));
        assert!(g.is_known_to_be_in(&g.z, &g.mtype));
        assert!(!g.is_known_to_be_in(&g.mtype, &g.z));
    }

    #[test]
    fn primitives_are_distinct() {
        let g = TypeGraph::new();
        assert!(!g.is_subtype(&g.z, &g.boolean));
        assert!(g.is_subtype(&g.z, &g.z));
        assert!(g.is_subtype(&g.empty_set, &g.boolean));
    }

    #[test]
    fn registered_edges_are_transitive() {
        let g = TypeGraph::new();
        let n = g.proper("N", Some(g.mtype.clone()), false);
        let r = g.proper("R", Some(g.mtype.clone()), false);
        g.add_subtype(n.clone(), g.z.clone());
        g.add_subtype(g.z.clone(), r.clone());
        assert!(g.is_subtype(&n, &r));
        assert!(!g.is_subtype(&r, &n));
    }

    #[test]
    fn powerset_membership() {
        let g = TypeGraph::new();
        let n = g.proper("N", Some(g.mtype.clone()), false);
        g.add_subtype(n.clone(), g.z.clone());
        assert!(g.is_known_to_be_in(&n, &g.powerset(g.z.clone())));
    }

    #[test]
    fn builders_shape_applications() {
        let g = TypeGraph::new();
        insta::assert_snapshot!(g.apply(&g.powerset_fn, "Powerset", vec![g.z.clone()]), @"Powerset(Z)");
        insta::assert_snapshot!(g.apply(&g.function_fn, "->", vec![g.z.clone(), g.boolean.clone()]), @"(Z -> B)");
        insta::assert_snapshot!(g.apply(&g.cross_fn, "*", vec![g.z.clone(), g.boolean.clone()]), @"(Z * B)");
        insta::assert_snapshot!(g.apply(&g.union_fn, "union", vec![g.z.clone(), g.boolean.clone()]), @"(Z ∪ B)");
        let str_fn = g.function(g.mtype.clone(), g.mtype.clone());
        insta::assert_snapshot!(g.apply(&str_fn, "Str", vec![g.z.clone()]), @"Str(Z)");
    }
}
