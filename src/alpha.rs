use std::collections::{HashMap, HashSet};

use crate::mtype::{MathType, Name, TypeKind};
use crate::visit::{visit_pair, BoundScopes, SymmetricVisitor};

/// Pairs of nodes (by address) whose comparison is underway.
type InProgress = HashSet<(usize, usize)>;

/// Top-level equality. Only here are the per-instance caches consulted and
/// populated; nested comparisons go through [`AlphaChecker::nested`].
pub(crate) fn equivalent(t1: &MathType, t2: &MathType) -> bool {
    if t1.ptr_eq(t2) {
        return true;
    }
    if t1.hash_value() != t2.hash_value() {
        return false;
    }
    if t1.cached_alpha_equal(t2) {
        return true;
    }
    let mut in_progress = InProgress::new();
    let result = AlphaChecker::new(&mut in_progress).check(t1, t2);
    if result {
        t1.remember_alpha_equal(t2);
    }
    result
}

struct AlphaChecker<'a> {
    in_progress: &'a mut InProgress,
    scopes1: BoundScopes,
    scopes2: BoundScopes,
    // One renaming per pair of big unions, kept in both directions so that
    // the correspondence stays a bijection.
    renamings: Vec<(HashMap<Name, Name>, HashMap<Name, Name>)>,
    result: bool,
}

impl<'a> AlphaChecker<'a> {
    fn new(in_progress: &'a mut InProgress) -> AlphaChecker<'a> {
        AlphaChecker {
            in_progress,
            scopes1: BoundScopes::new(),
            scopes2: BoundScopes::new(),
            renamings: vec![],
            result: true,
        }
    }

    fn check(mut self, t1: &MathType, t2: &MathType) -> bool {
        let key = (t1.addr(), t2.addr());
        self.in_progress.insert(key);
        visit_pair(&mut self, t1, t2);
        self.in_progress.remove(&key);
        self.result
    }

    /// Compares two declared types with fresh scopes. A pair already being
    /// compared further up is assumed equal.
    fn nested(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if t1.ptr_eq(t2) {
            return true;
        }
        if t1.hash_value() != t2.hash_value() {
            return false;
        }
        if self.in_progress.contains(&(t1.addr(), t2.addr())) {
            return true;
        }
        AlphaChecker::new(self.in_progress).check(t1, t2)
    }

    fn same_bound_variable(&mut self, depth: usize, n1: &Name, n2: &Name, ty1: &MathType, ty2: &MathType) -> bool {
        let known = {
            let (forward, backward) = &self.renamings[depth];
            match (forward.get(n1), backward.get(n2)) {
                (Some(m2), _) if m2 != n2 => Some(false),
                (_, Some(m1)) if m1 != n1 => Some(false),
                (Some(_), Some(_)) => Some(true),
                _ => None,
            }
        };
        if let Some(known) = known {
            return known;
        }
        if !self.nested(ty1, ty2) {
            return false;
        }
        let (forward, backward) = &mut self.renamings[depth];
        forward.insert(n1.clone(), n2.clone());
        backward.insert(n2.clone(), n1.clone());
        true
    }
}

impl SymmetricVisitor for AlphaChecker<'_> {
    fn begin_type(&mut self, _t1: &MathType, _t2: &MathType) -> bool {
        self.result
    }

    fn begin_named(&mut self, t1: &MathType, t2: &MathType) -> bool {
        let (Some(n1), Some(n2)) = (t1.as_named(), t2.as_named()) else {
            self.result = false;
            return false;
        };
        let b1 = self.scopes1.lookup(n1).map(|(depth, bound)| (depth, bound.ty.clone()));
        let b2 = self.scopes2.lookup(n2).map(|(depth, bound)| (depth, bound.ty.clone()));
        let equal = match (b1, b2) {
            (None, None) => n1 == n2,
            (Some((d1, ty1)), Some((d2, ty2))) => {
                d1 == d2 && self.same_bound_variable(d1, n1, n2, &ty1, &ty2)
            }
            _ => false,
        };
        self.result &= equal;
        self.result
    }

    fn begin_generic(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if let (TypeKind::Generic(a), TypeKind::Generic(b)) = (t1.kind(), t2.kind()) {
            self.result &= a == b;
        }
        self.result
    }

    fn begin_proper(&mut self, t1: &MathType, t2: &MathType) -> bool {
        self.result &= t1.ptr_eq(t2);
        self.result
    }

    fn begin_function_application(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if let (Some(a), Some(b)) = (t1.as_application(), t2.as_application()) {
            self.result &= a.name == b.name;
        }
        self.result
    }

    fn begin_big_union(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if let (Some(u1), Some(u2)) = (t1.as_big_union(), t2.as_big_union()) {
            self.scopes1.push_big_union(u1);
            self.scopes2.push_big_union(u2);
            self.renamings.push(Default::default());
        }
        self.result
    }

    fn end_big_union(&mut self, _t1: &MathType, _t2: &MathType) -> bool {
        self.scopes1.pop();
        self.scopes2.pop();
        self.renamings.pop();
        self.result
    }

    // Set restrictions carry an opaque predicate; only identical nodes are
    // known to be equal.
    fn begin_set_restriction(&mut self, t1: &MathType, t2: &MathType) -> bool {
        self.result &= t1.ptr_eq(t2);
        self.result
    }

    fn mid(&mut self, _t1: &MathType, _t2: &MathType) -> bool {
        self.result
    }

    fn mismatch(&mut self, _t1: &MathType, _t2: &MathType) -> bool {
        self.result = false;
        false
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::TypeGraph;
    use crate::mtype::{Factor, MathType};

    fn samples(g: &TypeGraph) -> Vec<MathType> {
        let t = g.named("t");
        vec![
            g.z.clone(),
            g.named("x"),
            g.generic("E"),
            g.powerset(g.z.clone()),
            g.function(g.z.clone(), g.boolean.clone()),
            g.big_union([("t", g.mtype.clone())], t.clone()),
            g.big_union([("t", g.powerset(g.mtype.clone()))], t.clone()),
            g.cartesian(vec![Factor { tag: Some("a".into()), ty: t }]),
            g.union(vec![g.z.clone(), g.boolean.clone()]),
            g.intersect(vec![g.z.clone(), g.boolean.clone()]),
        ]
    }

    #[test]
    fn equality_is_reflexive_and_symmetric() {
        let g = TypeGraph::new();
        let left = samples(&g);
        let right = samples(&g);
        for a in &left {
            assert_eq!(a, a);
            for b in &right {
                assert_eq!(a == b, b == a, "{a} vs {b}");
            }
        }
        for (a, b) in left.iter().zip(&right) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn renaming_invariance() {
        let g = TypeGraph::new();
        let t = g.big_union([("t", g.mtype.clone())], g.named("t"));
        let r = g.big_union([("r", g.mtype.clone())], g.named("r"));
        let r_powerset = g.big_union([("r", g.powerset(g.mtype.clone()))], g.named("r"));
        assert_eq!(t, r);
        assert_ne!(t, r_powerset);
    }

    #[test]
    fn renaming_must_be_a_bijection() {
        let g = TypeGraph::new();
        let vars = |a: &str, b: &str| [(a.to_owned(), g.mtype.clone()), (b.to_owned(), g.mtype.clone())];
        let distinct = g.big_union(vars("a", "b"), g.cartesian_of([g.named("a"), g.named("b")]));
        let repeated = g.big_union(vars("a", "b"), g.cartesian_of([g.named("a"), g.named("a")]));
        let renamed = g.big_union(vars("x", "y"), g.cartesian_of([g.named("x"), g.named("y")]));
        assert_ne!(distinct, repeated);
        assert_eq!(distinct, renamed);
    }

    #[test]
    fn free_and_bound_names_differ() {
        let g = TypeGraph::new();
        let bound = g.big_union([("t", g.mtype.clone())], g.named("t"));
        let free = g.big_union([("s", g.mtype.clone())], g.named("t"));
        assert_ne!(bound, free);
        assert_ne!(g.named("x"), g.named("y"));
        assert_eq!(g.named("x"), g.named("x"));
    }

    #[test]
    fn primitives_compare_by_identity() {
        let g = TypeGraph::new();
        let other = g.proper("Z", Some(g.mtype.clone()), false);
        assert_ne!(g.z, other);
    }

    #[test]
    fn application_names_matter() {
        let g = TypeGraph::new();
        let f = g.function(g.z.clone(), g.z.clone());
        let a = g.function_application(f.clone(), "succ", vec![g.z.clone()]);
        let b = g.function_application(f, "pred", vec![g.z.clone()]);
        assert_ne!(a, b);
    }

    #[test]
    fn positive_results_are_cached() {
        let g = TypeGraph::new();
        let a = g.big_union([("t", g.mtype.clone())], g.named("t"));
        let b = g.big_union([("r", g.mtype.clone())], g.named("r"));
        assert!(!a.cached_alpha_equal(&b));
        assert_eq!(a, b);
        assert!(a.cached_alpha_equal(&b));
    }

    #[test]
    fn set_restrictions_compare_by_identity() {
        let g = TypeGraph::new();
        let a = g.set_restriction(g.z.clone(), "x", "x > 0");
        let b = g.set_restriction(g.z.clone(), "x", "x > 0");
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
