//! Traversals over [`MathType`] trees.
//!
//! Every traversal brackets a node the same way: begin hooks from least to
//! most specific (`begin_type`, `begin_abstract`, then the variant hook), the
//! children in component order, then the end hooks in the reverse order.

use std::collections::{BTreeMap, HashMap};

use crate::mtype::{BigUnion, MathType, Name, TypeKind};

macro_rules! hooks {
    ($($begin:ident $end:ident),* $(,)?) => {
        /// Plain single-tree visitor. All hooks default to doing nothing.
        pub trait TypeVisitor {
            $(
                fn $begin(&mut self, _t: &MathType) {}
                fn $end(&mut self, _t: &MathType) {}
            )*
            fn begin_children(&mut self, _t: &MathType) {}
            fn end_children(&mut self, _t: &MathType) {}
        }

        /// Lock-step visitor over two trees. A `false` from a begin hook
        /// prevents descending into the children; a `false` from an end hook,
        /// `mid` or `mismatch` stops the remaining siblings.
        pub trait SymmetricVisitor {
            $(
                fn $begin(&mut self, _t1: &MathType, _t2: &MathType) -> bool {
                    true
                }
                fn $end(&mut self, _t1: &MathType, _t2: &MathType) -> bool {
                    true
                }
            )*
            /// Called between two successive children of `t1` and `t2`.
            fn mid(&mut self, _t1: &MathType, _t2: &MathType) -> bool {
                true
            }
            /// Called when the two nodes differ in variant or in arity.
            fn mismatch(&mut self, _t1: &MathType, _t2: &MathType) -> bool {
                false
            }
        }
    };
}

hooks! {
    begin_type end_type,
    begin_abstract end_abstract,
    begin_named end_named,
    begin_generic end_generic,
    begin_proper end_proper,
    begin_function end_function,
    begin_function_application end_function_application,
    begin_powerset_application end_powerset_application,
    begin_big_union end_big_union,
    begin_intersect end_intersect,
    begin_union end_union,
    begin_cartesian end_cartesian,
    begin_set_restriction end_set_restriction,
}

fn begin_variant<V: TypeVisitor + ?Sized>(v: &mut V, t: &MathType) {
    match t.kind() {
        TypeKind::Named(_) => v.begin_named(t),
        TypeKind::Generic(_) => v.begin_generic(t),
        TypeKind::Proper(_) => v.begin_proper(t),
        TypeKind::Function(_) => v.begin_function(t),
        TypeKind::FunctionApplication(_) => v.begin_function_application(t),
        TypeKind::PowersetApplication(_) => {
            v.begin_function_application(t);
            v.begin_powerset_application(t);
        }
        TypeKind::BigUnion(_) => v.begin_big_union(t),
        TypeKind::Intersect(_) => v.begin_intersect(t),
        TypeKind::Union(_) => v.begin_union(t),
        TypeKind::Cartesian(_) => v.begin_cartesian(t),
        TypeKind::SetRestriction(_) => v.begin_set_restriction(t),
    }
}

fn end_variant<V: TypeVisitor + ?Sized>(v: &mut V, t: &MathType) {
    match t.kind() {
        TypeKind::Named(_) => v.end_named(t),
        TypeKind::Generic(_) => v.end_generic(t),
        TypeKind::Proper(_) => v.end_proper(t),
        TypeKind::Function(_) => v.end_function(t),
        TypeKind::FunctionApplication(_) => v.end_function_application(t),
        TypeKind::PowersetApplication(_) => {
            v.end_powerset_application(t);
            v.end_function_application(t);
        }
        TypeKind::BigUnion(_) => v.end_big_union(t),
        TypeKind::Intersect(_) => v.end_intersect(t),
        TypeKind::Union(_) => v.end_union(t),
        TypeKind::Cartesian(_) => v.end_cartesian(t),
        TypeKind::SetRestriction(_) => v.end_set_restriction(t),
    }
}

pub fn walk<V: TypeVisitor + ?Sized>(v: &mut V, t: &MathType) {
    v.begin_type(t);
    if t.is_abstract() {
        v.begin_abstract(t);
    }
    begin_variant(v, t);
    v.begin_children(t);
    for child in t.components() {
        walk(v, &child);
    }
    v.end_children(t);
    end_variant(v, t);
    if t.is_abstract() {
        v.end_abstract(t);
    }
    v.end_type(t);
}

// Every begin hook runs, so that scope-tracking hooks stay balanced with
// their end hooks even when an earlier hook declines to descend.
fn begin_pair<V: SymmetricVisitor + ?Sized>(v: &mut V, t1: &MathType, t2: &MathType) -> bool {
    let mut descend = v.begin_type(t1, t2);
    if t1.is_abstract() {
        descend &= v.begin_abstract(t1, t2);
    }
    descend &= match t1.kind() {
        TypeKind::Named(_) => v.begin_named(t1, t2),
        TypeKind::Generic(_) => v.begin_generic(t1, t2),
        TypeKind::Proper(_) => v.begin_proper(t1, t2),
        TypeKind::Function(_) => v.begin_function(t1, t2),
        TypeKind::FunctionApplication(_) => v.begin_function_application(t1, t2),
        TypeKind::PowersetApplication(_) => {
            let general = v.begin_function_application(t1, t2);
            v.begin_powerset_application(t1, t2) & general
        }
        TypeKind::BigUnion(_) => v.begin_big_union(t1, t2),
        TypeKind::Intersect(_) => v.begin_intersect(t1, t2),
        TypeKind::Union(_) => v.begin_union(t1, t2),
        TypeKind::Cartesian(_) => v.begin_cartesian(t1, t2),
        TypeKind::SetRestriction(_) => v.begin_set_restriction(t1, t2),
    };
    descend
}

fn end_pair<V: SymmetricVisitor + ?Sized>(v: &mut V, t1: &MathType, t2: &MathType) -> bool {
    let mut siblings = match t1.kind() {
        TypeKind::Named(_) => v.end_named(t1, t2),
        TypeKind::Generic(_) => v.end_generic(t1, t2),
        TypeKind::Proper(_) => v.end_proper(t1, t2),
        TypeKind::Function(_) => v.end_function(t1, t2),
        TypeKind::FunctionApplication(_) => v.end_function_application(t1, t2),
        TypeKind::PowersetApplication(_) => {
            let specific = v.end_powerset_application(t1, t2);
            v.end_function_application(t1, t2) & specific
        }
        TypeKind::BigUnion(_) => v.end_big_union(t1, t2),
        TypeKind::Intersect(_) => v.end_intersect(t1, t2),
        TypeKind::Union(_) => v.end_union(t1, t2),
        TypeKind::Cartesian(_) => v.end_cartesian(t1, t2),
        TypeKind::SetRestriction(_) => v.end_set_restriction(t1, t2),
    };
    if t1.is_abstract() {
        siblings &= v.end_abstract(t1, t2);
    }
    siblings & v.end_type(t1, t2)
}

/// Walks `t1` and `t2` in lock step. Returns whether the caller should keep
/// visiting siblings.
pub fn visit_pair<V: SymmetricVisitor + ?Sized>(v: &mut V, t1: &MathType, t2: &MathType) -> bool {
    if std::mem::discriminant(t1.kind()) != std::mem::discriminant(t2.kind()) {
        return v.mismatch(t1, t2);
    }
    if begin_pair(v, t1, t2) {
        let c1 = t1.components();
        let c2 = t2.components();
        if c1.len() != c2.len() {
            v.mismatch(t1, t2);
        } else {
            let mut siblings = true;
            for (i, (a, b)) in c1.iter().zip(&c2).enumerate() {
                if i > 0 {
                    siblings = v.mid(t1, t2);
                }
                if !siblings {
                    break;
                }
                siblings = visit_pair(v, a, b);
                if !siblings {
                    break;
                }
            }
        }
    }
    end_pair(v, t1, t2)
}

/// Bottom-up rebuilding traversal. `leave` receives the original node and its
/// rebuilt version (identical to the original when no descendant changed) and
/// returns the node to put in its place.
pub trait Rewriter {
    type Error;

    fn enter(&mut self, _t: &MathType) -> Result<(), Self::Error> {
        Ok(())
    }

    fn leave(&mut self, original: &MathType, rebuilt: MathType) -> Result<MathType, Self::Error>;
}

pub fn rewrite<R: Rewriter + ?Sized>(r: &mut R, t: &MathType) -> Result<MathType, R::Error> {
    r.enter(t)?;
    let components = t.components();
    let mut rebuilt_components = Vec::with_capacity(components.len());
    let mut changed = false;
    for component in &components {
        let rebuilt = rewrite(r, component)?;
        changed |= !rebuilt.ptr_eq(component);
        rebuilt_components.push(rebuilt);
    }
    let rebuilt = if changed {
        t.from_components(rebuilt_components)
    } else {
        t.clone()
    };
    r.leave(t, rebuilt)
}

pub type Annotations = HashMap<String, MathType>;

#[derive(Debug, Clone)]
pub struct BoundVariable {
    pub ty: MathType,
    pub annotations: Annotations,
}

/// Stack of quantified-variable scopes. Lookups search the most recently
/// pushed scope first.
#[derive(Debug, Clone, Default)]
pub struct BoundScopes {
    scopes: Vec<BTreeMap<Name, BoundVariable>>,
}

impl BoundScopes {
    pub fn new() -> BoundScopes {
        BoundScopes::default()
    }

    pub fn push(&mut self, variables: impl IntoIterator<Item = (Name, MathType)>) {
        self.scopes.push(
            variables
                .into_iter()
                .map(|(name, ty)| {
                    (
                        name,
                        BoundVariable {
                            ty,
                            annotations: Annotations::new(),
                        },
                    )
                })
                .collect(),
        );
    }

    pub fn push_big_union(&mut self, u: &BigUnion) {
        self.push(u.variables().iter().map(|(name, ty)| (name.clone(), ty.clone())));
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Scope index (0 = outermost) and binding of the innermost scope that
    /// binds `name`.
    pub fn lookup(&self, name: &Name) -> Option<(usize, &BoundVariable)> {
        self.scopes
            .iter()
            .enumerate()
            .rev()
            .find_map(|(depth, scope)| scope.get(name).map(|bound| (depth, bound)))
    }

    pub fn innermost_binding(&self, name: &Name) -> Option<&MathType> {
        self.lookup(name).map(|(_, bound)| &bound.ty)
    }

    pub fn is_bound(&self, name: &Name) -> bool {
        self.lookup(name).is_some()
    }

    pub fn innermost_annotation(&self, name: &Name, key: &str) -> Option<&MathType> {
        self.lookup(name).and_then(|(_, bound)| bound.annotations.get(key))
    }

    /// Returns the value back when no scope binds `name`.
    pub fn annotate_innermost(&mut self, name: &Name, key: &str, value: MathType) -> Result<(), MathType> {
        match self.scopes.iter_mut().rev().find_map(|scope| scope.get_mut(name)) {
            Some(bound) => {
                bound.annotations.insert(key.to_owned(), value);
                Ok(())
            }
            None => Err(value),
        }
    }
}
