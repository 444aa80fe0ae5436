use std::collections::HashMap;

use thiserror::Error;

use crate::graph::TypeGraph;
use crate::mtype::{MathType, Name, TypeKind};
use crate::visit::{visit_pair, BoundScopes, SymmetricVisitor};

/// No substitution makes the requested relationship hold.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("no solution")]
pub struct NoSolution;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubtypeError {
    #[error(transparent)]
    NoSolution(#[from] NoSolution),
    #[error("duplicate quantified variable name: {0}")]
    DuplicateBinding(Name),
    #[error("free variable in subtype check: {0}")]
    FreeVariable(Name),
}

impl MathType {
    /// Derives bindings for the `MType`-ranging variables of `other` under
    /// which `self` is syntactically a subtype of `other`. Successful results
    /// are cached on `self` per `other`.
    pub fn syntactic_subtype_of(
        &self,
        g: &TypeGraph,
        other: &MathType,
    ) -> Result<HashMap<Name, MathType>, SubtypeError> {
        if let Some(bindings) = self.cached_subtype_bindings(other) {
            return Ok(bindings);
        }
        let bindings = SubtypeChecker::new(g).run(self, other)?;
        self.remember_subtype_bindings(other, bindings.clone());
        Ok(bindings)
    }

    pub fn is_syntactic_subtype_of(&self, g: &TypeGraph, other: &MathType) -> bool {
        self.syntactic_subtype_of(g, other).is_ok()
    }
}

struct SubtypeChecker<'g> {
    g: &'g TypeGraph,
    scopes1: BoundScopes,
    scopes2: BoundScopes,
    bindings: HashMap<Name, MathType>,
    failure: Option<SubtypeError>,
    // Set by `begin_type` when the current pair is already alpha-equal.
    settled: bool,
}

impl<'g> SubtypeChecker<'g> {
    fn new(g: &'g TypeGraph) -> SubtypeChecker<'g> {
        SubtypeChecker {
            g,
            scopes1: BoundScopes::new(),
            scopes2: BoundScopes::new(),
            bindings: HashMap::new(),
            failure: None,
            settled: false,
        }
    }

    fn run(mut self, t1: &MathType, t2: &MathType) -> Result<HashMap<Name, MathType>, SubtypeError> {
        visit_pair(&mut self, t1, t2);
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.bindings),
        }
    }

    fn ok(&self) -> bool {
        self.failure.is_none()
    }

    fn fail(&mut self, err: SubtypeError) -> bool {
        if self.failure.is_none() {
            log::trace!("subtype check failed: {err}");
            self.failure = Some(err);
        }
        false
    }

    fn bind(&mut self, name: &Name, ty: &MathType) -> bool {
        match self.bindings.get(name) {
            Some(existing) if existing == ty => true,
            Some(_) => self.fail(SubtypeError::DuplicateBinding(name.clone())),
            None => {
                self.bindings.insert(name.clone(), ty.clone());
                true
            }
        }
    }

    fn axiomatic(&self, subtype: &MathType, supertype: &MathType) -> bool {
        *subtype == self.g.empty_set || *supertype == self.g.mtype || *supertype == self.g.entity
    }

    /// Whether `name` on the supertype side ranges over all types.
    fn ranges_over_mtype(&self, name: &Name) -> Result<bool, SubtypeError> {
        match self.scopes2.innermost_binding(name) {
            Some(ty) => Ok(*ty == self.g.mtype),
            None => Err(SubtypeError::FreeVariable(name.clone())),
        }
    }
}

impl SymmetricVisitor for SubtypeChecker<'_> {
    // Alpha-equal subtrees need no further work.
    fn begin_type(&mut self, t1: &MathType, t2: &MathType) -> bool {
        self.settled = t1 == t2;
        self.ok() && !self.settled
    }

    fn begin_named(&mut self, t1: &MathType, t2: &MathType) -> bool {
        let (Some(n1), Some(n2)) = (t1.as_named(), t2.as_named()) else {
            return self.ok();
        };
        if self.settled || !self.ok() || n1 == n2 {
            return self.ok();
        }
        match self.ranges_over_mtype(n2) {
            Err(err) => return self.fail(err),
            Ok(true) => return self.bind(n2, t1),
            Ok(false) => {}
        }
        let declared1 = self.scopes1.innermost_binding(n1).cloned();
        let declared2 = self.scopes2.innermost_binding(n2).cloned();
        if declared1.is_none() && declared2.is_none() {
            return self.fail(NoSolution.into());
        }
        let declared1 = declared1.unwrap_or_else(|| t1.clone());
        let declared2 = declared2.unwrap_or_else(|| t2.clone());
        if !self.axiomatic(&declared1, &declared2) {
            visit_pair(self, &declared1, &declared2);
        }
        self.ok()
    }

    fn begin_function_application(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if let (Some(a), Some(b)) = (t1.as_application(), t2.as_application()) {
            if !self.settled && a.name != b.name {
                return self.fail(NoSolution.into());
            }
        }
        self.ok()
    }

    fn begin_proper(&mut self, t1: &MathType, t2: &MathType) -> bool {
        if !(self.settled || self.axiomatic(t1, t2)) {
            return self.fail(NoSolution.into());
        }
        self.ok()
    }

    fn begin_set_restriction(&mut self, _t1: &MathType, _t2: &MathType) -> bool {
        if self.settled {
            return false;
        }
        self.fail(NoSolution.into())
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
        match (t1.kind(), t2.kind()) {
            (TypeKind::BigUnion(_), _) => {}
            (_, TypeKind::BigUnion(u2)) => {
                let wrapped = self.g.anonymous_big_union(u2.variable_count(), t1.clone());
                visit_pair(self, &wrapped, t2);
                return self.ok();
            }
            _ => {}
        }
        if let Some(n2) = t2.as_named() {
            match self.ranges_over_mtype(n2) {
                Err(err) => return self.fail(err),
                Ok(true) => return self.bind(n2, t1),
                Ok(false) => {}
            }
        }
        if self.axiomatic(t1, t2) {
            return true;
        }
        self.fail(NoSolution.into())
    }
}
