use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

use anyhow::{anyhow, bail, Context as _};

use crate::env::{Quantification, SymbolEntry, SymbolEnvironment};
use crate::graph::TypeGraph;
use crate::mtype::{MathType, Name};
use crate::visit::{rewrite, Annotations, BoundScopes, Rewriter};

const LAST_REPLACE: &str = "LastReplace";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRelationship {
    IsIn { value: MathType, ty: MathType },
    Equals { left: MathType, right: MathType },
}

impl Display for TypeRelationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRelationship::IsIn { value, ty } => write!(f, "{value} : {ty}"),
            TypeRelationship::Equals { left, right } => write!(f, "{left} = {right}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Canonical {
    /// A single big union over `c1`, `c2`, ... each ranging over `MType`.
    pub ty: MathType,
    pub predicates: Vec<TypeRelationship>,
    /// Suffixed canonical names of environment symbols, mapped back to the
    /// symbol names.
    pub canonical_to_original: HashMap<Name, Name>,
}

/// Each occurrence of a quantified variable gets a fresh name `c<n>`, and
/// the predicates record what the occurrences were bound to and which of
/// them were the same variable. Nested big unions are collapsed into one at
/// the root.
pub struct Canonicalizer<'a> {
    g: &'a TypeGraph,
    env: &'a dyn SymbolEnvironment,
    suffix: String,
    next: usize,
    scopes: BoundScopes,
    env_annotations: HashMap<Name, Annotations>,
    predicates: Vec<TypeRelationship>,
    canonical_to_original: HashMap<Name, Name>,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(g: &'a TypeGraph, env: &'a dyn SymbolEnvironment, suffix: impl Display) -> Canonicalizer<'a> {
        Canonicalizer {
            g,
            env,
            suffix: format!("_{suffix}"),
            next: 1,
            scopes: BoundScopes::new(),
            env_annotations: HashMap::new(),
            predicates: vec![],
            canonical_to_original: HashMap::new(),
        }
    }

    pub fn canonicalize(mut self, t: &MathType) -> anyhow::Result<Canonical> {
        let body = rewrite(&mut self, t).with_context(|| format!("canonicalizing {t}"))?;
        let mut variables: BTreeMap<Name, MathType> =
            (1..self.next).map(|i| (Name::from(format!("c{i}")), self.g.cls().clone())).collect();
        if variables.is_empty() {
            variables.insert(Name::from(""), self.g.cls().clone());
        }
        Ok(Canonical {
            ty: self.g.big_union(variables, body),
            predicates: self.predicates,
            canonical_to_original: self.canonical_to_original,
        })
    }

    fn original_binding(&mut self, name: &Name, canonical_suffixed: &Name) -> anyhow::Result<Option<MathType>> {
        if let Some(ty) = self.scopes.innermost_binding(name) {
            return Ok(Some(ty.clone()));
        }
        let entry = self.env.query_by_name(name)?;
        let SymbolEntry::Math(symbol) = entry else {
            bail!("{name} is not a mathematical symbol");
        };
        if symbol.quantification != Quantification::Universal {
            return Ok(None);
        }
        self.canonical_to_original.insert(canonical_suffixed.clone(), name.clone());
        Ok(Some(symbol.ty))
    }

    fn last_replace(&self, name: &Name) -> Option<MathType> {
        if self.scopes.is_bound(name) {
            return self.scopes.innermost_annotation(name, LAST_REPLACE).cloned();
        }
        self.env_annotations.get(name).and_then(|a| a.get(LAST_REPLACE)).cloned()
    }

    fn set_last_replace(&mut self, name: &Name, value: MathType) {
        if let Err(value) = self.scopes.annotate_innermost(name, LAST_REPLACE, value) {
            self.env_annotations
                .entry(name.clone())
                .or_default()
                .insert(LAST_REPLACE.to_owned(), value);
        }
    }

    fn canonicalize_named(&mut self, original: &MathType, name: &Name) -> anyhow::Result<MathType> {
        let canonical = format!("c{}", self.next);
        let suffixed = Name::from(format!("{canonical}{}", self.suffix));
        let Some(binding) = self.original_binding(name, &suffixed)? else {
            return Ok(original.clone());
        };
        self.next += 1;
        let suffixed = self.g.named(suffixed);
        self.predicates.push(TypeRelationship::IsIn {
            value: suffixed.clone(),
            ty: binding,
        });
        if let Some(last) = self.last_replace(name) {
            self.predicates.push(TypeRelationship::Equals {
                left: last,
                right: suffixed.clone(),
            });
        }
        self.set_last_replace(name, suffixed);
        Ok(self.g.named(canonical))
    }
}

impl Rewriter for Canonicalizer<'_> {
    type Error = anyhow::Error;

    fn enter(&mut self, t: &MathType) -> anyhow::Result<()> {
        if let Some(u) = t.as_big_union() {
            self.scopes.push_big_union(u);
        }
        Ok(())
    }

    fn leave(&mut self, original: &MathType, rebuilt: MathType) -> anyhow::Result<MathType> {
        if let Some(name) = original.as_named() {
            return self.canonicalize_named(original, name);
        }
        let Some(u) = original.as_big_union() else {
            return Ok(rebuilt);
        };
        for variable in u.variables().keys() {
            if self.scopes.innermost_annotation(variable, LAST_REPLACE).is_none() {
                bail!("Universal type variable \"{variable}\" is not concretely bound.");
            }
        }
        self.scopes.pop();
        rebuilt
            .as_big_union()
            .map(|u| u.body().clone())
            .ok_or_else(|| anyhow!("big union lost its shape while canonicalizing"))
    }
}
