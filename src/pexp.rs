//! Proof expressions: the symbol trees the prover rewrites.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::bind::{BindingError, TypedArgument};
use crate::env::Quantification;
use crate::graph::TypeGraph;
use crate::mtype::{IndexOutOfBounds, MathType, Name};

static INFIX_OPERATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-+*/<>=≤≥≠∘^~:|&]+|and|or|implies|iff|mod)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayStyle {
    Prefix,
    Infix,
}

#[derive(Clone)]
pub struct PExp(Arc<PExpNode>);

struct PExpNode {
    name: Name,
    args: Vec<PExp>,
    quantification: Quantification,
    style: DisplayStyle,
    ty: MathType,
    type_value: Option<MathType>,
    hash: u64,
}

impl PExp {
    fn build(
        name: Name,
        args: Vec<PExp>,
        quantification: Quantification,
        ty: MathType,
        type_value: Option<MathType>,
    ) -> PExp {
        let style = if args.len() == 2 && INFIX_OPERATOR.is_match(name.as_str()) {
            DisplayStyle::Infix
        } else {
            DisplayStyle::Prefix
        };
        let mut hasher = DefaultHasher::new();
        name.as_str().hash(&mut hasher);
        quantification.hash(&mut hasher);
        for arg in &args {
            hasher.write_u64(arg.0.hash);
        }
        PExp(Arc::new(PExpNode {
            name,
            args,
            quantification,
            style,
            ty,
            type_value,
            hash: hasher.finish(),
        }))
    }

    pub fn new(name: impl Into<Name>, args: Vec<PExp>, ty: MathType) -> PExp {
        PExp::build(name.into(), args, Quantification::None, ty, None)
    }

    pub fn symbol(name: impl Into<Name>, ty: MathType) -> PExp {
        PExp::new(name, vec![], ty)
    }

    pub fn variable(name: impl Into<Name>, ty: MathType, quantification: Quantification) -> PExp {
        PExp::build(name.into(), vec![], quantification, ty, None)
    }

    pub fn with_quantification(&self, quantification: Quantification) -> PExp {
        PExp::build(
            self.0.name.clone(),
            self.0.args.clone(),
            quantification,
            self.0.ty.clone(),
            self.0.type_value.clone(),
        )
    }

    /// Marks this expression as denoting the type `value`.
    pub fn with_type_value(&self, value: MathType) -> PExp {
        PExp::build(
            self.0.name.clone(),
            self.0.args.clone(),
            self.0.quantification,
            self.0.ty.clone(),
            Some(value),
        )
    }

    pub fn true_exp(g: &TypeGraph) -> PExp {
        PExp::symbol("true", g.boolean.clone())
    }

    pub fn false_exp(g: &TypeGraph) -> PExp {
        PExp::symbol("false", g.boolean.clone())
    }

    pub fn equals(g: &TypeGraph, left: PExp, right: PExp) -> PExp {
        PExp::new("=", vec![left, right], g.boolean.clone())
    }

    pub fn and(g: &TypeGraph, left: PExp, right: PExp) -> PExp {
        PExp::new("and", vec![left, right], g.boolean.clone())
    }

    pub fn implies(g: &TypeGraph, left: PExp, right: PExp) -> PExp {
        PExp::new("implies", vec![left, right], g.boolean.clone())
    }

    pub fn name(&self) -> &Name {
        &self.0.name
    }

    pub fn args(&self) -> &[PExp] {
        &self.0.args
    }

    pub fn quantification(&self) -> Quantification {
        self.0.quantification
    }

    pub fn style(&self) -> DisplayStyle {
        self.0.style
    }

    pub fn math_type(&self) -> &MathType {
        &self.0.ty
    }

    pub fn type_value(&self) -> Option<&MathType> {
        self.0.type_value.as_ref()
    }

    pub fn hash_value(&self) -> u64 {
        self.0.hash
    }

    pub fn ptr_eq(&self, other: &PExp) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_quantified(&self) -> bool {
        self.0.quantification != Quantification::None
    }

    /// A quantified symbol without arguments.
    pub fn is_variable(&self) -> bool {
        self.is_quantified() && self.0.args.is_empty()
    }

    /// The operator symbol alone, as it would be bound for a quantified
    /// function.
    fn head(&self) -> PExp {
        if self.0.args.is_empty() {
            return self.clone();
        }
        PExp::build(self.0.name.clone(), vec![], self.0.quantification, self.0.ty.clone(), None)
    }

    fn with_args(&self, args: Vec<PExp>) -> PExp {
        PExp::build(
            self.0.name.clone(),
            args,
            self.0.quantification,
            self.0.ty.clone(),
            self.0.type_value.clone(),
        )
    }

    pub fn substitute(&self, substitutions: &HashMap<PExp, PExp>) -> PExp {
        if substitutions.is_empty() {
            return self.clone();
        }
        if let Some(replacement) = substitutions.get(self) {
            return replacement.clone();
        }
        if self.0.args.is_empty() {
            return self.clone();
        }
        let args: Vec<PExp> = self.0.args.iter().map(|a| a.substitute(substitutions)).collect();
        let renamed = substitutions.get(&self.head()).filter(|r| r.0.args.is_empty());
        let unchanged = args.iter().zip(&self.0.args).all(|(a, b)| a.ptr_eq(b));
        match renamed {
            Some(head) => PExp::build(
                head.0.name.clone(),
                args,
                head.0.quantification,
                self.0.ty.clone(),
                self.0.type_value.clone(),
            ),
            None if unchanged => self.clone(),
            None => self.with_args(args),
        }
    }

    /// Extends `acc` so that `self` with `acc` substituted equals `target`.
    /// Universally quantified symbols bind; everything else must match by
    /// name and arity with compatible types.
    pub fn bind_to(
        &self,
        target: &PExp,
        g: &TypeGraph,
        acc: &mut HashMap<PExp, PExp>,
    ) -> Result<(), BindingError> {
        if self.0.quantification == Quantification::Universal {
            if !g.is_subtype(target.math_type(), self.math_type()) {
                return Err(BindingError::mismatch(self, target));
            }
            if self.0.args.is_empty() {
                return bind_one(acc, self.clone(), target.clone());
            }
            if self.0.args.len() != target.0.args.len() {
                return Err(BindingError::mismatch(self, target));
            }
            bind_one(acc, self.head(), target.head())?;
        } else {
            let compatible = g.is_subtype(self.math_type(), target.math_type())
                || g.is_subtype(target.math_type(), self.math_type());
            if !compatible
                || self.0.name != target.0.name
                || self.0.quantification != target.0.quantification
                || self.0.args.len() != target.0.args.len()
            {
                return Err(BindingError::mismatch(self, target));
            }
        }
        for (pattern, value) in self.0.args.iter().zip(&target.0.args) {
            pattern.substitute(acc).bind_to(value, g, acc)?;
        }
        Ok(())
    }

    /// Names of the unquantified symbols, operators included.
    pub fn symbol_names(&self) -> BTreeSet<Name> {
        let mut names = BTreeSet::new();
        self.visit_preorder(&mut |e| {
            if !e.is_quantified() {
                names.insert(e.0.name.clone());
            }
        });
        names
    }

    /// Quantified symbols in order of first occurrence.
    pub fn quantified_variables(&self) -> Vec<PExp> {
        let mut seen = HashSet::new();
        let mut result = vec![];
        self.visit_preorder(&mut |e| {
            if e.is_quantified() {
                let head = e.head();
                if seen.insert(head.clone()) {
                    result.push(head);
                }
            }
        });
        result
    }

    pub fn function_applications(&self) -> Vec<PExp> {
        let mut result = vec![];
        self.visit_preorder(&mut |e| {
            if !e.0.args.is_empty() {
                result.push(e.clone());
            }
        });
        result
    }

    pub fn contains_existential(&self) -> bool {
        self.0.quantification == Quantification::Existential
            || self.0.args.iter().any(PExp::contains_existential)
    }

    pub fn split_into_conjuncts(&self) -> Vec<PExp> {
        let mut result = vec![];
        self.collect_conjuncts(&mut result);
        result
    }

    fn collect_conjuncts(&self, acc: &mut Vec<PExp>) {
        if self.0.name.as_str() == "and" && self.0.args.len() == 2 {
            self.0.args[0].collect_conjuncts(acc);
            self.0.args[1].collect_conjuncts(acc);
        } else {
            acc.push(self.clone());
        }
    }

    pub fn flip_quantifiers(&self) -> PExp {
        PExp::build(
            self.0.name.clone(),
            self.0.args.iter().map(PExp::flip_quantifiers).collect(),
            self.0.quantification.flipped(),
            self.0.ty.clone(),
            self.0.type_value.clone(),
        )
    }

    pub fn is_equality(&self) -> bool {
        self.0.name.as_str() == "=" && self.0.args.len() == 2
    }

    pub fn is_obviously_true(&self) -> bool {
        (self.0.name.as_str() == "true" && self.0.args.is_empty())
            || (self.is_equality() && self.0.args[0] == self.0.args[1])
    }

    /// Every sub-expression with its argument-index path from the root, the
    /// root itself first.
    pub fn sub_expressions(&self) -> Vec<(Vec<usize>, PExp)> {
        let mut result = vec![];
        let mut path = vec![];
        self.collect_sub_expressions(&mut path, &mut result);
        result
    }

    fn collect_sub_expressions(&self, path: &mut Vec<usize>, acc: &mut Vec<(Vec<usize>, PExp)>) {
        acc.push((path.clone(), self.clone()));
        for (i, arg) in self.0.args.iter().enumerate() {
            path.push(i);
            arg.collect_sub_expressions(path, acc);
            path.pop();
        }
    }

    pub fn with_site_altered(&self, path: &[usize], replacement: PExp) -> Result<PExp, IndexOutOfBounds> {
        let Some((&index, rest)) = path.split_first() else {
            return Ok(replacement);
        };
        let arity = self.0.args.len();
        let child = self.0.args.get(index).ok_or(IndexOutOfBounds { index, arity })?;
        let mut args = self.0.args.clone();
        args[index] = child.with_site_altered(rest, replacement)?;
        Ok(self.with_args(args))
    }

    fn visit_preorder(&self, f: &mut impl FnMut(&PExp)) {
        f(self);
        for arg in &self.0.args {
            arg.visit_preorder(f);
        }
    }
}

fn bind_one(acc: &mut HashMap<PExp, PExp>, key: PExp, value: PExp) -> Result<(), BindingError> {
    match acc.get(&key) {
        Some(existing) if *existing != value => Err(BindingError::Inconsistent(key.0.name.clone())),
        Some(_) => Ok(()),
        None => {
            acc.insert(key, value);
            Ok(())
        }
    }
}

impl PartialEq for PExp {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
            || (self.0.hash == other.0.hash
                && self.0.name == other.0.name
                && self.0.quantification == other.0.quantification
                && self.0.args == other.0.args)
    }
}

impl Eq for PExp {}

impl Hash for PExp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}

impl Display for PExp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arg = |f: &mut std::fmt::Formatter<'_>, a: &PExp| {
            if a.0.style == DisplayStyle::Infix {
                write!(f, "({a})")
            } else {
                write!(f, "{a}")
            }
        };
        match (self.0.style, self.0.args.as_slice()) {
            (DisplayStyle::Infix, [left, right]) => {
                arg(f, left)?;
                write!(f, " {} ", self.0.name)?;
                arg(f, right)
            }
            (_, []) => write!(f, "{}", self.0.name),
            (_, args) => {
                write!(f, "{}(", self.0.name)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl std::fmt::Debug for PExp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.quantification {
            Quantification::Universal => write!(f, "∀{self}"),
            Quantification::Existential => write!(f, "∃{self}"),
            Quantification::None => write!(f, "{self}"),
        }
    }
}

impl TypedArgument for PExp {
    fn math_type(&self) -> &MathType {
        &self.0.ty
    }

    fn math_type_value(&self) -> Option<&MathType> {
        self.0.type_value.as_ref()
    }
}
