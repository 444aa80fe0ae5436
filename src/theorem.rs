use std::fmt::Display;
use std::sync::Arc;

use easy_ext::ext;

use crate::pexp::PExp;
use crate::transform::{
    ExpandAntecedentByImplication, ExpandAntecedentBySubstitution, StrengthenConsequent,
    SubstituteInPlaceInAntecedent, SubstituteInPlaceInConsequent, Transformation,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Justification {
    Given,
    Library,
    Axiom,
    /// Derived during the proof by the named transformation.
    Derived(String),
}

impl Display for Justification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Justification::Given => write!(f, "given"),
            Justification::Library => write!(f, "library"),
            Justification::Axiom => write!(f, "axiom"),
            Justification::Derived(by) => write!(f, "by {by}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theorem {
    pub assertion: PExp,
    pub justification: Justification,
}

impl Theorem {
    pub fn new(assertion: PExp, justification: Justification) -> Theorem {
        Theorem { assertion, justification }
    }

    /// The rewrites this theorem licenses.
    ///
    /// `l = r` substitutes in both directions on both sides and expands the
    /// antecedent with `r` wherever `l` occurs. `A implies C` expands the
    /// antecedent with `C` once `A` is known and strengthens a consequent `C`
    /// into `A`. Anything else discharges consequents it matches.
    pub fn transformations(&self) -> Vec<Arc<dyn Transformation>> {
        let assertion = &self.assertion;
        if assertion.is_equality() {
            let (l, r) = (&assertion.args()[0], &assertion.args()[1]);
            return vec![
                Arc::new(SubstituteInPlaceInConsequent::new(self.clone(), l.clone(), r.clone())),
                Arc::new(SubstituteInPlaceInConsequent::new(self.clone(), r.clone(), l.clone())),
                Arc::new(SubstituteInPlaceInAntecedent::new(self.clone(), l.clone(), r.clone())),
                Arc::new(SubstituteInPlaceInAntecedent::new(self.clone(), r.clone(), l.clone())),
                Arc::new(ExpandAntecedentBySubstitution::new(self.clone(), l.clone(), r.clone())),
            ];
        }
        if assertion.name().as_str() == "implies" && assertion.args().len() == 2 {
            let antecedents = assertion.args()[0].split_into_conjuncts();
            let consequent = assertion.args()[1].clone();
            return vec![
                Arc::new(ExpandAntecedentByImplication::new(
                    self.clone(),
                    antecedents.clone(),
                    consequent.clone(),
                )),
                Arc::new(StrengthenConsequent::new(self.clone(), antecedents, consequent)),
            ];
        }
        vec![Arc::new(StrengthenConsequent::new(self.clone(), vec![], assertion.clone()))]
    }
}

impl Display for Theorem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.assertion)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTheorem {
    pub assertion: PExp,
    pub justification: Justification,
    /// Added while working towards a particular consequent.
    pub trying_to_prove: bool,
}

impl LocalTheorem {
    pub fn given(assertion: PExp) -> LocalTheorem {
        LocalTheorem {
            assertion,
            justification: Justification::Given,
            trying_to_prove: false,
        }
    }
}

/// A verification condition: the antecedent implies the consequent.
#[derive(Debug, Clone)]
pub struct Vc {
    pub name: String,
    pub antecedent: Vec<PExp>,
    pub consequent: Vec<PExp>,
    pub derived: bool,
}

impl Vc {
    /// Conjunctions on either side are split, so no stored conjunct is itself
    /// an `and`.
    pub fn new(name: impl Into<String>, antecedent: &[PExp], consequent: &[PExp]) -> Vc {
        Vc {
            name: name.into(),
            antecedent: antecedent.iter().flat_map(PExp::split_into_conjuncts).collect(),
            consequent: consequent.iter().flat_map(PExp::split_into_conjuncts).collect(),
            derived: false,
        }
    }
}

impl Display for Vc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:\n{}\n  -->\n{}",
            self.name,
            self.antecedent.joined(" and\n"),
            self.consequent.joined(" and\n")
        )
    }
}

#[ext(ConjunctsExt)]
pub impl [PExp] {
    fn joined(&self, separator: &str) -> String {
        self.iter().map(ToString::to_string).collect::<Vec<_>>().join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Quantification;
    use crate::graph::TypeGraph;

    #[test]
    fn vc_splits_conjunctions() {
        let g = TypeGraph::new();
        let x = PExp::symbol("x", g.z.clone());
        let y = PExp::symbol("y", g.z.clone());
        let both = PExp::and(&g, PExp::equals(&g, x.clone(), y.clone()), PExp::true_exp(&g));
        let vc = Vc::new("0_1", &[both], &[PExp::equals(&g, y, x)]);
        assert_eq!(vc.antecedent.len(), 2);
        insta::assert_snapshot!(vc, @r"
        0_1:
        x = y and
        true
          -->
        y = x
        ");
    }

    #[test]
    fn transformation_kinds_follow_the_assertion_shape() {
        let g = TypeGraph::new();
        let i = PExp::variable("i", g.z.clone(), Quantification::Universal);
        let zero = PExp::symbol("0", g.z.clone());
        let sum = PExp::new("+", vec![i.clone(), zero], g.z.clone());
        let identity = Theorem::new(PExp::equals(&g, sum, i.clone()), Justification::Library);
        assert_eq!(identity.transformations().len(), 5);

        let p = PExp::new("P", vec![i.clone()], g.boolean.clone());
        let q = PExp::new("Q", vec![i], g.boolean.clone());
        let implication = Theorem::new(PExp::implies(&g, p.clone(), q), Justification::Axiom);
        let kinds: Vec<bool> = implication
            .transformations()
            .iter()
            .map(|t| t.could_affect_antecedent())
            .collect();
        assert_eq!(kinds, vec![true, false]);

        let fact = Theorem::new(p, Justification::Axiom);
        assert_eq!(fact.transformations().len(), 1);
    }
}
