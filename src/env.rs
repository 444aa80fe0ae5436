//! The symbol environment the type engine queries for names it cannot
//! resolve locally.

use std::collections::HashMap;

use thiserror::Error;

use crate::mtype::{MathType, Name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quantification {
    Universal,
    Existential,
    #[default]
    None,
}

impl Quantification {
    pub fn flipped(self) -> Quantification {
        match self {
            Quantification::Universal => Quantification::Existential,
            Quantification::Existential => Quantification::Universal,
            Quantification::None => Quantification::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MathSymbol {
    pub name: Name,
    pub ty: MathType,
    pub quantification: Quantification,
    pub type_value: Option<MathType>,
}

#[derive(Debug, Clone)]
pub enum SymbolEntry {
    Math(MathSymbol),
    /// Program-level entries (operations, facilities, ...) the type engine
    /// never reasons about.
    Other(Name),
}

impl SymbolEntry {
    pub fn name(&self) -> &Name {
        match self {
            SymbolEntry::Math(symbol) => &symbol.name,
            SymbolEntry::Other(name) => name,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("no such symbol: {0}")]
    NoSuchSymbol(Name),
    #[error("duplicate symbols found: {0}")]
    DuplicateSymbol(Name),
}

pub trait SymbolEnvironment {
    /// Looks up exactly one entry by its unqualified name.
    fn query_by_name(&self, name: &Name) -> Result<SymbolEntry, QueryError>;
}

#[derive(Debug, Clone, Default)]
pub struct MapEnvironment {
    entries: HashMap<Name, Vec<SymbolEntry>>,
}

impl MapEnvironment {
    pub fn new() -> MapEnvironment {
        MapEnvironment::default()
    }

    pub fn add(&mut self, entry: SymbolEntry) {
        self.entries.entry(entry.name().clone()).or_default().push(entry);
    }

    pub fn with_math(
        mut self,
        name: impl Into<Name>,
        ty: MathType,
        quantification: Quantification,
    ) -> MapEnvironment {
        self.add(SymbolEntry::Math(MathSymbol {
            name: name.into(),
            ty,
            quantification,
            type_value: None,
        }));
        self
    }
}

impl SymbolEnvironment for MapEnvironment {
    fn query_by_name(&self, name: &Name) -> Result<SymbolEntry, QueryError> {
        match self.entries.get(name).map(Vec::as_slice) {
            None | Some([]) => Err(QueryError::NoSuchSymbol(name.clone())),
            Some([entry]) => Ok(entry.clone()),
            Some(_) => Err(QueryError::DuplicateSymbol(name.clone())),
        }
    }
}
