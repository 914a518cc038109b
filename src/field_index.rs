//! Field naming: header normalization, aliases and include projection.

use std::fmt;
use std::sync::Arc;

use foldhash::{HashMap, HashMapExt, HashSet, HashSetExt};

use crate::error::{CsvError, Result};

/// Header-name normalization hook, applied before alias lookup.
pub type Normalizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// How header names map onto the fields of produced rows.
#[derive(Clone, Default)]
pub struct FieldMapping {
    /// Alias table keyed by lowercased header name.
    aliases: HashMap<String, String>,
    normalizer: Option<Normalizer>,
    include: Option<Vec<String>>,
}

impl fmt::Debug for FieldMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMapping")
            .field("aliases", &self.aliases)
            .field("normalizer", &self.normalizer.as_ref().map(|_| "<fn>"))
            .field("include", &self.include)
            .finish()
    }
}

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename header `from` (matched case-insensitively) to `to`.
    pub fn alias(&mut self, from: &str, to: &str) -> &mut Self {
        self.aliases.insert(from.to_lowercase(), to.to_owned());
        self
    }

    /// Apply `normalizer` to every header name before alias lookup.
    pub fn normalizer<F>(&mut self, normalizer: F) -> &mut Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.normalizer = Some(Arc::new(normalizer));
        self
    }

    /// Keep only these fields, in this order.
    pub fn include<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Returns true when no renaming or projection is configured.
    pub fn is_identity(&self) -> bool {
        self.aliases.is_empty() && self.normalizer.is_none() && self.include.is_none()
    }

    /// Final name for a raw header name.
    fn resolve(&self, raw: &str) -> String {
        let normalized = match &self.normalizer {
            Some(normalize) => normalize(raw),
            None => raw.to_owned(),
        };
        match self.aliases.get(&normalized.to_lowercase()) {
            Some(alias) => alias.clone(),
            None => normalized,
        }
    }
}

/// Resolved field names of a source and the columns they come from.
///
/// Built once per source and shared by every row through an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIndex {
    names: Vec<String>,
    /// Source column of each output field.
    sources: Vec<usize>,
    lookup: HashMap<String, usize>,
    projected: bool,
}

impl FieldIndex {
    /// Build the index for a header row.
    ///
    /// Fails when two header names resolve to the same field, or when an
    /// included field is not present.
    pub fn build<S: AsRef<str>>(header: &[S], mapping: &FieldMapping) -> Result<Self> {
        let mut names = Vec::with_capacity(header.len());
        let mut lookup = HashMap::with_capacity(header.len());
        for (column, raw) in header.iter().enumerate() {
            let name = mapping.resolve(raw.as_ref().trim());
            if lookup.insert(name.clone(), column).is_some() {
                return Err(CsvError::DuplicateField(name));
            }
            names.push(name);
        }

        let Some(include) = &mapping.include else {
            return Ok(Self {
                sources: (0..names.len()).collect(),
                names,
                lookup,
                projected: false,
            });
        };

        let mut seen = HashSet::with_capacity(include.len());
        let mut sources = Vec::with_capacity(include.len());
        for name in include {
            if !seen.insert(name.as_str()) {
                return Err(CsvError::DuplicateField(name.clone()));
            }
            let column = lookup
                .get(name)
                .copied()
                .ok_or_else(|| CsvError::MissingField(name.clone()))?;
            sources.push(column);
        }
        let lookup = include
            .iter()
            .enumerate()
            .map(|(pos, name)| (name.clone(), pos))
            .collect();

        Ok(Self {
            names: include.clone(),
            sources,
            lookup,
            projected: true,
        })
    }

    /// Build the index for a source without a header row, naming the
    /// columns `field_1`, `field_2`, ...
    pub fn generated(width: usize, mapping: &FieldMapping) -> Result<Self> {
        let header: Vec<String> = (1..=width).map(|i| format!("field_{i}")).collect();
        Self::build(&header, mapping)
    }

    /// Field names in output order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Output position of the field called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    /// Number of named fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns true when an include list selects and reorders fields.
    #[inline]
    pub fn is_projected(&self) -> bool {
        self.projected
    }

    /// Source column the output field at `position` is read from.
    pub fn source_column(&self, position: usize) -> Option<usize> {
        self.sources.get(position).copied()
    }

    /// Shape raw column values into output order.
    ///
    /// Without an include list, short rows are padded with `None` and
    /// values beyond the header are kept. With one, only the included
    /// columns are returned, in include order.
    pub fn project(&self, mut values: Vec<Option<String>>) -> Vec<Option<String>> {
        if self.projected {
            return self
                .sources
                .iter()
                .map(|&column| values.get_mut(column).and_then(Option::take))
                .collect();
        }
        if values.len() < self.names.len() {
            values.resize(self.names.len(), None);
        }
        values
    }
}
