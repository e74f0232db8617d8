//! Duplicate removal by perceptual hash.

use super::columns::{self, ColumnSpec, HASH, MODIFIED_TIME, RESOLUTION};
use super::Comparable;
use crate::core::cache::{CacheKey, Projection, Value};
use crate::core::hasher::HashAlgorithmKind;
use crate::error::FilterError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

/// Policy picking the one photo to keep among equal hashes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolver {
    /// Latest modification time
    Newest,
    /// Earliest modification time
    Oldest,
    /// Most pixels
    Largest,
    /// Fewest pixels
    Smallest,
}

impl Resolver {
    pub const ALL: [Resolver; 4] = [
        Resolver::Newest,
        Resolver::Oldest,
        Resolver::Largest,
        Resolver::Smallest,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Resolver::Newest => "newest",
            Resolver::Oldest => "oldest",
            Resolver::Largest => "largest",
            Resolver::Smallest => "smallest",
        }
    }

    /// The column the ranking is read from
    pub fn column(&self) -> ColumnSpec {
        match self {
            Resolver::Newest | Resolver::Oldest => columns::modified_time(),
            Resolver::Largest | Resolver::Smallest => columns::resolution(),
        }
    }

    fn rank(&self, values: &BTreeMap<String, Value>) -> Option<Value> {
        match self {
            Resolver::Newest | Resolver::Oldest => values.get(MODIFIED_TIME).cloned(),
            Resolver::Largest | Resolver::Smallest => match values.get(RESOLUTION)? {
                Value::IntPair(width, height) => Some(Value::Integer(width.saturating_mul(*height))),
                _ => None,
            },
        }
    }

    /// The ordering a challenger's rank must have against the incumbent's to win
    fn winning_order(&self) -> Ordering {
        match self {
            Resolver::Newest | Resolver::Largest => Ordering::Greater,
            Resolver::Oldest | Resolver::Smallest => Ordering::Less,
        }
    }

    /// Whether `challenger` strictly beats `incumbent`.
    ///
    /// A rank beats no rank; equal or incomparable ranks don't win.
    fn beats(&self, challenger: Option<&Value>, incumbent: Option<&Value>) -> bool {
        match (challenger, incumbent) {
            (Some(_), None) => true,
            (None, _) => false,
            (Some(c), Some(i)) => c.compare(i) == Some(self.winning_order()),
        }
    }
}

impl FromStr for Resolver {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resolver::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| FilterError::InvalidChoice {
                parameter: "resolver",
                value: s.to_string(),
                expected: Resolver::ALL
                    .iter()
                    .map(Resolver::name)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl std::fmt::Display for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Keeps one photo per perceptual hash.
///
/// The winner of each hash group is chosen among every cached photo
/// with that hash, not only the candidates, so a candidate whose better
/// duplicate lives elsewhere in the cache is dropped. Photos whose hash
/// couldn't be computed are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashFilter {
    algorithm: HashAlgorithmKind,
    resolver: Resolver,
}

impl HashFilter {
    /// Build from user-facing names, e.g. `("gradient", "newest")`
    pub fn new(algorithm: &str, resolver: &str) -> Result<Self, FilterError> {
        Ok(Self::with(algorithm.parse()?, resolver.parse()?))
    }

    pub fn with(algorithm: HashAlgorithmKind, resolver: Resolver) -> Self {
        Self {
            algorithm,
            resolver,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithmKind {
        self.algorithm
    }

    pub fn resolver(&self) -> Resolver {
        self.resolver
    }

    pub fn columns(&self) -> Vec<ColumnSpec> {
        vec![columns::hash(self.algorithm), self.resolver.column()]
    }
}

impl Comparable for HashFilter {
    fn survivors(
        &self,
        candidates: &BTreeSet<CacheKey>,
        projection: &Projection,
    ) -> BTreeSet<CacheKey> {
        // Projection iterates in key order, so keeping the incumbent on
        // ties hands them to the smallest key.
        let mut winners: BTreeMap<&str, (&CacheKey, Option<Value>)> = BTreeMap::new();
        for (key, values) in projection.iter() {
            let Some(hash) = values.get(HASH).and_then(Value::as_text) else {
                continue;
            };
            let rank = self.resolver.rank(values);
            let replace = match winners.get(hash) {
                Some((_, incumbent)) => self.resolver.beats(rank.as_ref(), incumbent.as_ref()),
                None => true,
            };
            if replace {
                winners.insert(hash, (key, rank));
            }
        }

        candidates
            .iter()
            .filter(|key| match projection.value(key, HASH).and_then(Value::as_text) {
                Some(hash) => winners.get(hash).is_some_and(|(winner, _)| winner == key),
                None => true,
            })
            .cloned()
            .collect()
    }
}
