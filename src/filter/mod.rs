//! Selection constraints and their compiled form.
//!
//! `FilterOptions` is the user-facing option set. `compile` turns it into a
//! backend-agnostic predicate tree plus a list of count filters; the storage
//! layer renders both into its own query language.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

use crate::error::{MixError, MixResult};

/// Attribute a predicate leaf refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    PublicDomain,
    PostId,
    PostDate,
    /// Crop-scoped: a post matches when at least one of its crops does.
    CropText,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Text(String),
    Timestamp(NaiveDateTime),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Ge,
    Le,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        }
    }

    pub fn holds(&self, lhs: i64, rhs: i64) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Le => lhs <= rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        field: Field,
        op: CompareOp,
        value: Value,
    },
    In {
        field: Field,
        values: Vec<Value>,
    },
    /// Case-insensitive substring match.
    Contains {
        field: Field,
        pattern: String,
    },
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn compare(field: Field, op: CompareOp, value: Value) -> Self {
        Predicate::Compare { field, op, value }
    }

    pub fn is_in(field: Field, values: Vec<Value>) -> Self {
        Predicate::In { field, values }
    }

    pub fn contains(field: Field, pattern: impl Into<String>) -> Self {
        Predicate::Contains {
            field,
            pattern: pattern.into(),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }

    /// Conjunction that keeps the tree flat.
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), right) => {
                left.push(right);
                Predicate::And(left)
            }
            (left, Predicate::And(mut right)) => {
                right.insert(0, left);
                Predicate::And(right)
            }
            (left, right) => Predicate::And(vec![left, right]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Or(mut left), right) => {
                left.push(right);
                Predicate::Or(left)
            }
            (left, right) => Predicate::Or(vec![left, right]),
        }
    }
}

/// Stack `new` onto an optional accumulated predicate.
pub fn stack(acc: Option<Predicate>, new: Predicate) -> Option<Predicate> {
    Some(match acc {
        Some(acc) => acc.and(new),
        None => new,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountDimension {
    /// Number of pictures in a post.
    Pictures,
    /// Number of crops in at least one picture of a post.
    Crops,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountFilter {
    pub dimension: CountDimension,
    pub op: CompareOp,
    pub value: u32,
}

impl CountFilter {
    pub fn pictures(op: CompareOp, value: u32) -> Self {
        Self {
            dimension: CountDimension::Pictures,
            op,
            value,
        }
    }

    pub fn crops(op: CompareOp, value: u32) -> Self {
        Self {
            dimension: CountDimension::Crops,
            op,
            value,
        }
    }
}

/// Output of the filter compiler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    pub predicate: Option<Predicate>,
    pub picture_counts: Vec<CountFilter>,
    pub crop_counts: Vec<CountFilter>,
}

impl CompiledFilter {
    /// Picture-count filters followed by crop-count filters.
    pub fn all_counts(&self) -> Vec<CountFilter> {
        self.picture_counts
            .iter()
            .chain(self.crop_counts.iter())
            .copied()
            .collect()
    }
}

/// User-chosen selection constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_publics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_publics: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_posts: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_posts: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_date: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_date: Option<NaiveDateTime>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub include_text: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_text: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_pics: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_pics: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pics: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_crops: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_crops: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_crops: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<OneOrMany>::deserialize(deserializer)?;
    Ok(value.map(|v| match v {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    }))
}

/// Compile options into a predicate tree and count filters.
pub fn compile(options: &FilterOptions) -> MixResult<CompiledFilter> {
    validate(options)?;

    let mut predicate = None;

    if let Some(publics) = &options.include_publics {
        predicate = stack(predicate, Predicate::is_in(Field::PublicDomain, texts(publics)));
    }
    if let Some(publics) = &options.exclude_publics {
        if !publics.is_empty() {
            predicate = stack(
                predicate,
                Predicate::is_in(Field::PublicDomain, texts(publics)).negate(),
            );
        }
    }
    if let Some(posts) = &options.include_posts {
        predicate = stack(predicate, Predicate::is_in(Field::PostId, ints(posts)));
    }
    if let Some(posts) = &options.exclude_posts {
        if !posts.is_empty() {
            predicate = stack(
                predicate,
                Predicate::is_in(Field::PostId, ints(posts)).negate(),
            );
        }
    }
    if let Some(from) = options.from_date {
        predicate = stack(
            predicate,
            Predicate::compare(Field::PostDate, CompareOp::Ge, Value::Timestamp(from)),
        );
    }
    if let Some(to) = options.to_date {
        predicate = stack(
            predicate,
            Predicate::compare(Field::PostDate, CompareOp::Le, Value::Timestamp(to)),
        );
    }
    for pattern in options.include_text.iter().flatten() {
        predicate = stack(predicate, Predicate::contains(Field::CropText, pattern));
    }
    for pattern in options.exclude_text.iter().flatten() {
        predicate = stack(
            predicate,
            Predicate::contains(Field::CropText, pattern).negate(),
        );
    }

    let picture_counts = count_filters(
        CountDimension::Pictures,
        options.exact_pics,
        options.min_pics,
        options.max_pics,
    );
    let crop_counts = count_filters(
        CountDimension::Crops,
        options.exact_crops,
        options.min_crops,
        options.max_crops,
    );

    Ok(CompiledFilter {
        predicate,
        picture_counts,
        crop_counts,
    })
}

fn count_filters(
    dimension: CountDimension,
    exact: Option<u32>,
    min: Option<u32>,
    max: Option<u32>,
) -> Vec<CountFilter> {
    let mut filters = Vec::new();
    let candidates = [(exact, CompareOp::Eq), (min, CompareOp::Ge), (max, CompareOp::Le)];
    for (value, op) in candidates {
        if let Some(value) = value {
            filters.push(CountFilter {
                dimension,
                op,
                value,
            });
        }
    }
    filters
}

fn texts(values: &[String]) -> Vec<Value> {
    values.iter().cloned().map(Value::Text).collect()
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
}

fn validate(options: &FilterOptions) -> MixResult<()> {
    if matches!(&options.include_publics, Some(v) if v.is_empty()) {
        return Err(MixError::invalid_argument("include_publics is empty"));
    }
    if matches!(&options.include_posts, Some(v) if v.is_empty()) {
        return Err(MixError::invalid_argument("include_posts is empty"));
    }
    if let (Some(include), Some(exclude)) = (&options.include_publics, &options.exclude_publics) {
        let include: HashSet<&String> = include.iter().collect();
        if let Some(both) = exclude.iter().find(|d| include.contains(d)) {
            return Err(MixError::invalid_argument(format!(
                "public {both} is both included and excluded"
            )));
        }
    }
    if let (Some(include), Some(exclude)) = (&options.include_posts, &options.exclude_posts) {
        let include: HashSet<&i64> = include.iter().collect();
        if let Some(both) = exclude.iter().find(|id| include.contains(id)) {
            return Err(MixError::invalid_argument(format!(
                "post {both} is both included and excluded"
            )));
        }
    }
    if let (Some(from), Some(to)) = (options.from_date, options.to_date) {
        if from > to {
            return Err(MixError::invalid_argument(format!(
                "from_date {from} is after to_date {to}"
            )));
        }
    }
    let patterns = options
        .include_text
        .iter()
        .flatten()
        .chain(options.exclude_text.iter().flatten());
    for pattern in patterns {
        if pattern.is_empty() {
            return Err(MixError::invalid_argument("empty text pattern"));
        }
    }
    check_range("pics", options.exact_pics, options.min_pics, options.max_pics)?;
    check_range("crops", options.exact_crops, options.min_crops, options.max_crops)?;
    Ok(())
}

fn check_range(name: &str, exact: Option<u32>, min: Option<u32>, max: Option<u32>) -> MixResult<()> {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(MixError::invalid_argument(format!(
                "min_{name} ({min}) is greater than max_{name} ({max})"
            )));
        }
    }
    if let Some(exact) = exact {
        if min.is_some_and(|min| exact < min) || max.is_some_and(|max| exact > max) {
            return Err(MixError::invalid_argument(format!(
                "exact_{name} ({exact}) is outside the min/max range"
            )));
        }
    }
    Ok(())
}
