use std::borrow::Cow;
use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use crate::fields::map_field;
use crate::record::FieldRef;
use crate::{Error, Field, Metadata, MetadataStore, Result};

/// Accepted date spellings, tried in order; the first that parses wins.
/// `DD.MM.YYYY` is tried before `MM/DD/YYYY`, so ambiguous day/month input
/// is resolved by separator, not by content.
pub const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d.%m.%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Equals,
    Contains,
    /// Alias of `Equals`.
    In,
    Greater,
    Less,
    Unknown(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    #[default]
    Include,
    Exclude,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Logic {
    #[default]
    And,
    Or,
}

/// One `(field, operator, value, action)` condition.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Criterion {
    pub metadata: String,
    pub operator: Operator,
    pub value: String,
    #[serde(default)]
    pub action: Action,
}

/// Criteria with explicit grouping. A flat list plus [`Logic`] maps onto a
/// single `And`/`Or` node via [`FilterExpr::from_criteria`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterExpr {
    Leaf(Criterion),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

impl From<String> for Operator {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "equals" => Operator::Equals,
            "contains" => Operator::Contains,
            "in" => Operator::In,
            "greater" => Operator::Greater,
            "less" => Operator::Less,
            _ => Operator::Unknown(value),
        }
    }
}

impl From<Operator> for String {
    fn from(value: Operator) -> Self {
        match value {
            Operator::Equals => "equals".into(),
            Operator::Contains => "contains".into(),
            Operator::In => "in".into(),
            Operator::Greater => "greater".into(),
            Operator::Less => "less".into(),
            Operator::Unknown(s) => s,
        }
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("exclude") {
            Action::Exclude
        } else {
            Action::Include
        }
    }
}

impl From<Action> for String {
    fn from(value: Action) -> Self {
        match value {
            Action::Include => "include".into(),
            Action::Exclude => "exclude".into(),
        }
    }
}

impl From<&str> for Logic {
    fn from(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("or") {
            Logic::Or
        } else {
            Logic::And
        }
    }
}

impl From<String> for Logic {
    fn from(value: String) -> Self {
        Logic::from(value.as_str())
    }
}

impl From<Logic> for String {
    fn from(value: Logic) -> Self {
        match value {
            Logic::And => "and".into(),
            Logic::Or => "or".into(),
        }
    }
}

impl Criterion {
    pub fn new(
        metadata: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            metadata: metadata.into(),
            operator: Operator::from(operator.into()),
            value: value.into(),
            action: Action::Include,
        }
    }

    pub fn exclude(mut self) -> Self {
        self.action = Action::Exclude;
        self
    }
}

/// Parses `field:operator:value`; the value may itself contain `:`.
impl FromStr for Criterion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(field), Some(op), Some(value)) if !field.trim().is_empty() => {
                Ok(Criterion::new(field.trim(), op.trim(), value))
            }
            _ => Err(Error::InvalidCriterion(s.to_string())),
        }
    }
}

impl FilterExpr {
    pub fn from_criteria(criteria: Vec<Criterion>, logic: Logic) -> Self {
        let leaves: Vec<_> = criteria.into_iter().map(FilterExpr::Leaf).collect();
        match logic {
            Logic::Or if !leaves.is_empty() => FilterExpr::Or(leaves),
            _ => FilterExpr::And(leaves),
        }
    }

    pub fn evaluate(&self, record: &Metadata) -> bool {
        // Every branch is evaluated, so each bad criterion is reported.
        match self {
            FilterExpr::Leaf(c) => evaluate(record, c),
            FilterExpr::And(items) => {
                let results: Vec<bool> = items.iter().map(|e| e.evaluate(record)).collect();
                results.into_iter().all(|r| r)
            }
            FilterExpr::Or(items) => {
                let results: Vec<bool> = items.iter().map(|e| e.evaluate(record)).collect();
                results.into_iter().any(|r| r)
            }
        }
    }
}

/// Evaluates one criterion. Unknown fields and operators fail closed
/// (false, whatever the action); otherwise `Exclude` inverts the match.
pub fn evaluate(record: &Metadata, criterion: &Criterion) -> bool {
    match resolve(record, criterion) {
        None => false,
        Some(matched) => match criterion.action {
            Action::Include => matched,
            Action::Exclude => !matched,
        },
    }
}

/// Left fold over all criteria; an empty list matches everything.
pub fn matches(record: &Metadata, criteria: &[Criterion], logic: Logic) -> bool {
    let mut results = criteria.iter().map(|c| evaluate(record, c));
    let Some(first) = results.next() else {
        return true;
    };
    results.fold(first, |acc, r| match logic {
        Logic::Or => acc || r,
        Logic::And => acc && r,
    })
}

/// Records matching the criteria, in input order.
pub fn filter_corpus(
    records: impl IntoIterator<Item = Metadata>,
    criteria: &[Criterion],
    logic: Logic,
) -> Vec<Metadata> {
    records
        .into_iter()
        .filter(|r| matches(r, criteria, logic))
        .collect()
}

pub fn filter_corpus_expr(
    records: impl IntoIterator<Item = Metadata>,
    expr: &FilterExpr,
) -> Vec<Metadata> {
    records.into_iter().filter(|r| expr.evaluate(r)).collect()
}

/// First format in [`DATE_FORMATS`] that accepts `raw`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

fn resolve(record: &Metadata, c: &Criterion) -> Option<bool> {
    let mapping = map_field(&c.metadata);
    let Some(field) = Field::from_internal(&mapping.internal) else {
        warn!(field = %c.metadata, "unknown filter field; criterion fails closed");
        return None;
    };
    if let Operator::Unknown(op) = &c.operator {
        warn!(
            field = %c.metadata,
            operator = %op,
            "unknown filter operator; criterion fails closed"
        );
        return None;
    }

    let value = c.value.as_str();
    let matched = match (&c.operator, record.field(field)) {
        (Operator::Equals | Operator::In, FieldRef::List(items)) => {
            items.iter().any(|it| *it == value)
        }
        (Operator::Equals | Operator::In, scalar) => scalar_text(&scalar) == value,
        (Operator::Contains, FieldRef::List(items)) => {
            let needle = value.to_lowercase();
            items.iter().any(|it| it.to_lowercase().contains(&needle))
        }
        (Operator::Contains, scalar) => scalar_text(&scalar)
            .to_lowercase()
            .contains(&value.to_lowercase()),
        (op @ (Operator::Greater | Operator::Less), field_value) => {
            compare(op, &field_value, value).unwrap_or(false)
        }
        (Operator::Unknown(_), _) => return None,
    };
    Some(matched)
}

fn compare(op: &Operator, field_value: &FieldRef<'_>, value: &str) -> Option<bool> {
    let ord = match field_value {
        FieldRef::List(items) => {
            let n: i64 = value.trim().parse().ok()?;
            (items.len() as i64).cmp(&n)
        }
        FieldRef::Date(ts) => {
            let threshold = day_start(parse_date(value)?)?;
            ts.cmp(&threshold)
        }
        FieldRef::Bytes(size) => {
            let n: i64 = value.trim().parse().ok()?;
            i128::from(*size).cmp(&i128::from(n))
        }
        FieldRef::Text(_) => return None,
    };
    Some(match op {
        Operator::Greater => ord == Ordering::Greater,
        Operator::Less => ord == Ordering::Less,
        _ => false,
    })
}

fn day_start(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|d| d.and_utc())
}

fn scalar_text<'a>(v: &FieldRef<'a>) -> Cow<'a, str> {
    match v {
        FieldRef::Text(s) => Cow::Borrowed(*s),
        FieldRef::Date(ts) => Cow::Owned(ts.format("%Y-%m-%d").to_string()),
        FieldRef::Bytes(n) => Cow::Owned(n.to_string()),
        FieldRef::List(items) => Cow::Owned(items.join(",")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Path,
    Field(Field),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue<'a> {
    Number(i128),
    Date(DateTime<Utc>),
    String(&'a str),
}

/// Sorts by path or field; records without a value for the field go last
/// in either direction, ties broken by path.
pub fn sort_records(records: &mut [Metadata], key: SortKey, dir: SortDir) {
    match key {
        SortKey::Path => match dir {
            SortDir::Asc => records.sort_by(|a, b| a.path.cmp(&b.path)),
            SortDir::Desc => records.sort_by(|a, b| b.path.cmp(&a.path)),
        },
        SortKey::Field(field) => records.sort_by(|a, b| {
            let ak = sort_value(a, field);
            let bk = sort_value(b, field);
            match (ak, bk) {
                (None, None) => a.path.cmp(&b.path),
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(ak), Some(bk)) => match dir {
                    SortDir::Asc => ak.cmp(&bk).then_with(|| a.path.cmp(&b.path)),
                    SortDir::Desc => bk.cmp(&ak).then_with(|| a.path.cmp(&b.path)),
                },
            }
        }),
    }
}

fn sort_value(record: &Metadata, field: Field) -> Option<SortValue<'_>> {
    match record.field(field) {
        FieldRef::Text("") => None,
        FieldRef::Text(s) => Some(SortValue::String(s)),
        FieldRef::Date(ts) => Some(SortValue::Date(ts)),
        FieldRef::Bytes(n) => Some(SortValue::Number(i128::from(n))),
        FieldRef::List(items) => items.first().copied().map(SortValue::String),
    }
}

/// Runs criteria against the full corpus of a store.
pub struct FilterEngine<'a, S: MetadataStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: MetadataStore + ?Sized> FilterEngine<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn filter_files(&self, criteria: &[Criterion], logic: Logic) -> Result<Vec<Metadata>> {
        Ok(filter_corpus(self.store.all_records()?, criteria, logic))
    }

    pub fn filter_expr(&self, expr: &FilterExpr) -> Result<Vec<Metadata>> {
        Ok(filter_corpus_expr(self.store.all_records()?, expr))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{NotePath, Status};

    fn record(path: &str) -> Metadata {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        Metadata::new(NotePath::try_from(path).unwrap(), 2048, created)
    }

    fn tagged(path: &str, tags: &[&str]) -> Metadata {
        let mut r = record(path);
        r.tags = tags.iter().map(|t| t.to_string()).collect();
        r
    }

    #[test]
    fn empty_criteria_match_everything() {
        let r = record("a.md");
        assert!(matches(&r, &[], Logic::And));
        assert!(matches(&r, &[], Logic::Or));
    }

    #[test]
    fn array_contains_is_case_insensitive_substring() {
        let r = tagged("a.md", &["Work", "urgent"]);
        assert!(evaluate(&r, &Criterion::new("tags", "contains", "urg")));
        assert!(evaluate(&r, &Criterion::new("tag", "contains", "work")));
        assert!(!evaluate(&r, &Criterion::new("tags", "contains", "home")));
    }

    #[test]
    fn array_equals_and_in_require_exact_member() {
        let r = tagged("a.md", &["work", "urgent"]);
        assert!(evaluate(&r, &Criterion::new("tags", "equals", "work")));
        assert!(evaluate(&r, &Criterion::new("tags", "in", "urgent")));
        assert!(!evaluate(&r, &Criterion::new("tags", "equals", "Work")));
        assert!(!evaluate(&r, &Criterion::new("tags", "equals", "urg")));
    }

    #[test]
    fn scalar_equals_and_contains() {
        let mut r = record("notes/a.md");
        r.collection = "Reading List".into();
        r.status = Some(Status::Active);
        assert!(evaluate(&r, &Criterion::new("collection", "equals", "Reading List")));
        assert!(evaluate(&r, &Criterion::new("collection", "contains", "reading")));
        assert!(evaluate(&r, &Criterion::new("status", "in", "active")));
        assert!(!evaluate(&r, &Criterion::new("priority", "equals", "high")));
        assert!(evaluate(&r, &Criterion::new("createdAt", "equals", "2024-03-01")));
    }

    #[test]
    fn array_greater_and_less_compare_element_count() {
        let r = tagged("a.md", &["a", "b", "c"]);
        assert!(evaluate(&r, &Criterion::new("tags", "greater", "2")));
        assert!(!evaluate(&r, &Criterion::new("tags", "greater", "3")));
        assert!(evaluate(&r, &Criterion::new("tags", "less", "4")));
        assert!(!evaluate(&r, &Criterion::new("tags", "less", "many")));
    }

    #[test]
    fn dates_compare_against_parsed_day() {
        let r = record("a.md");
        assert!(!evaluate(&r, &Criterion::new("createdAt", "greater", "01.03.2024")));
        assert!(evaluate(&r, &Criterion::new("createdAt", "greater", "2024-02-29")));
        assert!(evaluate(&r, &Criterion::new("created", "less", "03/02/2024")));
        assert!(evaluate(&r, &Criterion::new("createdAt", "less", "2024/03/02")));
        assert!(evaluate(&r, &Criterion::new("createdAt", "greater", "28-02-2024")));
        assert!(!evaluate(&r, &Criterion::new("createdAt", "greater", "yesterday")));
    }

    #[test]
    fn date_formats_are_tried_in_priority_order() {
        assert_eq!(parse_date("03.04.2024"), NaiveDate::from_ymd_opt(2024, 4, 3));
        assert_eq!(parse_date("03/04/2024"), NaiveDate::from_ymd_opt(2024, 3, 4));
        assert_eq!(parse_date("2024-04-03"), NaiveDate::from_ymd_opt(2024, 4, 3));
        assert_eq!(parse_date("03-04-2024"), NaiveDate::from_ymd_opt(2024, 4, 3));
        assert_eq!(parse_date("April 3rd"), None);
    }

    #[test]
    fn size_compares_as_integer_and_other_scalars_do_not_order() {
        let r = record("a.md");
        assert!(evaluate(&r, &Criterion::new("size", "greater", "1024")));
        assert!(evaluate(&r, &Criterion::new("size", "less", "4096")));
        assert!(evaluate(&r, &Criterion::new("size", "greater", "-1")));
        assert!(!evaluate(&r, &Criterion::new("size", "greater", "2k")));
        assert!(!evaluate(&r, &Criterion::new("collection", "greater", "a")));
    }

    #[test]
    fn unknown_field_or_operator_fails_closed_even_when_excluded() {
        let r = record("a.md");
        assert!(!evaluate(&r, &Criterion::new("bogus", "equals", "x")));
        assert!(!evaluate(&r, &Criterion::new("bogus", "equals", "x").exclude()));
        assert!(!evaluate(&r, &Criterion::new("tags", "near", "x").exclude()));
    }

    #[test]
    fn exclude_inverts_the_match() {
        let r = tagged("a.md", &["work"]);
        assert!(!evaluate(&r, &Criterion::new("tags", "equals", "work").exclude()));
        assert!(evaluate(&r, &Criterion::new("tags", "equals", "home").exclude()));
    }

    #[test]
    fn and_or_fold_over_criteria() {
        let r = tagged("a.md", &["work"]);
        let hit = Criterion::new("tags", "equals", "work");
        let miss = Criterion::new("tags", "equals", "home");
        let both = [hit.clone(), miss.clone()];
        assert!(!matches(&r, &both, Logic::And));
        assert!(matches(&r, &both, Logic::Or));
        assert!(matches(&r, &[hit.clone(), hit.clone()], Logic::And));
        assert!(!matches(&r, &[miss.clone(), miss], Logic::Or));
    }

    #[test]
    fn flat_criteria_and_expression_tree_agree() {
        let records = vec![
            tagged("a.md", &["work"]),
            tagged("b.md", &["home"]),
            tagged("c.md", &["work", "home"]),
        ];
        let criteria = vec![
            Criterion::new("tags", "equals", "work"),
            Criterion::new("tags", "equals", "home").exclude(),
        ];
        for logic in [Logic::And, Logic::Or] {
            let flat = filter_corpus(records.clone(), &criteria, logic);
            let expr = FilterExpr::from_criteria(criteria.clone(), logic);
            let tree = filter_corpus_expr(records.clone(), &expr);
            assert_eq!(flat, tree);
        }
        let empty = FilterExpr::from_criteria(Vec::new(), Logic::Or);
        assert_eq!(filter_corpus_expr(records.clone(), &empty).len(), 3);
    }

    #[test]
    fn expression_tree_supports_grouping() {
        // (work AND urgent) OR home
        let expr = FilterExpr::Or(vec![
            FilterExpr::And(vec![
                FilterExpr::Leaf(Criterion::new("tags", "equals", "work")),
                FilterExpr::Leaf(Criterion::new("tags", "equals", "urgent")),
            ]),
            FilterExpr::Leaf(Criterion::new("tags", "equals", "home")),
        ]);
        assert!(expr.evaluate(&tagged("a.md", &["work", "urgent"])));
        assert!(expr.evaluate(&tagged("b.md", &["home"])));
        assert!(!expr.evaluate(&tagged("c.md", &["work"])));
    }

    #[test]
    fn filter_corpus_preserves_input_order() {
        let records = vec![
            tagged("z.md", &["x"]),
            tagged("a.md", &["y"]),
            tagged("m.md", &["x"]),
        ];
        let out = filter_corpus(records, &[Criterion::new("tags", "equals", "x")], Logic::And);
        let paths: Vec<_> = out.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["z.md", "m.md"]);
    }

    #[test]
    fn criteria_parse_from_colon_syntax_and_json() {
        let c: Criterion = "createdAt:greater:2024-01-01".parse().unwrap();
        assert_eq!(c.metadata, "createdAt");
        assert_eq!(c.operator, Operator::Greater);
        assert_eq!(c.value, "2024-01-01");

        let c: Criterion = "path:contains:a:b".parse().unwrap();
        assert_eq!(c.value, "a:b");
        assert!("tags".parse::<Criterion>().is_err());

        let c: Criterion = serde_json::from_str(
            r#"{"metadata":"tags","operator":"regex","value":"x","action":"exclude"}"#,
        )
        .unwrap();
        assert_eq!(c.operator, Operator::Unknown("regex".into()));
        assert_eq!(c.action, Action::Exclude);
    }

    #[test]
    fn sort_puts_missing_values_last() {
        let mut a = record("a.md");
        a.collection = "beta".into();
        let b = record("b.md");
        let mut c = record("c.md");
        c.collection = "alpha".into();
        let mut records = vec![a, b, c];

        sort_records(&mut records, SortKey::Field(Field::Collection), SortDir::Desc);
        let paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["a.md", "c.md", "b.md"]);

        sort_records(&mut records, SortKey::Path, SortDir::Desc);
        assert_eq!(records[0].path.as_str(), "c.md");
    }
}
