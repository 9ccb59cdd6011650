//! Attribute limiters.
//!
//! A [`Limiter`] selects change records by one attribute. Its selectors are
//! OR-ed together; a record survives a set of limiters only if every limiter
//! in the set accepts it.
//!
//! ```
//! use githooks::core::change::{ChangeRecord, ChangeType};
//! use githooks::core::limiter::{Attribute, Limiter, Selector};
//!
//! let record = ChangeRecord::parse(":100644 100644 aaaa bbbb M\tsrc/app.rb").unwrap();
//! let ruby = Limiter::only(Attribute::Path, [Selector::regex(r"\.rb$").unwrap()]).unwrap();
//! let deleted = Limiter::only(Attribute::Type, [Selector::from(ChangeType::Deleted)]).unwrap();
//!
//! assert!(ruby.matches(&record));
//! assert!(!deleted.matches(&record));
//! ```

use crate::core::change::{ChangeRecord, ChangeType};
use crate::core::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Record attribute a limiter inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attribute {
    /// File name (last path component).
    Name,
    /// Repository-relative path.
    Path,
    /// Change type.
    Type,
    /// New-side file mode.
    Mode,
    /// New-side blob id.
    Sha,
    /// Rename/copy similarity score.
    Score,
}

impl Attribute {
    /// Returns the attribute's name in rules files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Path => "path",
            Self::Type => "type",
            Self::Mode => "mode",
            Self::Sha => "sha",
            Self::Score => "score",
        }
    }

    /// Extracts this attribute from a record.
    #[must_use]
    pub fn value(self, record: &ChangeRecord) -> AttributeValue {
        match self {
            Self::Name => AttributeValue::Text(record.name().to_string()),
            Self::Path => AttributeValue::Text(record.path().to_string()),
            Self::Type => AttributeValue::Type(record.change_type),
            Self::Mode => AttributeValue::Number(record.to.mode),
            Self::Sha => AttributeValue::Text(record.to.sha.clone()),
            Self::Score => AttributeValue::Number(record.score),
        }
    }

    /// Interprets a literal from a rules file as a value of this attribute.
    ///
    /// Modes are octal, scores decimal, types accept names or status codes.
    pub fn parse_value(self, literal: &str) -> Result<AttributeValue> {
        let bad = |what: &str| Error::invalid_limiter(self.as_str(), format!("'{literal}' is not {what}"));
        match self {
            Self::Name | Self::Path | Self::Sha => Ok(AttributeValue::Text(literal.to_string())),
            Self::Type => literal
                .parse::<ChangeType>()
                .map(AttributeValue::Type)
                .map_err(|_| bad("a change type")),
            Self::Mode => u32::from_str_radix(literal.trim_start_matches("0o"), 8)
                .map(AttributeValue::Number)
                .map_err(|_| bad("an octal mode")),
            Self::Score => literal
                .parse()
                .map(AttributeValue::Number)
                .map_err(|_| bad("a number")),
        }
    }

    const fn is_text(self) -> bool {
        matches!(self, Self::Name | Self::Path | Self::Sha)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Attribute {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "path" => Ok(Self::Path),
            "type" => Ok(Self::Type),
            "mode" => Ok(Self::Mode),
            "sha" | "hash" => Ok(Self::Sha),
            "score" => Ok(Self::Score),
            _ => Err(Error::UnsupportedAttribute {
                attribute: s.to_string(),
            }),
        }
    }
}

/// Value of one record attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// Name, path or sha.
    Text(String),
    /// Change type.
    Type(ChangeType),
    /// Mode or score.
    Number(u32),
}

impl AttributeValue {
    /// Returns the text, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    fn fits(&self, attribute: Attribute) -> bool {
        match self {
            Self::Text(_) => attribute.is_text(),
            Self::Type(_) => attribute == Attribute::Type,
            Self::Number(_) => matches!(attribute, Attribute::Mode | Attribute::Score),
        }
    }

    fn equals(&self, actual: &Self) -> bool {
        match (self, actual) {
            (Self::Type(wanted), Self::Type(got)) => wanted.accepts(*got),
            _ => self == actual,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Type(t) => write!(f, "{t}"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<ChangeType> for AttributeValue {
    fn from(value: ChangeType) -> Self {
        Self::Type(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::Number(value)
    }
}

type ValueFn = dyn Fn(&AttributeValue) -> bool + Send + Sync;
type AttributeFn = dyn Fn(&AttributeValue, Attribute) -> bool + Send + Sync;
type RecordFn = dyn Fn(&AttributeValue, Attribute, &ChangeRecord) -> bool + Send + Sync;

/// Caller-supplied match logic, by the arguments it wants.
///
/// Predicates decide their own polarity: inversion never applies to them.
#[derive(Clone)]
pub enum Predicate {
    /// Receives the attribute value.
    Value(Arc<ValueFn>),
    /// Receives the value and the attribute.
    WithAttribute(Arc<AttributeFn>),
    /// Receives the value, the attribute and the whole record.
    WithRecord(Arc<RecordFn>),
}

impl Predicate {
    fn call(&self, value: &AttributeValue, attribute: Attribute, record: &ChangeRecord) -> bool {
        match self {
            Self::Value(f) => f(value),
            Self::WithAttribute(f) => f(value, attribute),
            Self::WithRecord(f) => f(value, attribute, record),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arity = match self {
            Self::Value(_) => 1,
            Self::WithAttribute(_) => 2,
            Self::WithRecord(_) => 3,
        };
        write!(f, "Predicate(arity = {arity})")
    }
}

/// One way of accepting an attribute value.
#[derive(Debug, Clone)]
pub enum Selector {
    /// Exact value. A `Type(Any)` value accepts every change type.
    Equals(AttributeValue),
    /// Regex search over a text attribute.
    Regex(Regex),
    /// Shell glob over a text attribute.
    Glob(glob::Pattern),
    /// Mode bits that must all be set.
    Bitmask(u32),
    /// Caller-supplied logic.
    Predicate(Predicate),
}

impl Selector {
    /// Compiles a regex selector.
    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|e| Error::invalid_limiter("regex", e.to_string()))
    }

    /// Compiles a glob selector.
    pub fn glob(pattern: &str) -> Result<Self> {
        glob::Pattern::new(pattern)
            .map(Self::Glob)
            .map_err(|e| Error::invalid_limiter("glob", e.to_string()))
    }

    /// Wraps a predicate over the value alone.
    pub fn predicate(f: impl Fn(&AttributeValue) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Predicate::Value(Arc::new(f)))
    }

    /// Wraps a predicate that also receives the attribute.
    pub fn predicate_with_attribute(
        f: impl Fn(&AttributeValue, Attribute) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate(Predicate::WithAttribute(Arc::new(f)))
    }

    /// Wraps a predicate that also receives the attribute and record.
    pub fn predicate_with_record(
        f: impl Fn(&AttributeValue, Attribute, &ChangeRecord) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::Predicate(Predicate::WithRecord(Arc::new(f)))
    }

    fn validate(&self, attribute: Attribute) -> Result<()> {
        let bad = |message: &str| Err(Error::invalid_limiter(attribute.as_str(), message));
        match self {
            Self::Equals(value) if !value.fits(attribute) => {
                bad(&format!("value '{value}' does not apply to {attribute}"))
            },
            Self::Regex(_) | Self::Glob(_) if !attribute.is_text() => {
                bad("patterns only apply to name, path and sha")
            },
            Self::Bitmask(_) if attribute != Attribute::Mode => bad("bitmasks only apply to mode"),
            _ => Ok(()),
        }
    }

    fn matches_plain(&self, value: &AttributeValue) -> bool {
        match self {
            Self::Equals(wanted) => wanted.equals(value),
            Self::Regex(re) => value.as_text().is_some_and(|s| re.is_match(s)),
            Self::Glob(pattern) => value.as_text().is_some_and(|s| pattern.matches(s)),
            Self::Bitmask(mask) => match value {
                AttributeValue::Number(mode) => mode & mask == *mask,
                _ => false,
            },
            Self::Predicate(_) => false,
        }
    }
}

impl From<AttributeValue> for Selector {
    fn from(value: AttributeValue) -> Self {
        Self::Equals(value)
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Self::Equals(value.into())
    }
}

impl From<ChangeType> for Selector {
    fn from(value: ChangeType) -> Self {
        Self::Equals(value.into())
    }
}

impl From<u32> for Selector {
    fn from(value: u32) -> Self {
        Self::Equals(value.into())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(v) => write!(f, "{v}"),
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
            Self::Glob(p) => write!(f, "glob({})", p.as_str()),
            Self::Bitmask(m) => write!(f, "bitmask({m:o})"),
            Self::Predicate(_) => f.write_str("<predicate>"),
        }
    }
}

/// Attribute-scoped record filter.
#[derive(Debug, Clone)]
pub struct Limiter {
    attribute: Attribute,
    selectors: Vec<Selector>,
    inverted: bool,
}

impl Limiter {
    /// Accepts records whose attribute matches any of `selectors`.
    pub fn only(attribute: Attribute, selectors: impl IntoIterator<Item = Selector>) -> Result<Self> {
        Self::new(attribute, selectors, false)
    }

    /// Accepts records whose attribute matches none of `selectors`.
    pub fn except(
        attribute: Attribute,
        selectors: impl IntoIterator<Item = Selector>,
    ) -> Result<Self> {
        Self::new(attribute, selectors, true)
    }

    /// Builds a limiter, validating every selector against the attribute.
    pub fn new(
        attribute: Attribute,
        selectors: impl IntoIterator<Item = Selector>,
        inverted: bool,
    ) -> Result<Self> {
        let selectors: Vec<Selector> = selectors.into_iter().collect();
        if selectors.is_empty() {
            return Err(Error::invalid_limiter(attribute.as_str(), "no selectors given"));
        }
        for selector in &selectors {
            selector.validate(attribute)?;
        }
        Ok(Self {
            attribute,
            selectors,
            inverted,
        })
    }

    /// The inspected attribute.
    #[must_use]
    pub const fn attribute(&self) -> Attribute {
        self.attribute
    }

    /// The selectors, OR-ed together.
    #[must_use]
    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    /// Returns true if the plain-selector test is negated.
    #[must_use]
    pub const fn is_inverted(&self) -> bool {
        self.inverted
    }

    /// Tests a record.
    ///
    /// A predicate returning true accepts the record outright. Otherwise
    /// the plain selectors are OR-ed and the result negated if inverted; a
    /// limiter made only of predicates rejects when none of them accepts.
    #[must_use]
    pub fn matches(&self, record: &ChangeRecord) -> bool {
        let value = self.attribute.value(record);

        let mut plain_seen = false;
        let mut plain_hit = false;
        for selector in &self.selectors {
            if let Selector::Predicate(predicate) = selector {
                if predicate.call(&value, self.attribute, record) {
                    return true;
                }
            } else {
                plain_seen = true;
                plain_hit = plain_hit || selector.matches_plain(&value);
            }
        }

        plain_seen && (plain_hit != self.inverted)
    }

    /// Like [`Limiter::matches`], also emitting a debug trace line.
    pub fn trace(&self, record: &ChangeRecord) -> bool {
        let pass = self.matches(record);
        tracing::debug!(
            path = record.path(),
            attribute = %self.attribute,
            value = %self.attribute.value(record),
            limiter = %self,
            "limiter {}",
            if pass { "pass" } else { "fail" }
        );
        pass
    }
}

impl fmt::Display for Limiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.inverted { "not in" } else { "in" };
        let selectors: Vec<String> = self.selectors.iter().map(ToString::to_string).collect();
        write!(f, "{} {op} [{}]", self.attribute, selectors.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::Manifest;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn record(line: &str) -> ChangeRecord {
        ChangeRecord::parse(line).expect("parse")
    }

    fn app_rb() -> ChangeRecord {
        record(":100644 100644 aaaa0000 bbbb1111 M\tsrc/app.rb")
    }

    fn sample_manifest() -> Manifest {
        Manifest::new([
            app_rb(),
            record(":000000 100755 0000 cccc A\tbin/setup"),
            record(":100644 000000 dddd 0000 D\tlib/old.rb"),
            record(":100644 100644 eeee ffff R090\tREADME\tREADME.md"),
        ])
    }

    #[rstest]
    #[case("name", Attribute::Name)]
    #[case("PATH", Attribute::Path)]
    #[case("hash", Attribute::Sha)]
    #[case("sha", Attribute::Sha)]
    #[case("score", Attribute::Score)]
    fn test_attribute_from_str(#[case] input: &str, #[case] expected: Attribute) {
        assert_eq!(input.parse::<Attribute>().expect("parse"), expected);
    }

    #[test]
    fn test_unsupported_attribute() {
        let result = "size".parse::<Attribute>();
        assert!(matches!(result, Err(Error::UnsupportedAttribute { ref attribute }) if attribute == "size"));
    }

    #[test]
    fn test_end_to_end_type_and_path() {
        let record = app_rb();
        let modified = Limiter::only(Attribute::Type, [ChangeType::Modified.into()]).expect("limiter");
        let ruby = Limiter::only(Attribute::Path, [Selector::regex(r"\.rb$").expect("regex")])
            .expect("limiter");
        let deleted = Limiter::only(Attribute::Type, [ChangeType::Deleted.into()]).expect("limiter");

        assert!(modified.matches(&record) && ruby.matches(&record));
        assert!(!deleted.matches(&record));
    }

    #[test]
    fn test_list_is_or_within_attribute() {
        let limiter = Limiter::only(
            Attribute::Type,
            [ChangeType::Added.into(), ChangeType::Modified.into()],
        )
        .expect("limiter");
        let kept = sample_manifest().filter([&limiter]);
        assert_eq!(kept.paths(), vec!["bin/setup", "src/app.rb"]);
    }

    #[test]
    fn test_any_type_matches_everything() {
        let limiter = Limiter::only(Attribute::Type, [ChangeType::Any.into()]).expect("limiter");
        assert_eq!(sample_manifest().filter([&limiter]).len(), 4);
    }

    #[rstest]
    #[case(Attribute::Path, Selector::regex(r"\.rb$").expect("regex"))]
    #[case(Attribute::Name, Selector::glob("*.md").expect("glob"))]
    #[case(Attribute::Type, ChangeType::Deleted.into())]
    #[case(Attribute::Mode, Selector::Bitmask(0o111))]
    #[case(Attribute::Score, 90u32.into())]
    fn test_inversion_is_complement(#[case] attribute: Attribute, #[case] selector: Selector) {
        let manifest = sample_manifest();
        let only = Limiter::only(attribute, [selector.clone()]).expect("limiter");
        let except = Limiter::except(attribute, [selector]).expect("limiter");

        let kept = manifest.filter([&only]).paths();
        let dropped = manifest.filter([&except]).paths();

        assert_eq!(kept.len() + dropped.len(), manifest.len());
        assert!(kept.iter().all(|p| !dropped.contains(p)));
    }

    #[test]
    fn test_bitmask_requires_all_bits() {
        let executable = Limiter::only(Attribute::Mode, [Selector::Bitmask(0o111)]).expect("limiter");
        assert_eq!(sample_manifest().filter([&executable]).paths(), vec!["bin/setup"]);
    }

    #[test]
    fn test_glob_on_name() {
        let limiter = Limiter::only(Attribute::Name, [Selector::glob("*.rb").expect("glob")])
            .expect("limiter");
        assert_eq!(
            sample_manifest().filter([&limiter]).paths(),
            vec!["lib/old.rb", "src/app.rb"]
        );
    }

    #[test]
    fn test_predicate_ignores_inversion() {
        let limiter = Limiter::except(
            Attribute::Path,
            [Selector::predicate(|v| v.as_text().is_some_and(|p| p.starts_with("src/")))],
        )
        .expect("limiter");
        assert_eq!(sample_manifest().filter([&limiter]).paths(), vec!["src/app.rb"]);
    }

    #[test]
    fn test_predicate_with_record() {
        let limiter = Limiter::only(
            Attribute::Path,
            [Selector::predicate_with_record(|_, attribute, record| {
                attribute == Attribute::Path && record.score > 50
            })],
        )
        .expect("limiter");
        assert_eq!(sample_manifest().filter([&limiter]).paths(), vec!["README.md"]);
    }

    #[test]
    fn test_predicate_with_attribute() {
        let limiter = Limiter::only(
            Attribute::Type,
            [Selector::predicate_with_attribute(|value, attribute| {
                attribute == Attribute::Type && *value == AttributeValue::Type(ChangeType::Deleted)
            })],
        )
        .expect("limiter");
        assert_eq!(sample_manifest().filter([&limiter]).paths(), vec!["lib/old.rb"]);
    }

    #[test]
    fn test_limiters_are_anded() {
        let ruby = Limiter::only(Attribute::Path, [Selector::regex(r"\.rb$").expect("regex")])
            .expect("limiter");
        let not_deleted =
            Limiter::except(Attribute::Type, [ChangeType::Deleted.into()]).expect("limiter");
        assert_eq!(
            sample_manifest().filter([&ruby, &not_deleted]).paths(),
            vec!["src/app.rb"]
        );
    }

    #[test]
    fn test_filter_does_not_mutate_source() {
        let manifest = sample_manifest();
        let limiter = Limiter::only(Attribute::Type, [ChangeType::Added.into()]).expect("limiter");
        let filtered = manifest.filter([&limiter]);
        assert_eq!(filtered.len(), 1);
        assert_eq!(manifest.len(), 4);
    }

    #[rstest]
    #[case(Attribute::Type, Selector::regex("x").expect("regex"))]
    #[case(Attribute::Path, Selector::Bitmask(0o111))]
    #[case(Attribute::Mode, Selector::from("100644"))]
    #[case(Attribute::Path, Selector::from(ChangeType::Added))]
    fn test_mismatched_selector_rejected(#[case] attribute: Attribute, #[case] selector: Selector) {
        let result = Limiter::only(attribute, [selector]);
        assert!(matches!(result, Err(Error::InvalidLimiter { .. })));
    }

    #[test]
    fn test_empty_selectors_rejected() {
        let result = Limiter::only(Attribute::Path, Vec::new());
        assert!(matches!(result, Err(Error::InvalidLimiter { .. })));
    }

    #[test]
    fn test_bad_regex_rejected() {
        assert!(matches!(Selector::regex("("), Err(Error::InvalidLimiter { .. })));
    }

    #[rstest]
    #[case(Attribute::Mode, "100755", AttributeValue::Number(0o100_755))]
    #[case(Attribute::Mode, "0o644", AttributeValue::Number(0o644))]
    #[case(Attribute::Score, "75", AttributeValue::Number(75))]
    #[case(Attribute::Type, "M", AttributeValue::Type(ChangeType::Modified))]
    #[case(Attribute::Type, "renamed", AttributeValue::Type(ChangeType::Renamed))]
    #[case(Attribute::Path, "a/b", AttributeValue::Text("a/b".into()))]
    fn test_parse_value(
        #[case] attribute: Attribute,
        #[case] literal: &str,
        #[case] expected: AttributeValue,
    ) {
        assert_eq!(attribute.parse_value(literal).expect("value"), expected);
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        assert!(Attribute::Mode.parse_value("rwx").is_err());
        assert!(Attribute::Type.parse_value("changed").is_err());
    }

    #[test]
    fn test_display() {
        let limiter = Limiter::except(
            Attribute::Path,
            [Selector::regex(r"^vendor/").expect("regex"), "Gemfile".into()],
        )
        .expect("limiter");
        assert_eq!(limiter.to_string(), "path not in [/^vendor//, Gemfile]");
    }
}
