//! Version ranges with node-semver semantics.
//!
//! Release `appVersion` values are ranges as written by app developers:
//! a bare version is an exact match, space-separated comparators intersect,
//! `||` unions, and `1.2.x`, `~1.2`, `^1.2.3` and `1.0.0 - 2.0.0` have their
//! npm meanings. Versions are parsed with the `semver` crate; the range
//! grammar is implemented here because Cargo's requirement syntax treats a
//! bare version as a caret range.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::{BuildMetadata, Prerelease, Version};

use crate::error::{AcquisitionError, AcquisitionResult};

const OPERATOR_CHARS: &[char] = &['<', '>', '=', '~', '^'];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    fn matches(&self, version: &Version) -> bool {
        let ord = precedence(version, &self.version);
        match self.op {
            Op::Eq => ord == Ordering::Equal,
            Op::Gt => ord == Ordering::Greater,
            Op::Gte => ord != Ordering::Less,
            Op::Lt => ord == Ordering::Less,
            Op::Lte => ord != Ordering::Greater,
        }
    }
}

/// SemVer precedence; build metadata is ignored.
fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch)
        .cmp(&(b.major, b.minor, b.patch))
        .then_with(|| a.pre.cmp(&b.pre))
}

fn same_release(a: &Version, b: &Version) -> bool {
    (a.major, a.minor, a.patch) == (b.major, b.minor, b.patch)
}

fn invalid_range(range: &str, reason: impl Into<String>) -> AcquisitionError {
    AcquisitionError::InvalidRange {
        range: range.to_string(),
        reason: reason.into(),
    }
}

/// A possibly incomplete version such as `1`, `1.2`, `1.x` or `*`.
#[derive(Clone, Debug, Default)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
}

impl Partial {
    fn parse(text: &str, range: &str) -> AcquisitionResult<Self> {
        let text = text.trim().trim_start_matches('v');
        if text.is_empty() {
            return Ok(Self::default());
        }
        let without_build = text.split_once('+').map_or(text, |(head, _)| head);
        let (core, pre) = match without_build.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (without_build, None),
        };

        let mut numbers = [None; 3];
        let mut wildcard = false;
        for (i, part) in core.split('.').enumerate() {
            if i >= numbers.len() {
                return Err(invalid_range(range, format!("{text:?} has too many components")));
            }
            if wildcard || matches!(part, "x" | "X" | "*") {
                wildcard = true;
                continue;
            }
            let number = part
                .parse::<u64>()
                .map_err(|_| invalid_range(range, format!("{part:?} is not a version number")))?;
            numbers[i] = Some(number);
        }

        let [major, minor, patch] = numbers;
        let pre = match pre {
            None => Prerelease::EMPTY,
            Some(_) if patch.is_none() => {
                return Err(invalid_range(
                    range,
                    format!("{text:?} has a prerelease but no patch number"),
                ));
            }
            Some(pre) => Prerelease::new(pre).map_err(|e| invalid_range(range, e.to_string()))?,
        };
        Ok(Self {
            major,
            minor,
            patch,
            pre,
        })
    }

    /// The full version, if every component is present.
    fn full(&self) -> Option<Version> {
        Some(Version {
            major: self.major?,
            minor: self.minor?,
            patch: self.patch?,
            pre: self.pre.clone(),
            build: BuildMetadata::EMPTY,
        })
    }
}

fn at_least(major: u64, minor: u64, patch: u64) -> Comparator {
    Comparator::new(Op::Gte, Version::new(major, minor, patch))
}

/// `< major.minor.patch-0`: below every release and prerelease of that
/// version.
fn below(major: u64, minor: u64, patch: u64, range: &str) -> AcquisitionResult<Comparator> {
    let pre = Prerelease::new("0").map_err(|e| invalid_range(range, e.to_string()))?;
    Ok(Comparator::new(
        Op::Lt,
        Version {
            major,
            minor,
            patch,
            pre,
            build: BuildMetadata::EMPTY,
        },
    ))
}

fn bump(n: u64) -> u64 {
    n.saturating_add(1)
}

/// Append the comparators `op partial` stands for.
fn expand(op: &str, p: &Partial, range: &str, set: &mut Vec<Comparator>) -> AcquisitionResult<()> {
    match op {
        "" | "=" => match (p.major, p.minor, p.full()) {
            (_, _, Some(version)) => set.push(Comparator::new(Op::Eq, version)),
            (Some(major), Some(minor), None) => {
                set.push(at_least(major, minor, 0));
                set.push(below(major, bump(minor), 0, range)?);
            }
            (Some(major), None, None) => {
                set.push(at_least(major, 0, 0));
                set.push(below(bump(major), 0, 0, range)?);
            }
            (None, _, None) => {}
        },
        "~" | "~>" => match (p.major, p.minor, p.full()) {
            (Some(major), Some(minor), Some(version)) => {
                set.push(Comparator::new(Op::Gte, version));
                set.push(below(major, bump(minor), 0, range)?);
            }
            (Some(major), Some(minor), None) => {
                set.push(at_least(major, minor, 0));
                set.push(below(major, bump(minor), 0, range)?);
            }
            (Some(major), None, _) => {
                set.push(at_least(major, 0, 0));
                set.push(below(bump(major), 0, 0, range)?);
            }
            (None, ..) => {}
        },
        "^" => match (p.major, p.minor, p.patch, p.full()) {
            (Some(major), Some(minor), Some(patch), Some(version)) => {
                set.push(Comparator::new(Op::Gte, version));
                set.push(if major > 0 {
                    below(bump(major), 0, 0, range)?
                } else if minor > 0 {
                    below(0, bump(minor), 0, range)?
                } else {
                    below(0, 0, bump(patch), range)?
                });
            }
            (Some(major), Some(minor), ..) => {
                set.push(at_least(major, minor, 0));
                set.push(if major > 0 {
                    below(bump(major), 0, 0, range)?
                } else {
                    below(0, bump(minor), 0, range)?
                });
            }
            (Some(major), None, ..) => {
                set.push(at_least(major, 0, 0));
                set.push(below(bump(major), 0, 0, range)?);
            }
            (None, ..) => {}
        },
        ">" => match (p.major, p.minor, p.full()) {
            (_, _, Some(version)) => set.push(Comparator::new(Op::Gt, version)),
            (Some(major), Some(minor), None) => set.push(at_least(major, bump(minor), 0)),
            (Some(major), None, None) => set.push(at_least(bump(major), 0, 0)),
            (None, _, None) => set.push(below(0, 0, 0, range)?),
        },
        ">=" => match (p.major, p.minor, p.full()) {
            (_, _, Some(version)) => set.push(Comparator::new(Op::Gte, version)),
            (Some(major), minor, None) => set.push(at_least(major, minor.unwrap_or(0), 0)),
            (None, _, None) => {}
        },
        "<" => match (p.major, p.minor, p.full()) {
            (_, _, Some(version)) => set.push(Comparator::new(Op::Lt, version)),
            (Some(major), Some(minor), None) => set.push(below(major, minor, 0, range)?),
            (Some(major), None, None) => set.push(below(major, 0, 0, range)?),
            (None, _, None) => set.push(below(0, 0, 0, range)?),
        },
        "<=" => match (p.major, p.minor, p.full()) {
            (_, _, Some(version)) => set.push(Comparator::new(Op::Lte, version)),
            (Some(major), Some(minor), None) => set.push(below(major, bump(minor), 0, range)?),
            (Some(major), None, None) => set.push(below(bump(major), 0, 0, range)?),
            (None, _, None) => {}
        },
        other => return Err(invalid_range(range, format!("unknown operator {other:?}"))),
    }
    Ok(())
}

fn parse_hyphen(from: &str, to: &str, range: &str) -> AcquisitionResult<Vec<Comparator>> {
    let from = Partial::parse(from, range)?;
    let to = Partial::parse(to, range)?;
    let mut set = Vec::new();
    match (from.major, from.full()) {
        (_, Some(version)) => set.push(Comparator::new(Op::Gte, version)),
        (Some(major), None) => set.push(at_least(major, from.minor.unwrap_or(0), 0)),
        (None, None) => {}
    }
    match (to.major, to.minor, to.full()) {
        (_, _, Some(version)) => set.push(Comparator::new(Op::Lte, version)),
        (Some(major), Some(minor), None) => set.push(below(major, bump(minor), 0, range)?),
        (Some(major), None, None) => set.push(below(bump(major), 0, 0, range)?),
        (None, _, None) => {}
    }
    Ok(set)
}

fn parse_set(text: &str, range: &str) -> AcquisitionResult<Vec<Comparator>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if let [from, "-", to] = tokens.as_slice() {
        return parse_hyphen(from, to, range);
    }

    let mut set = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in tokens {
        // `>= 1.2.3` is the same comparator as `>=1.2.3`.
        if token.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
            if pending_op.replace(token).is_some() {
                return Err(invalid_range(range, "operator without a version"));
            }
            continue;
        }
        let split = token
            .find(|c: char| !OPERATOR_CHARS.contains(&c))
            .unwrap_or(token.len());
        let (inline_op, rest) = token.split_at(split);
        let op = match pending_op.take() {
            Some(op) if inline_op.is_empty() => op,
            Some(_) => return Err(invalid_range(range, "operator without a version")),
            None => inline_op,
        };
        let partial = Partial::parse(rest, range)?;
        expand(op, &partial, range, &mut set)?;
    }
    if pending_op.is_some() {
        return Err(invalid_range(range, "operator without a version"));
    }
    Ok(set)
}

/// A parsed node-style version range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionRange {
    source: String,
    /// Union of intersections; an empty intersection matches any release.
    sets: Vec<Vec<Comparator>>,
}

impl VersionRange {
    pub fn parse(range: &str) -> AcquisitionResult<Self> {
        let sets = range
            .split("||")
            .map(|alternative| parse_set(alternative, range))
            .collect::<AcquisitionResult<Vec<_>>>()?;
        Ok(Self {
            source: range.to_string(),
            sets,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Prerelease versions only match an alternative that names a
    /// prerelease of the same `major.minor.patch`.
    pub fn matches(&self, version: &Version) -> bool {
        self.sets.iter().any(|set| {
            if !set.iter().all(|c| c.matches(version)) {
                return false;
            }
            version.pre.is_empty()
                || set
                    .iter()
                    .any(|c| !c.version.pre.is_empty() && same_release(&c.version, version))
        })
    }

    /// Whether `version` is newer than every version this range admits.
    pub fn is_exceeded_by(&self, version: &Version) -> bool {
        if self.matches(version) {
            return false;
        }
        self.sets.iter().all(|set| set_is_below(set, version))
    }
}

fn set_is_below(set: &[Comparator], version: &Version) -> bool {
    let any = [at_least(0, 0, 0)];
    let set = if set.is_empty() { &any[..] } else { set };
    let Some(first) = set.first() else {
        return false;
    };

    let mut high = first;
    let mut low = first;
    for comparator in set {
        if precedence(&comparator.version, &high.version) == Ordering::Greater {
            high = comparator;
        } else if precedence(&comparator.version, &low.version) == Ordering::Less {
            low = comparator;
        }
    }

    // Unbounded above: nothing exceeds it.
    if matches!(high.op, Op::Gt | Op::Gte) {
        return false;
    }
    match low.op {
        Op::Eq | Op::Gt => precedence(version, &low.version) == Ordering::Greater,
        Op::Gte => precedence(version, &low.version) != Ordering::Less,
        Op::Lt | Op::Lte => true,
    }
}

impl FromStr for VersionRange {
    type Err = AcquisitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse a client version. A leading `v` or `=` is accepted.
pub fn parse_version(text: &str) -> AcquisitionResult<Version> {
    let trimmed = text.trim().trim_start_matches('=').trim_start_matches('v');
    Version::parse(trimmed).map_err(|e| AcquisitionError::InvalidVersion(format!("{text:?}: {e}")))
}

/// `true` if `version` lies in `range`. Unparseable input never matches.
pub fn satisfies(version: &str, range: &str) -> bool {
    match (parse_version(version), VersionRange::parse(range)) {
        (Ok(version), Ok(range)) => range.matches(&version),
        _ => false,
    }
}

/// `true` if `version` is greater than every version `range` admits.
/// Unparseable input yields `false`.
pub fn greater_than_range(version: &str, range: &str) -> bool {
    match (parse_version(version), VersionRange::parse(range)) {
        (Ok(version), Ok(range)) => range.is_exceeded_by(&version),
        _ => false,
    }
}
