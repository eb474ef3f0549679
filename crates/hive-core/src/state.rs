//! Build cache persistence.
//!
//! At startup the fact log is replayed over a freshly evaluated inventory to
//! restore build results; at shutdown the log is regenerated from the
//! inventory and written over the old file in one step. Within a run facts are
//! only ever appended, and on replay a later fact for the same system
//! overwrites an earlier one.

use std::collections::HashSet;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::str::FromStr;

use fact_log::{FactLog, Facts};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::Result;
use crate::inventory::Inventory;

/// Predicate of a build-result fact: `(result-v0|<system>|<path>)`.
pub const RESULT_PREDICATE: &str = "result-v0";

/// Older spelling of [`RESULT_PREDICATE`], still understood on replay.
pub const LEGACY_RESULT_PREDICATE: &str = "r0";

/// A pipeline step that can be named in the skip-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Build,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Build => "build",
        }
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "build" => Ok(Step::Build),
            other => Err(other.to_string()),
        }
    }
}

/// Steps the operator asked to skip when a previous run already completed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipList {
    steps: HashSet<Step>,
}

impl SkipList {
    /// Parse a comma-separated list such as `build`. Unknown names are logged
    /// and dropped.
    pub fn parse(list: &str) -> Self {
        let mut steps = HashSet::new();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            match name.parse::<Step>() {
                Ok(step) => {
                    steps.insert(step);
                }
                Err(unknown) => warn!(step = %unknown, "ignoring unknown step in skip-list"),
            }
        }
        SkipList { steps }
    }

    pub fn with(mut self, step: Step) -> Self {
        self.steps.insert(step);
        self
    }

    pub fn contains(&self, step: Step) -> bool {
        self.steps.contains(&step)
    }
}

/// What a replay did with the facts it read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Results copied onto systems.
    pub restored: usize,
    /// Results for systems no longer in the inventory.
    pub stale: usize,
    /// Results rejected because their path no longer exists.
    pub missing: usize,
    /// Facts with unknown predicates or the wrong shape.
    pub ignored: usize,
    /// Whether the log ended in an unterminated record.
    pub truncated: bool,
}

/// Replay `state` over `inv`, checking recorded paths against the filesystem.
pub fn apply_state(inv: &mut Inventory, state: &str, skip: &SkipList) -> ReplaySummary {
    apply_state_with(inv, state, skip, |path| Path::new(path).exists())
}

/// Replay `state` over `inv`, using `exists` to decide whether a recorded path
/// is still present.
///
/// With [`Step::Build`] in the skip-list a cached result is only trusted when
/// `exists` confirms it; otherwise cached results are restored as recorded.
pub fn apply_state_with(
    inv: &mut Inventory,
    state: &str,
    skip: &SkipList,
    exists: impl Fn(&str) -> bool,
) -> ReplaySummary {
    let verify = skip.contains(Step::Build);
    let mut summary = ReplaySummary::default();
    let mut facts = Facts::new(state);
    for parsed in facts.by_ref() {
        for error in &parsed.errors {
            warn!(predicate = %parsed.fact.predicate, %error, "bad escape in state fact");
        }
        let fact = parsed.fact;
        match fact.predicate.as_str() {
            RESULT_PREDICATE | LEGACY_RESULT_PREDICATE => {}
            other => {
                debug!(predicate = %other, "ignoring unknown state fact");
                summary.ignored += 1;
                continue;
            }
        }
        let [system, result] = fact.terms.as_slice() else {
            warn!(
                terms = fact.terms.len(),
                "expected a system and result path in result fact"
            );
            summary.ignored += 1;
            continue;
        };
        let Some(cfg) = inv.system_mut(system) else {
            debug!(%system, "dropping result for removed system");
            summary.stale += 1;
            continue;
        };
        if verify && !exists(result) {
            debug!(%system, %result, "cached result no longer exists");
            summary.missing += 1;
            continue;
        }
        debug!(%system, %result, "restored cached result");
        cfg.set_result(result.clone());
        summary.restored += 1;
    }
    summary.truncated = facts.is_truncated();
    if summary.truncated {
        warn!(
            offset = facts.consumed(),
            "state ends in an incomplete fact; ignoring the rest"
        );
    }
    summary
}

/// Read the state file at `path` and replay it. A missing file is an empty cache.
///
/// Invalid UTF-8 is replaced rather than rejected, so a write cut off inside a
/// multi-byte character lands in the unterminated last record and is dropped
/// with it.
pub fn load_state(path: &Path, inv: &mut Inventory, skip: &SkipList) -> Result<ReplaySummary> {
    let state = match std::fs::read(path) {
        Ok(state) => state,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no state file, starting with an empty cache");
            return Ok(ReplaySummary::default());
        }
        Err(err) => return Err(err.into()),
    };
    Ok(apply_state(inv, &String::from_utf8_lossy(&state), skip))
}

/// One result fact per built system, in system name order.
pub fn encode_state(inv: &Inventory) -> FactLog {
    let mut log = FactLog::new();
    for (system, result) in inv.results() {
        log.append(RESULT_PREDICATE, &[system, result]);
    }
    log
}

/// Replace the state file at `path` with the current build results.
///
/// The new content is written to a temporary file next to `path` and renamed
/// over it, so readers never see a partial log.
pub fn save_state(path: &Path, inv: &Inventory) -> Result<()> {
    let log = encode_state(inv);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(log.as_str().as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), "saved state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::System;

    fn inventory() -> Inventory {
        Inventory::default()
            .with_system("a", System::default())
            .with_system("b", System::default())
    }

    #[test]
    fn skip_list_parsing() {
        assert!(SkipList::parse("build").contains(Step::Build));
        assert!(SkipList::parse(" push , build ,").contains(Step::Build));
        assert!(!SkipList::parse("").contains(Step::Build));
        assert!(!SkipList::parse("push").contains(Step::Build));
    }

    #[test]
    fn restores_results_by_default() {
        let mut inv = inventory();
        let summary = apply_state_with(
            &mut inv,
            "(result-v0|a|/out/a)\n(result-v0|b|/out/b)\n",
            &SkipList::default(),
            |_| false,
        );
        assert_eq!(summary.restored, 2);
        assert_eq!(inv.systems["a"].result(), Some("/out/a"));
        assert_eq!(inv.systems["b"].result(), Some("/out/b"));
    }

    #[test]
    fn skipping_build_checks_paths_exist() {
        let mut inv = inventory();
        let summary = apply_state_with(
            &mut inv,
            "(result-v0|a|/out/a)\n(result-v0|b|/gone/b)\n",
            &SkipList::default().with(Step::Build),
            |path| path.starts_with("/out"),
        );
        assert_eq!(summary.restored, 1);
        assert_eq!(summary.missing, 1);
        assert!(inv.systems["a"].is_built());
        assert!(!inv.systems["b"].is_built());
    }

    #[test]
    fn later_facts_win() {
        let mut inv = inventory();
        apply_state_with(
            &mut inv,
            "(result-v0|a|/out/old)\n(result-v0|a|/out/new)\n",
            &SkipList::default(),
            |_| true,
        );
        assert_eq!(inv.systems["a"].result(), Some("/out/new"));
    }

    #[test]
    fn removed_systems_are_dropped_silently() {
        let mut inv = inventory();
        let summary = apply_state_with(
            &mut inv,
            "(result-v0|gone|/out/x)\n(result-v0|a|/out/a)\n",
            &SkipList::default(),
            |_| true,
        );
        assert_eq!(summary.stale, 1);
        assert_eq!(summary.restored, 1);
    }

    #[test]
    fn unknown_and_malformed_facts_are_ignored() {
        let mut inv = inventory();
        let summary = apply_state_with(
            &mut inv,
            "(pushed-v0|a|ssh://x)\n(result-v0|a)\n(r0|b|/out/b)\n",
            &SkipList::default(),
            |_| true,
        );
        assert_eq!(summary.ignored, 2);
        assert_eq!(summary.restored, 1);
        assert!(!inv.systems["a"].is_built());
        assert_eq!(inv.systems["b"].result(), Some("/out/b"));
    }

    #[test]
    fn truncated_tail_stops_replay() {
        let mut inv = inventory();
        let summary = apply_state_with(
            &mut inv,
            "(result-v0|a|/out/a)\n(result-v0|b|/out/",
            &SkipList::default(),
            |_| true,
        );
        assert!(summary.truncated);
        assert_eq!(summary.restored, 1);
        assert!(!inv.systems["b"].is_built());
    }

    #[test]
    fn tail_cut_inside_a_character_stops_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".hive.state");
        let mut bytes = b"(result-v0|a|/out/a)\n(result-v0|caf".to_vec();
        bytes.push("é".as_bytes()[0]);
        std::fs::write(&path, bytes).unwrap();

        let mut inv = inventory().with_system("café", System::default());
        let summary = load_state(&path, &mut inv, &SkipList::default()).unwrap();
        assert!(summary.truncated);
        assert_eq!(summary.restored, 1);
        assert_eq!(inv.systems["a"].result(), Some("/out/a"));
        assert!(!inv.systems["café"].is_built());
    }

    #[test]
    fn encodes_built_systems_in_name_order() {
        let inv = Inventory::default()
            .with_system("z", System::default().with_result("/out/z"))
            .with_system("m", System::default())
            .with_system("a", System::default().with_result("/out/(a|1)"));
        assert_eq!(
            encode_state(&inv).as_str(),
            "(result-v0|a|/out/~sa~p1~e)\n(result-v0|z|/out/z)\n"
        );
    }

    #[test]
    fn missing_state_file_is_an_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = inventory();
        let summary = load_state(&dir.path().join(".hive.state"), &mut inv, &SkipList::default())
            .unwrap();
        assert_eq!(summary, ReplaySummary::default());
    }

    #[test]
    fn save_overwrites_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".hive.state");
        std::fs::write(&path, "(result-v0|old|/out/old)\n(junk").unwrap();

        let inv = inventory().with_system("a", System::default().with_result("/out/a"));
        save_state(&path, &inv).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "(result-v0|a|/out/a)\n"
        );
    }
}
