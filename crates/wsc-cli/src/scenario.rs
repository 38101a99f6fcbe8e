//! Scenario files for `wsc replay`.
//!
//! A scenario seeds an in-memory repository, then runs steps that either
//! mutate the repository or report changes to the cache. The cache is
//! drained after every step so the printed sequence is deterministic.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use wsc_cache::{
    CacheConfig, CacheEntry, CacheRegistry, ChangeNotification, EntryStatsSnapshot, JobKind,
    StatusEvent,
};
use wsc_engine::InMemoryStatusEngine;
use wsc_status::StatusSnapshot;
use wsc_types::RepositoryId;

fn default_repository() -> String {
    "/virtual/scenario/.git".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct Scenario {
    /// Metadata directory used as the repository key.
    #[serde(default = "default_repository")]
    pub repository: String,
    /// Files present before the cache first loads.
    #[serde(default)]
    pub files: Vec<SeedFile>,
    /// Repository-wide exclude rules.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SeedFile {
    pub path: String,
    #[serde(default)]
    pub content: String,
    /// Stage and commit the file before the first load.
    #[serde(default)]
    pub committed: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Write {
        path: String,
        #[serde(default)]
        content: String,
    },
    Delete {
        path: String,
    },
    Stage {
        path: String,
    },
    StageRemoval {
        path: String,
    },
    Unstage {
        path: String,
    },
    Commit,
    Conflict {
        path: String,
    },
    Exclude {
        rules: Vec<String>,
    },
    /// Report changed paths to the cache.
    Notify {
        paths: Vec<String>,
    },
    /// Report a ref or HEAD change.
    RefChanged,
    /// Request a full reload.
    Refresh,
}

impl Scenario {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid scenario")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    fn seed(&self, engine: &InMemoryStatusEngine, repository: &RepositoryId) -> anyhow::Result<()> {
        engine.create_repository(repository)?;
        engine.set_exclude_rules(repository, self.exclude.iter().cloned())?;
        let mut committed = false;
        for file in &self.files {
            engine.write_file(repository, &file.path, &file.content)?;
            if file.committed {
                engine.stage(repository, &file.path)?;
                committed = true;
            }
        }
        if committed {
            engine.commit(repository)?;
        }
        Ok(())
    }
}

impl Step {
    fn apply(
        &self,
        engine: &InMemoryStatusEngine,
        repository: &RepositoryId,
        entry: &CacheEntry,
    ) -> anyhow::Result<()> {
        match self {
            Step::Write { path, content } => engine.write_file(repository, path, content)?,
            Step::Delete { path } => engine.delete_file(repository, path)?,
            Step::Stage { path } => engine.stage(repository, path)?,
            Step::StageRemoval { path } => engine.stage_removal(repository, path)?,
            Step::Unstage { path } => engine.unstage(repository, path)?,
            Step::Commit => engine.commit(repository)?,
            Step::Conflict { path } => engine.mark_conflict(repository, path)?,
            Step::Exclude { rules } => engine.set_exclude_rules(repository, rules.iter().cloned())?,
            Step::Notify { paths } => {
                entry.notify(ChangeNotification::paths(paths.iter().cloned()))
            }
            Step::RefChanged => entry.notify(ChangeNotification::RefChanged),
            Step::Refresh => entry.refresh(),
        }
        Ok(())
    }

    fn describe(&self) -> String {
        match self {
            Step::Write { path, .. } => format!("write {path}"),
            Step::Delete { path } => format!("delete {path}"),
            Step::Stage { path } => format!("stage {path}"),
            Step::StageRemoval { path } => format!("stage removal of {path}"),
            Step::Unstage { path } => format!("unstage {path}"),
            Step::Commit => "commit".to_string(),
            Step::Conflict { path } => format!("conflict on {path}"),
            Step::Exclude { rules } => format!("exclude {}", rules.join(" ")),
            Step::Notify { paths } => format!("notify {}", paths.join(" ")),
            Step::RefChanged => "ref changed".to_string(),
            Step::Refresh => "refresh".to_string(),
        }
    }
}

/// A snapshot published during a replay.
#[derive(Clone, Debug, Serialize)]
pub struct ReplayedEvent {
    /// Index of the step that triggered the publication; `None` for the
    /// initial load.
    pub step: Option<usize>,
    pub trigger: String,
    pub sequence: u64,
    pub kind: JobKind,
    pub snapshot: StatusSnapshot,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReplayReport {
    pub repository: String,
    pub events: Vec<ReplayedEvent>,
    pub final_snapshot: Option<StatusSnapshot>,
    pub last_error: Option<String>,
    pub stats: EntryStatsSnapshot,
}

/// Run `scenario` against a fresh in-memory engine and cache.
pub async fn replay(scenario: &Scenario, config: CacheConfig) -> anyhow::Result<ReplayReport> {
    let engine = Arc::new(InMemoryStatusEngine::new());
    let repository = RepositoryId::new(&scenario.repository);
    scenario.seed(&engine, &repository)?;

    let registry = CacheRegistry::init(engine.clone(), config)?;
    let (_, mut receiver) = registry.subscribe();
    let mut events = Vec::new();

    let entry = registry.get_entry(&repository)?;
    registry.wait_idle().await;
    collect(&mut receiver, None, "initial load", &mut events);

    for (index, step) in scenario.steps.iter().enumerate() {
        step.apply(&engine, &repository, &entry)
            .with_context(|| format!("step {} ({}) failed", index + 1, step.describe()))?;
        registry.wait_idle().await;
        collect(&mut receiver, Some(index + 1), &step.describe(), &mut events);
    }

    let report = ReplayReport {
        repository: repository.to_string(),
        events,
        final_snapshot: entry.snapshot().map(|snapshot| (*snapshot).clone()),
        last_error: entry.last_error(),
        stats: entry.stats(),
    };
    registry.shutdown();
    Ok(report)
}

fn collect(
    receiver: &mut tokio::sync::mpsc::UnboundedReceiver<StatusEvent>,
    step: Option<usize>,
    trigger: &str,
    events: &mut Vec<ReplayedEvent>,
) {
    while let Ok(event) = receiver.try_recv() {
        events.push(ReplayedEvent {
            step,
            trigger: trigger.to_string(),
            sequence: event.sequence,
            kind: event.kind,
            snapshot: (*event.snapshot).clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
repository = "/virtual/demo/.git"

[[files]]
path = "src/lib.rs"
content = "pub fn demo() {}"
committed = true

[[files]]
path = ".gitignore"
content = "target/\n"
committed = true

[[files]]
path = "target/debug/demo"

[[steps]]
action = "write"
path = "src/lib.rs"
content = "pub fn demo() { 1 }"

[[steps]]
action = "notify"
paths = ["src/lib.rs"]

[[steps]]
action = "notify"
paths = ["target/debug/demo.d"]

[[steps]]
action = "write"
path = "notes.md"

[[steps]]
action = "write"
path = "todo.md"

[[steps]]
action = "notify"
paths = ["notes.md", "todo.md"]
"#;

    #[test]
    fn parses_steps() {
        let scenario = Scenario::from_toml_str(SCENARIO).unwrap();
        assert_eq!(scenario.files.len(), 3);
        assert_eq!(scenario.steps.len(), 6);
        assert!(matches!(scenario.steps[1], Step::Notify { .. }));
    }

    #[test]
    fn unknown_action_rejected() {
        let result = Scenario::from_toml_str("[[steps]]\naction = \"explode\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.toml");
        std::fs::write(&path, SCENARIO).unwrap();
        assert_eq!(Scenario::load(&path).unwrap().repository, "/virtual/demo/.git");
        assert!(Scenario::load(&dir.path().join("missing.toml")).is_err());
    }

    #[tokio::test]
    async fn replay_reports_each_publication() {
        let scenario = Scenario::from_toml_str(SCENARIO).unwrap();
        let report = replay(&scenario, CacheConfig::default()).await.unwrap();

        let triggers: Vec<(Option<usize>, JobKind)> =
            report.events.iter().map(|e| (e.step, e.kind)).collect();
        assert_eq!(
            triggers,
            vec![
                (None, JobKind::Reload),
                (Some(2), JobKind::Update),
                (Some(6), JobKind::Reload),
            ]
        );
        assert!(report.events[0].snapshot.is_clean());
        assert!(report.events[1].snapshot.modified.contains("src/lib.rs"));

        let last = report.final_snapshot.unwrap();
        assert!(last.untracked.contains("notes.md"));
        assert!(last.untracked.contains("todo.md"));
        assert_eq!(report.stats.filtered, 1);
        assert_eq!(report.stats.updates_escalated, 1);
    }

    #[tokio::test]
    async fn failing_step_names_the_step() {
        let scenario = Scenario::from_toml_str(
            "[[steps]]\naction = \"delete\"\npath = \"absent.txt\"\n",
        )
        .unwrap();
        let err = replay(&scenario, CacheConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("step 1 (delete absent.txt)"));
    }
}
