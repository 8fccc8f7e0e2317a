//! The extraction engine
//!
//! One call to [`ExtractionEngine::run`] is one invocation. It loads the
//! stored checkpoint (or starts fresh), walks the hierarchy depth-first from
//! that position, and ends in one of three ways:
//!
//! - every leaf was visited: the checkpoint is cleared, the sink is stamped
//!   and the run is `Completed`
//! - the time budget ran out: the position of the next page is saved, a
//!   resumption is scheduled and the run is `Suspended`
//! - an unclassified error occurred: the checkpoint is cleared and the run
//!   is `Failed`
//!
//! The budget is checked before every page fetch except the first of an
//! invocation, so each invocation makes progress. A page that was written
//! but not yet recorded in a checkpoint is fetched again on resume, so rows
//! are delivered at least once.

use chrono::Utc;
use clickdown_api::{Provenance, TaskList};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::ClickUpApi;
use crate::checkpoint::{Checkpoint, CheckpointStore, Position, RunMode, RunTally};
use crate::config::{ExtractConfig, ExtractionRoot};
use crate::error::{ExtractError, Result};
use crate::fetcher::PageFetcher;
use crate::hierarchy::{FolderNode, HierarchyEnumerator};
use crate::rows::RowBuilder;
use crate::scheduler::ResumeScheduler;
use crate::schema::SchemaRegistry;
use crate::sink::{CompletionStamp, OutputSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Suspended,
    Completed,
    Failed,
}

impl EngineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineState::Completed | EngineState::Failed)
    }
}

/// Final report of a completed run, covering every invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub root_id: String,
    pub tally: RunTally,
    pub columns: usize,
    pub completed_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Suspended {
        checkpoint: Checkpoint,
        resume_after: Duration,
    },
    Completed(RunSummary),
}

/// State of one invocation
struct Pass {
    checkpoint: Checkpoint,
    /// Where this invocation resumed; drives the depth-first reset rule
    start: Position,
    registry: SchemaRegistry,
    started: Instant,
    budget: Option<Duration>,
    pages_this_invocation: u64,
}

impl Pass {
    fn budget_spent(&self) -> bool {
        match self.budget {
            Some(budget) => self.pages_this_invocation > 0 && self.started.elapsed() > budget,
            None => false,
        }
    }
}

type Flow = ControlFlow<Position>;

pub struct ExtractionEngine {
    config: ExtractConfig,
    root: ExtractionRoot,
    enumerator: HierarchyEnumerator,
    fetcher: PageFetcher,
    rows: RowBuilder,
    sink: Arc<dyn OutputSink>,
    store: Arc<dyn CheckpointStore>,
    scheduler: Arc<dyn ResumeScheduler>,
    state: EngineState,
}

impl ExtractionEngine {
    pub fn new(
        api: Arc<dyn ClickUpApi>,
        config: ExtractConfig,
        sink: Arc<dyn OutputSink>,
        store: Arc<dyn CheckpointStore>,
        scheduler: Arc<dyn ResumeScheduler>,
    ) -> Result<Self> {
        config.validate()?;
        let root = config.root()?.clone();
        Ok(Self {
            enumerator: HierarchyEnumerator::new(api.clone(), &config),
            fetcher: PageFetcher::new(api, &config),
            rows: RowBuilder::new(&config),
            root,
            config,
            sink,
            store,
            scheduler,
            state: EngineState::Idle,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn root(&self) -> &ExtractionRoot {
        &self.root
    }

    /// Run one invocation. `Err` means the run is `Failed` and its
    /// checkpoint has been cleared.
    #[tracing::instrument(name = "engine.run", skip(self), fields(root = %self.root.id()))]
    pub async fn run(&mut self) -> Result<RunOutcome> {
        if self.state.is_terminal() {
            return Err(ExtractError::Fatal {
                message: format!("engine already finished in state {:?}", self.state),
            });
        }
        self.state = EngineState::Running;

        match self.invoke().await {
            Ok(outcome) => {
                self.state = match outcome {
                    RunOutcome::Suspended { .. } => EngineState::Suspended,
                    RunOutcome::Completed(_) => EngineState::Completed,
                };
                Ok(outcome)
            }
            Err(e) => {
                error!("[ExtractionEngine] run failed: {}", e);
                if let Err(clear_error) = self.store.clear().await {
                    error!(
                        "[ExtractionEngine] could not clear checkpoint after failure: {}",
                        clear_error
                    );
                }
                self.scheduler.cancel().await;
                self.state = EngineState::Failed;
                Err(e)
            }
        }
    }

    async fn invoke(&self) -> Result<RunOutcome> {
        let mut pass = self.begin().await?;

        let flow = match &self.root {
            ExtractionRoot::SingleList { list_id } => self.walk_single_list(&mut pass, list_id).await?,
            ExtractionRoot::Workspace { team_id } => self.walk_workspace(&mut pass, team_id).await?,
        };

        match flow {
            ControlFlow::Break(position) => self.suspend(pass, position).await,
            ControlFlow::Continue(()) => self.complete(pass).await,
        }
    }

    /// Load or create the checkpoint and bring the sink's header in line
    async fn begin(&self) -> Result<Pass> {
        let bag = self.store.load().await?;
        let stored = match Checkpoint::from_bag(&bag)? {
            Some(checkpoint) if !checkpoint.belongs_to(&self.root) => {
                warn!(
                    "[ExtractionEngine] discarding checkpoint for {} {}, configured root is {}",
                    checkpoint.mode.as_str(),
                    checkpoint.root_id,
                    self.root.id()
                );
                self.store.clear().await?;
                None
            }
            other => other,
        };

        let (mut checkpoint, registry) = match stored {
            Some(checkpoint) => {
                let header = self.sink.header().await?;
                let mut registry = SchemaRegistry::from_header(&header);
                self.announce_columns(&mut registry).await?;
                info!(
                    "[ExtractionEngine] resuming run {} at {:?} with {} columns",
                    checkpoint.run_id,
                    checkpoint.position,
                    registry.len()
                );
                (checkpoint, registry)
            }
            None => {
                let checkpoint = Checkpoint::fresh(&self.root);
                let mut registry = SchemaRegistry::new();
                self.sink.reset(registry.columns()).await?;
                registry.mark_announced();
                info!(
                    "[ExtractionEngine] starting run {} ({} {})",
                    checkpoint.run_id,
                    checkpoint.mode.as_str(),
                    checkpoint.root_id
                );
                (checkpoint, registry)
            }
        };
        checkpoint.tally.invocations += 1;

        Ok(Pass {
            start: checkpoint.position,
            checkpoint,
            registry,
            started: Instant::now(),
            budget: self.config.time_budget(),
            pages_this_invocation: 0,
        })
    }

    async fn announce_columns(&self, registry: &mut SchemaRegistry) -> Result<()> {
        let new_columns = registry.unannounced().to_vec();
        if !new_columns.is_empty() {
            debug!("[ExtractionEngine] new columns: {:?}", new_columns);
            self.sink.extend_header(&new_columns).await?;
            registry.mark_announced();
        }
        Ok(())
    }

    async fn walk_single_list(&self, pass: &mut Pass, list_id: &str) -> Result<Flow> {
        let (leaf, skipped) = self.enumerator.single_list(list_id).await;
        // The lookup repeats on every invocation; count its failure once
        if pass.start.is_start() {
            pass.checkpoint.tally.branches_skipped += skipped as u64;
        }
        self.extract_list(pass, (0, 0, 0), &leaf.list, &leaf.provenance)
            .await
    }

    async fn walk_workspace(&self, pass: &mut Pass, team_id: &str) -> Result<Flow> {
        let spaces = self
            .enumerator
            .spaces(team_id)
            .await
            .map_err(|e| ExtractError::Fatal {
                message: e.to_string(),
            })?;
        info!(
            "[ExtractionEngine] team {}: {} spaces, starting at space {}",
            team_id,
            spaces.len(),
            pass.start.space_start()
        );

        for s in pass.start.space_start()..spaces.len() {
            let space = &spaces[s];

            if pass.start.folder_start(s) == 0 {
                let bucket = self.enumerator.bucket(space);
                if let ControlFlow::Break(position) =
                    self.walk_folder(pass, s, 0, &space.name, &bucket).await?
                {
                    return Ok(ControlFlow::Break(position));
                }
            }

            // Listed only once the bucket is done, so a resumed invocation
            // never lists (or counts a failure for) folders twice
            let folders = self.enumerator.real_folders(space).await;
            pass.checkpoint.tally.branches_skipped += folders.skipped_branches as u64;

            for f in pass.start.folder_start(s).max(1)..=folders.items.len() {
                let folder = &folders.items[f - 1];
                if let ControlFlow::Break(position) =
                    self.walk_folder(pass, s, f, &space.name, folder).await?
                {
                    return Ok(ControlFlow::Break(position));
                }
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    async fn walk_folder(
        &self,
        pass: &mut Pass,
        space: usize,
        folder: usize,
        space_name: &str,
        node: &FolderNode,
    ) -> Result<Flow> {
        let lists = self.enumerator.lists(node).await;
        pass.checkpoint.tally.branches_skipped += lists.skipped_branches as u64;

        for l in pass.start.list_start(space, folder)..lists.items.len() {
            let list = &lists.items[l];
            let provenance = Provenance::new(space_name, node.name(), &list.name);
            if let ControlFlow::Break(position) = self
                .extract_list(pass, (space, folder, l), list, &provenance)
                .await?
            {
                return Ok(ControlFlow::Break(position));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Both archived passes of one list, page by page
    async fn extract_list(
        &self,
        pass: &mut Pass,
        (space, folder, list_index): (usize, usize, usize),
        list: &TaskList,
        provenance: &Provenance,
    ) -> Result<Flow> {
        for archived in pass.start.archived_start(space, folder, list_index)..2 {
            let mut page = pass.start.page_start(space, folder, list_index, archived);
            loop {
                if pass.budget_spent() {
                    let position = Position {
                        space,
                        folder,
                        list: list_index,
                        archived,
                        page,
                    };
                    return Ok(ControlFlow::Break(position));
                }

                let fetched = match self.fetcher.fetch(&list.id, archived == 1, page).await {
                    Ok(fetched) => fetched,
                    Err(source) => {
                        let error = ExtractError::from_page_failure(&list.id, source);
                        if !error.is_recoverable() {
                            return Err(error);
                        }
                        warn!(
                            "[ExtractionEngine] skipping list {} ({}): {}",
                            list.id, list.name, error
                        );
                        pass.checkpoint.tally.lists_skipped += 1;
                        return Ok(ControlFlow::Continue(()));
                    }
                };
                pass.pages_this_invocation += 1;
                pass.checkpoint.tally.pages_fetched += 1;

                if !fetched.tasks.is_empty() {
                    let rows: Vec<Vec<String>> = fetched
                        .tasks
                        .into_iter()
                        .map(|task| {
                            let task = task.with_provenance(provenance.clone());
                            self.rows.build(&task, &mut pass.registry)
                        })
                        .collect();
                    self.announce_columns(&mut pass.registry).await?;
                    self.sink.append_rows(&rows).await?;
                    pass.checkpoint.tally.rows_written += rows.len() as u64;
                }

                if !fetched.has_more {
                    break;
                }
                page += 1;
            }
        }

        debug!(
            "[ExtractionEngine] list {} ({}) done",
            list.id, list.name
        );
        pass.checkpoint.tally.lists_completed += 1;
        Ok(ControlFlow::Continue(()))
    }

    async fn suspend(&self, pass: Pass, position: Position) -> Result<RunOutcome> {
        let mut checkpoint = pass.checkpoint;
        checkpoint.position = position;
        checkpoint.saved_at = Some(Utc::now());
        self.store.save(&checkpoint.to_bag()).await?;

        let resume_after = self.config.resume_delay();
        self.scheduler.schedule(resume_after).await;
        info!(
            "[ExtractionEngine] budget spent after {:?}; suspended at {:?}, {} rows so far, resuming in {:?}",
            pass.started.elapsed(),
            position,
            checkpoint.tally.rows_written,
            resume_after
        );
        Ok(RunOutcome::Suspended {
            checkpoint,
            resume_after,
        })
    }

    async fn complete(&self, pass: Pass) -> Result<RunOutcome> {
        let checkpoint = pass.checkpoint;
        let completed_at = Utc::now();
        self.sink
            .finish(&CompletionStamp {
                completed_at,
                rows_written: checkpoint.tally.rows_written,
            })
            .await?;
        self.store.clear().await?;
        self.scheduler.cancel().await;

        let tally = checkpoint.tally;
        info!(
            "[ExtractionEngine] run {} completed: {} rows, {} pages, {} lists, {} lists skipped, {} branches skipped, {} invocations",
            checkpoint.run_id,
            tally.rows_written,
            tally.pages_fetched,
            tally.lists_completed,
            tally.lists_skipped,
            tally.branches_skipped,
            tally.invocations
        );
        Ok(RunOutcome::Completed(RunSummary {
            run_id: checkpoint.run_id,
            mode: checkpoint.mode,
            root_id: checkpoint.root_id,
            tally,
            columns: pass.registry.len(),
            completed_at,
        }))
    }
}
