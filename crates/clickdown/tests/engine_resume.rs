use clickdown::fake::{fake_field, fake_task};
use clickdown::{
    Checkpoint, EngineState, ExtractConfig, ExtractError, ExtractionEngine, ExtractionRoot,
    FakeCall, FakeClickUp, FakeEndpoint, MemoryCheckpointStore, MemorySink, Position,
    RecordingScheduler, RunOutcome, RunSummary, BASE_COLUMNS,
};
use clickdown_api::{FetchError, FieldType};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    fake: Arc<FakeClickUp>,
    sink: MemorySink,
    store: MemoryCheckpointStore,
    scheduler: RecordingScheduler,
}

impl Harness {
    fn new(fake: FakeClickUp) -> Self {
        Self {
            fake: Arc::new(fake),
            sink: MemorySink::new(),
            store: MemoryCheckpointStore::new(),
            scheduler: RecordingScheduler::new(),
        }
    }

    /// A fresh engine over shared collaborators, as a new process would build
    fn engine(&self, config: &ExtractConfig) -> ExtractionEngine {
        ExtractionEngine::new(
            self.fake.clone(),
            config.clone(),
            Arc::new(self.sink.clone()),
            Arc::new(self.store.clone()),
            Arc::new(self.scheduler.clone()),
        )
        .unwrap()
    }

    /// Invoke until the run completes, returning the summary and the number
    /// of invocations it took
    async fn run_to_completion(&self, config: &ExtractConfig) -> (RunSummary, usize) {
        for invocation in 1..=200 {
            match self.engine(config).run().await.unwrap() {
                RunOutcome::Completed(summary) => return (summary, invocation),
                RunOutcome::Suspended { resume_after, .. } => {
                    assert_eq!(self.scheduler.take(), Some(resume_after));
                    tokio::time::sleep(resume_after).await;
                }
            }
        }
        panic!("run did not complete within 200 invocations");
    }
}

fn workspace(team_id: &str) -> ExtractConfig {
    ExtractConfig::new(
        "pk_test",
        ExtractionRoot::Workspace {
            team_id: team_id.to_string(),
        },
    )
}

fn column(sink: &MemorySink, name: &str) -> usize {
    sink.header_snapshot()
        .iter()
        .position(|h| h == name)
        .unwrap_or_else(|| panic!("no column {}", name))
}

/// Two spaces with folderless and foldered lists, archived tasks and custom
/// fields that first appear deep into the traversal
fn seed(fake: &FakeClickUp) {
    fake.add_space("T", "S1", "Ops");
    fake.add_space("T", "S2", "Sales");

    fake.add_folderless_list("S1", "L1", "Inbox");
    fake.add_tasks("L1", false, 120);
    fake.add_tasks("L1", true, 1);

    fake.add_folder("S1", "F1", "Eng");
    fake.add_folder_list("F1", "L2", "Backlog");
    fake.add_folder_list("F1", "L3", "Empty");
    for n in 0..30 {
        let mut task = fake_task(&format!("L2-{}", n), "sprint work");
        task.custom_fields = vec![fake_field("Sprint", FieldType::Other("short_text".into()), json!(format!("S{}", n % 3)))];
        fake.push_task("L2", false, task);
    }

    fake.add_folder("S2", "F2", "Deals");
    fake.add_folder_list("F2", "L4", "Pipeline");
    fake.add_tasks("L4", false, 240);
    for n in 0..10 {
        let mut task = fake_task(&format!("L4-late-{}", n), "estimated");
        task.custom_fields = vec![fake_field("Points", FieldType::Rating, json!(n % 5))];
        fake.push_task("L4", false, task);
    }
}

#[tokio::test(start_paused = true)]
async fn test_sliced_run_matches_continuous_run() {
    let continuous = Harness::new(FakeClickUp::new());
    seed(&continuous.fake);
    let (summary, invocations) = continuous.run_to_completion(&workspace("T")).await;
    assert_eq!(invocations, 1);
    assert_eq!(summary.tally.rows_written, 121 + 30 + 250);

    let sliced = Harness::new(FakeClickUp::new().with_latency(Duration::from_secs(1)));
    seed(&sliced.fake);
    let config = ExtractConfig {
        time_budget_secs: Some(3),
        ..workspace("T")
    };
    let (sliced_summary, sliced_invocations) = sliced.run_to_completion(&config).await;

    assert!(sliced_invocations > 1);
    assert_eq!(sliced_summary.tally.invocations, sliced_invocations as u64);
    assert_eq!(sliced_summary.tally.rows_written, summary.tally.rows_written);
    assert_eq!(sliced_summary.tally.lists_completed, 4);
    assert_eq!(sliced.sink.header_snapshot(), continuous.sink.header_snapshot());
    assert_eq!(sliced.sink.table(), continuous.sink.table());
    assert!(sliced.store.snapshot().is_empty());
    assert_eq!(sliced.scheduler.pending(), None);
}

#[tokio::test]
async fn test_columns_grow_without_touching_earlier_rows() {
    let harness = Harness::new(FakeClickUp::new());
    seed(&harness.fake);
    harness.run_to_completion(&workspace("T")).await;

    let header = harness.sink.header_snapshot();
    assert_eq!(header.len(), BASE_COLUMNS.len() + 2);
    assert_eq!(header[BASE_COLUMNS.len()], "Sprint");
    assert_eq!(header[BASE_COLUMNS.len() + 1], "Points");

    let rows = harness.sink.rows();
    // Inbox rows were written before either custom field was seen
    assert_eq!(rows[0].len(), BASE_COLUMNS.len());
    let table = harness.sink.table();
    let points = column(&harness.sink, "Points");
    assert_eq!(table[0][points], "");
    assert_eq!(table.last().unwrap()[points], "4");
}

#[tokio::test]
async fn test_resume_fetches_the_persisted_page_first() {
    let harness = Harness::new(FakeClickUp::new());
    for s in 0..3 {
        let space = format!("S{}", s);
        harness.fake.add_space("T", &space, &space);
        harness.fake.add_folderless_list(&space, &format!("{}-inbox", space), "Inbox");
        let folder = format!("{}-F", space);
        harness.fake.add_folder(&space, &folder, "Folder");
        for l in 0..4 {
            harness
                .fake
                .add_folder_list(&folder, &format!("{}-L{}", folder, l), "List");
        }
    }
    harness.fake.add_tasks("S2-F-L3", false, 450);
    harness.fake.add_tasks("S2-F-L3", true, 2);

    let config = workspace("T");
    let mut checkpoint = Checkpoint::fresh(config.root.as_ref().unwrap());
    checkpoint.position = Position {
        space: 2,
        folder: 1,
        list: 3,
        archived: 0,
        page: 4,
    };
    harness.store.set(checkpoint.to_bag());

    let mut engine = harness.engine(&config);
    let outcome = engine.run().await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)));

    assert_eq!(
        harness.fake.task_page_calls(),
        vec![
            ("S2-F-L3".to_string(), false, 4),
            ("S2-F-L3".to_string(), true, 0),
        ]
    );
    // Earlier spaces and the bucket of space 2 are not revisited
    let calls = harness.fake.calls();
    assert!(!calls.contains(&FakeCall::Folders("S0".to_string())));
    assert!(!calls.contains(&FakeCall::FolderlessLists("S2".to_string())));
    assert_eq!(harness.sink.rows().len(), 52);
}

#[tokio::test(start_paused = true)]
async fn test_failing_list_is_skipped() {
    let harness = Harness::new(FakeClickUp::new());
    seed(&harness.fake);
    harness.fake.fail_always(
        FakeEndpoint::Tasks("L2".to_string()),
        FetchError::Http {
            status: 500,
            message: "Internal error".to_string(),
        },
    );

    let (summary, _) = harness.run_to_completion(&workspace("T")).await;
    assert_eq!(summary.tally.lists_skipped, 1);
    assert_eq!(summary.tally.lists_completed, 3);
    assert_eq!(summary.tally.rows_written, 121 + 250);
    let l2_calls = harness
        .fake
        .task_page_calls()
        .into_iter()
        .filter(|(list, _, _)| list == "L2")
        .count();
    assert_eq!(l2_calls, 3);
}

#[tokio::test]
async fn test_unreadable_folders_are_counted_as_skipped_branches() {
    let harness = Harness::new(FakeClickUp::new());
    seed(&harness.fake);
    harness.fake.fail_always(
        FakeEndpoint::Folders("S1".to_string()),
        FetchError::Http {
            status: 403,
            message: "forbidden".to_string(),
        },
    );

    let (summary, _) = harness.run_to_completion(&workspace("T")).await;
    assert_eq!(summary.tally.branches_skipped, 1);
    assert_eq!(summary.tally.rows_written, 121 + 250);
}

#[tokio::test]
async fn test_malformed_payload_fails_and_clears_checkpoint() {
    let harness = Harness::new(FakeClickUp::new());
    seed(&harness.fake);
    harness.fake.fail_always(
        FakeEndpoint::Tasks("L4".to_string()),
        FetchError::Decode {
            message: "expected array".to_string(),
        },
    );
    let mut stale = Checkpoint::fresh(&ExtractionRoot::Workspace {
        team_id: "T".to_string(),
    });
    stale.position.space = 1;
    harness.store.set(stale.to_bag());

    let mut engine = harness.engine(&workspace("T"));
    let err = engine.run().await.unwrap_err();

    assert!(matches!(err, ExtractError::Fatal { .. }));
    assert!(err.to_string().contains("L4"));
    assert_eq!(engine.state(), EngineState::Failed);
    assert!(harness.store.snapshot().is_empty());
    assert_eq!(harness.scheduler.pending(), None);
}

#[tokio::test]
async fn test_root_listing_failure_is_fatal() {
    let harness = Harness::new(FakeClickUp::new());
    harness.fake.fail_always(
        FakeEndpoint::Spaces("T".to_string()),
        FetchError::Http {
            status: 401,
            message: "Token invalid".to_string(),
        },
    );

    let mut engine = harness.engine(&workspace("T"));
    let err = engine.run().await.unwrap_err();
    assert!(err.to_string().contains("Token invalid"));
    assert_eq!(engine.state(), EngineState::Failed);
}

#[tokio::test]
async fn test_malformed_checkpoint_fails_the_run() {
    let harness = Harness::new(FakeClickUp::new());
    seed(&harness.fake);
    let mut bag = Checkpoint::fresh(&ExtractionRoot::Workspace {
        team_id: "T".to_string(),
    })
    .to_bag();
    bag.insert("page_index".to_string(), "-1".to_string());
    harness.store.set(bag);

    let mut engine = harness.engine(&workspace("T"));
    assert!(matches!(
        engine.run().await,
        Err(ExtractError::Checkpoint(_))
    ));
    assert!(harness.store.snapshot().is_empty());
    assert!(harness.fake.task_page_calls().is_empty());
}

#[tokio::test]
async fn test_checkpoint_for_another_root_is_discarded() {
    let harness = Harness::new(FakeClickUp::new());
    seed(&harness.fake);
    let mut foreign = Checkpoint::fresh(&ExtractionRoot::SingleList {
        list_id: "L4".to_string(),
    });
    foreign.position.page = 2;
    harness.store.set(foreign.to_bag());

    let (summary, invocations) = harness.run_to_completion(&workspace("T")).await;
    assert_eq!(invocations, 1);
    assert_ne!(summary.run_id, foreign.run_id);
    assert_eq!(summary.tally.rows_written, 121 + 30 + 250);
    assert_eq!(harness.fake.task_page_calls()[0], ("L1".to_string(), false, 0));
}

#[tokio::test]
async fn test_fresh_run_resets_a_stale_sink() {
    let harness = Harness::new(FakeClickUp::new());
    seed(&harness.fake);
    harness.run_to_completion(&workspace("T")).await;
    let first = harness.sink.table();

    harness.fake.clear_calls();
    harness.run_to_completion(&workspace("T")).await;
    assert_eq!(harness.sink.table(), first);
}
