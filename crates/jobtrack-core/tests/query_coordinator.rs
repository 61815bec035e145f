mod support;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobtrack_core::SearchConfig;
use jobtrack_core::input::InputEvent;
use jobtrack_core::models::{Application, ApplicationStatus, FollowUpFilter};
use jobtrack_core::search::{
    FocusSnapshot, FocusTarget, QueryCoordinator, SearchClient, SearchPhase, SearchState,
    SettledOutcome,
};
use jobtrack_core::source::{InMemorySearchSource, SearchSource};
use support::ScriptedSource;
use tokio::sync::watch;

const SUCCESS: SearchPhase = SearchPhase::Settled(SettledOutcome::Success);

struct RecordingFocus {
    current: FocusSnapshot,
    restored: Mutex<Vec<FocusSnapshot>>,
}

impl RecordingFocus {
    fn new(current: FocusSnapshot) -> Self {
        Self {
            current,
            restored: Mutex::new(Vec::new()),
        }
    }

    fn restored(&self) -> Vec<FocusSnapshot> {
        self.restored.lock().unwrap().clone()
    }
}

impl FocusTarget for RecordingFocus {
    fn capture(&self) -> FocusSnapshot {
        self.current
    }

    fn restore(&self, snapshot: &FocusSnapshot) {
        self.restored.lock().unwrap().push(*snapshot);
    }
}

fn scripted(source: &Arc<ScriptedSource>) -> QueryCoordinator {
    let source: Arc<dyn SearchSource> = source.clone();
    QueryCoordinator::new(source, &SearchConfig::default())
}

fn applications() -> Vec<Application> {
    let mut acme = Application::new(1, "Acme", "Engineer", ApplicationStatus::Applied);
    acme.follow_up_required = true;
    let globex = Application::new(2, "Globex", "Data Engineer", ApplicationStatus::Offer);
    let initech = Application::new(3, "Initech", "Analyst", ApplicationStatus::Rejected);
    vec![acme, globex, initech]
}

fn in_memory() -> QueryCoordinator {
    QueryCoordinator::new(
        Arc::new(InMemorySearchSource::new(applications())),
        &SearchConfig::default(),
    )
}

async fn settled(
    rx: &mut watch::Receiver<SearchState>,
    done: impl FnMut(&SearchState) -> bool,
) -> SearchState {
    rx.wait_for(done).await.expect("coordinator dropped").clone()
}

#[tokio::test(start_paused = true)]
async fn typed_term_is_searched_after_the_quiet_period() {
    let coordinator = in_memory();
    let mut rx = coordinator.subscribe();

    coordinator.handle_search_change("acme");
    let typed = coordinator.state();
    assert_eq!(typed.search_term, "acme");
    assert_eq!(typed.phase, SearchPhase::Debouncing);
    assert!(!typed.is_searching);

    let state = settled(&mut rx, |state| state.phase == SUCCESS).await;
    assert_eq!(state.results.total, 1);
    assert_eq!(state.results.records[0].company, "Acme");
    assert_eq!(state.query.term(), "acme");
    assert!(!state.is_searching);
    assert_eq!(state.error, None);
}

#[tokio::test(start_paused = true)]
async fn burst_of_input_issues_a_single_call() {
    let source = Arc::new(ScriptedSource::new(Duration::from_millis(20)));
    let coordinator = scripted(&source);
    let mut rx = coordinator.subscribe();

    coordinator.handle_search_change("r");
    tokio::time::sleep(Duration::from_millis(50)).await;
    coordinator.handle_search_change("ru");
    tokio::time::sleep(Duration::from_millis(40)).await;
    coordinator.handle_search_change("rus");

    let state = settled(&mut rx, |state| state.phase == SUCCESS).await;
    assert_eq!(source.calls(), 1);
    assert_eq!(state.query.term(), "rus");
    assert_eq!(state.results.records[0].company, "rus");
}

#[tokio::test(start_paused = true)]
async fn late_response_of_an_older_request_is_ignored() {
    let source = Arc::new(
        ScriptedSource::new(Duration::from_millis(10)).with_delay("a", Duration::from_millis(300)),
    );
    let coordinator = scripted(&source);
    let mut rx = coordinator.subscribe();

    coordinator.search_now("a");
    coordinator.search_now("ab");

    let state = settled(&mut rx, |state| state.phase == SUCCESS).await;
    assert_eq!(state.results.records[0].company, "ab");
    assert_eq!(state.applied_sequence, 2);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let state = coordinator.state();
    assert_eq!(source.calls(), 2);
    assert_eq!(state.results.records[0].company, "ab");
    assert_eq!(state.applied_sequence, 2);
}

#[tokio::test(start_paused = true)]
async fn failures_are_surfaced_as_an_error_state() {
    let source = Arc::new(ScriptedSource::new(Duration::from_millis(10)));
    source.failing.store(true, Ordering::SeqCst);
    let coordinator = scripted(&source);
    let mut rx = coordinator.subscribe();

    coordinator.search_now("acme");
    let state = settled(&mut rx, |state| {
        state.phase == SearchPhase::Settled(SettledOutcome::Error)
    })
    .await;

    assert_eq!(state.error.as_deref(), Some("backend unavailable"));
    assert!(!state.is_searching);
    assert!(state.results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancelling_the_current_request_settles_as_canceled() {
    let source = Arc::new(ScriptedSource::new(Duration::from_millis(200)));
    let coordinator = scripted(&source);
    let mut rx = coordinator.subscribe();

    coordinator.search_now("acme");
    let query = coordinator.state().query;
    assert!(coordinator.client().cancel(&query));

    let state = settled(&mut rx, |state| {
        state.phase == SearchPhase::Settled(SettledOutcome::Canceled)
    })
    .await;
    assert!(!state.is_searching);
    assert_eq!(state.error, None);
    assert_eq!(state.applied_sequence, 0);
}

#[tokio::test(start_paused = true)]
async fn cached_page_is_applied_without_waiting() {
    let source = Arc::new(ScriptedSource::new(Duration::from_millis(10)));
    let coordinator = scripted(&source);
    let mut rx = coordinator.subscribe();

    coordinator.search_now("acme");
    settled(&mut rx, |state| state.phase == SUCCESS).await;
    coordinator.search_now("globex");
    settled(&mut rx, |state| {
        state.phase == SUCCESS && state.query.term() == "globex"
    })
    .await;

    coordinator.search_now("acme");
    let state = coordinator.state();
    assert_eq!(state.phase, SUCCESS);
    assert_eq!(state.results.records[0].company, "acme");
    assert_eq!(state.applied_sequence, 3);
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn repeating_the_applied_search_issues_nothing() {
    let source = Arc::new(ScriptedSource::new(Duration::from_millis(10)));
    let coordinator = scripted(&source);
    let mut rx = coordinator.subscribe();

    coordinator.search_now("acme");
    settled(&mut rx, |state| state.phase == SUCCESS).await;

    coordinator.search_now("acme");
    let state = coordinator.state();
    assert_eq!(state.phase, SUCCESS);
    assert_eq!(state.applied_sequence, 1);
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn sessions_sharing_a_client_share_calls() {
    let source = Arc::new(ScriptedSource::new(Duration::from_millis(50)));
    let shared: Arc<dyn SearchSource> = source.clone();
    let config = SearchConfig::default();
    let client = SearchClient::new(shared, &config);
    let first = QueryCoordinator::with_client(client.clone(), &config);
    let second = QueryCoordinator::with_client(client, &config);
    let mut first_rx = first.subscribe();
    let mut second_rx = second.subscribe();

    first.search_now("acme");
    second.search_now("acme");

    let one = settled(&mut first_rx, |state| state.phase == SUCCESS).await;
    let two = settled(&mut second_rx, |state| state.phase == SUCCESS).await;
    assert_eq!(one.results, two.results);
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutting_down_one_session_keeps_a_shared_call_alive() {
    let source = Arc::new(ScriptedSource::new(Duration::from_millis(200)));
    let shared: Arc<dyn SearchSource> = source.clone();
    let config = SearchConfig::default();
    let client = SearchClient::new(shared, &config);
    let staying = QueryCoordinator::with_client(client.clone(), &config);
    let leaving = QueryCoordinator::with_client(client, &config);
    let mut rx = staying.subscribe();

    staying.search_now("acme");
    leaving.search_now("acme");
    leaving.shutdown();
    assert_eq!(staying.client().in_flight().len(), 1);

    let state = settled(&mut rx, |state| state.phase.is_idle()).await;
    assert_eq!(state.phase, SUCCESS);
    assert_eq!(state.results.records[0].company, "acme");
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutting_down_the_only_waiting_session_aborts_its_call() {
    let source = Arc::new(ScriptedSource::new(Duration::from_millis(200)));
    let coordinator = scripted(&source);

    coordinator.search_now("acme");
    assert_eq!(coordinator.client().in_flight().len(), 1);
    coordinator.shutdown();
    assert!(coordinator.client().in_flight().is_empty());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(coordinator.client().cached_len(), 0);
    assert_eq!(coordinator.state().applied_sequence, 0);
}

#[tokio::test(start_paused = true)]
async fn focus_is_restored_after_each_update() {
    let coordinator = in_memory();
    let focus = Arc::new(RecordingFocus::new(FocusSnapshot::focused(3, 3)));
    coordinator.attach_focus_target(focus.clone());
    let mut rx = coordinator.subscribe();

    coordinator.handle_search_change("acm");
    let state = settled(&mut rx, |state| state.phase == SUCCESS).await;

    let restored = focus.restored();
    assert!(!restored.is_empty());
    assert!(restored.iter().all(|snapshot| *snapshot == FocusSnapshot::focused(3, 3)));
    assert_eq!(state.focus, Some(FocusSnapshot::focused(3, 3)));
}

#[tokio::test(start_paused = true)]
async fn unfocused_input_is_never_refocused() {
    let coordinator = in_memory();
    let focus = Arc::new(RecordingFocus::new(FocusSnapshot::default()));
    coordinator.attach_focus_target(focus.clone());
    let mut rx = coordinator.subscribe();

    coordinator.handle_search_change("acm");
    let state = settled(&mut rx, |state| state.phase == SUCCESS).await;

    assert!(focus.restored().is_empty());
    assert_eq!(state.focus, None);
}

#[tokio::test(start_paused = true)]
async fn input_events_carry_their_cursor_into_the_state() {
    let coordinator = in_memory();

    coordinator.handle_input_event(InputEvent::typed("eng"));

    let state = coordinator.state();
    assert_eq!(state.search_term, "eng");
    assert_eq!(state.focus, Some(FocusSnapshot::focused(3, 3)));
}

#[tokio::test(start_paused = true)]
async fn filter_changes_search_immediately_from_the_first_page() {
    let coordinator = in_memory();
    let mut rx = coordinator.subscribe();

    coordinator.set_page(2);
    settled(&mut rx, |state| state.phase == SUCCESS && state.query.page() == 2).await;

    coordinator.set_status_filter(Some("Offer".to_string()));
    let state = settled(&mut rx, |state| {
        state.phase == SUCCESS && state.query.status() == Some("Offer")
    })
    .await;
    assert_eq!(state.query.page(), 1);
    assert_eq!(state.results.total, 1);
    assert_eq!(state.results.records[0].company, "Globex");

    coordinator.set_status_filter(None);
    coordinator.set_follow_up(FollowUpFilter::Required);
    let state = settled(&mut rx, |state| {
        state.phase == SUCCESS && state.query.follow_up() == FollowUpFilter::Required
    })
    .await;
    assert_eq!(state.query.status(), None);
    assert_eq!(state.results.records[0].company, "Acme");
}

#[tokio::test(start_paused = true)]
async fn filters_keep_the_visible_term() {
    let coordinator = in_memory();
    let mut rx = coordinator.subscribe();

    coordinator.set_search_term("engineer");
    coordinator.set_status_filter(Some("Applied".to_string()));

    let state = settled(&mut rx, |state| state.phase == SUCCESS).await;
    assert_eq!(state.query.term(), "engineer");
    assert_eq!(state.results.total, 1);
    assert_eq!(state.results.records[0].company, "Acme");
}

#[tokio::test(start_paused = true)]
async fn reset_returns_to_the_unfiltered_term() {
    let coordinator = in_memory();
    let mut rx = coordinator.subscribe();

    coordinator.search_now("acme");
    settled(&mut rx, |state| state.phase == SUCCESS).await;

    coordinator.handle_search_change("glob");
    coordinator.reset_search();

    let state = settled(&mut rx, |state| {
        state.phase == SUCCESS && state.query.term().is_empty()
    })
    .await;
    assert_eq!(state.search_term, "");
    assert_eq!(state.results.total, 3);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(coordinator.state().query.term(), "");
}

#[tokio::test(start_paused = true)]
async fn refresh_bypasses_the_cache() {
    let source = Arc::new(ScriptedSource::new(Duration::from_millis(10)));
    let coordinator = scripted(&source);
    let mut rx = coordinator.subscribe();

    coordinator.search_now("acme");
    settled(&mut rx, |state| state.phase == SUCCESS).await;

    coordinator.refresh();
    let state = settled(&mut rx, |state| {
        state.phase == SUCCESS && state.applied_sequence == 2
    })
    .await;
    assert_eq!(state.results.records[0].company, "acme");
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn shutdown_drops_pending_input() {
    let source = Arc::new(ScriptedSource::new(Duration::from_millis(10)));
    let coordinator = scripted(&source);

    coordinator.handle_search_change("acme");
    coordinator.shutdown();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(source.calls(), 0);
    assert_eq!(coordinator.state().applied_sequence, 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_session_drops_pending_input() {
    let source = Arc::new(ScriptedSource::new(Duration::from_millis(10)));
    let coordinator = scripted(&source);

    coordinator.handle_search_change("acme");
    drop(coordinator);
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(source.calls(), 0);
}
