//! In-memory backend and scenario runner
//!
//! [`InMemoryBackend`] plays the server side of both endpoints with
//! sequential numeric ids and the same validation the real backend applies
//! to `reported`. Its [`BackendBehavior`] injects the failures the
//! coordinator has to survive: a failing bulk call, a failing entry save,
//! dropped response positions and echoed correlation keys.
//!
//! [`run_scenario`] builds a randomized form, submits it once and reports
//! what happened. The `entry-sync simulate` command is a thin wrapper
//! around it.

use crate::api::{EntryApi, FigureBulkApi};
use crate::config::SyncConfig;
use crate::coordinator::{EntrySaveCoordinator, RoundSummary};
use crate::error::{SaveError, TransportError};
use crate::notify::{CollectingNotifier, Notification};
use crate::options::OptionStore;
use async_trait::async_trait;
use entry_model::{
    BulkRequest, BulkResponse, Entry, EntryForm, EntrySaveResponse, ErrorPayload, Figure,
    FigureCollection, ItemErrors, LinkedEntity, ModelError, OptionKind, SavedItem, ServerId,
};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Message the backend attaches to a missing required field
pub const REQUIRED_MESSAGE: &str = "This field is required.";

/// Failure injection for [`InMemoryBackend`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendBehavior {
    /// Zero-based bulk call that fails with a 503
    pub fail_bulk_call: Option<usize>,
    /// Every entry save fails at the network level
    pub fail_entry_save: bool,
    /// Save positions within a page that get neither result nor error
    pub drop_save_positions: Vec<usize>,
    /// Echo correlation keys and return compact (unaligned) lists
    pub echo_keys: bool,
    /// Delay before answering any call
    pub latency: Option<Duration>,
}

impl BackendBehavior {
    /// Fail the n-th bulk call (zero-based)
    #[must_use]
    pub fn failing_bulk_call(mut self, call: usize) -> Self {
        self.fail_bulk_call = Some(call);
        self
    }

    /// Fail every entry save
    #[must_use]
    pub fn failing_entry_save(mut self) -> Self {
        self.fail_entry_save = true;
        self
    }

    /// Drop these save positions from every page's response
    #[must_use]
    pub fn dropping_saves(mut self, positions: impl IntoIterator<Item = usize>) -> Self {
        self.drop_save_positions = positions.into_iter().collect();
        self
    }

    /// Echo correlation keys
    #[must_use]
    pub fn echoing_keys(mut self) -> Self {
        self.echo_keys = true;
        self
    }

    /// Answer after a delay
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

#[derive(Debug, Default)]
struct BackendState {
    entries: HashMap<ServerId, Entry>,
    figures: HashMap<ServerId, Figure>,
    next_entry_id: u64,
    next_figure_id: u64,
    bulk_calls: usize,
    entry_calls: usize,
}

impl BackendState {
    fn entry_id(&mut self) -> ServerId {
        self.next_entry_id += 1;
        ServerId::from(self.next_entry_id)
    }

    fn figure_id(&mut self) -> ServerId {
        self.next_figure_id += 1;
        ServerId::from(self.next_figure_id)
    }

    fn save_figure(&mut self, entry: &ServerId, mut figure: Figure) -> Result<Figure, ItemErrors> {
        if figure.reported.unwrap_or(0) == 0 {
            return Err(vec![ErrorPayload::field("reported", REQUIRED_MESSAGE)]);
        }
        let id = match figure.id.clone() {
            Some(id) if self.figures.contains_key(&id) => id,
            Some(id) => {
                return Err(vec![ErrorPayload::field(
                    "nonFieldErrors",
                    format!("Figure {id} does not exist."),
                )]);
            }
            None => {
                let id = self.figure_id();
                figure.id = Some(id.clone());
                id
            }
        };
        figure.entry = Some(entry.clone());
        self.figures.insert(id, figure.clone());
        Ok(figure)
    }
}

/// Server side of both endpoints, kept in memory
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    behavior: BackendBehavior,
    state: Mutex<BackendState>,
}

impl InMemoryBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new(behavior: BackendBehavior) -> Self {
        Self {
            behavior,
            state: Mutex::new(BackendState::default()),
        }
    }

    /// Store an entry directly, assigning an id
    pub fn seed_entry(&self, mut entry: Entry) -> Entry {
        let mut state = self.state.lock();
        let id = state.entry_id();
        entry.id = Some(id.clone());
        state.entries.insert(id, entry.clone());
        entry
    }

    /// Store a figure directly, assigning an id
    pub fn seed_figure(&self, entry: &ServerId, mut figure: Figure) -> Figure {
        let mut state = self.state.lock();
        let id = state.figure_id();
        figure.id = Some(id.clone());
        figure.entry = Some(entry.clone());
        state.figures.insert(id, figure.clone());
        figure
    }

    /// Stored figure
    #[must_use]
    pub fn figure(&self, id: &ServerId) -> Option<Figure> {
        self.state.lock().figures.get(id).cloned()
    }

    /// Stored entry
    #[must_use]
    pub fn entry(&self, id: &ServerId) -> Option<Entry> {
        self.state.lock().entries.get(id).cloned()
    }

    /// Number of stored figures
    #[must_use]
    pub fn figure_count(&self) -> usize {
        self.state.lock().figures.len()
    }

    /// Bulk calls received, failed ones included
    #[must_use]
    pub fn bulk_calls(&self) -> usize {
        self.state.lock().bulk_calls
    }

    /// Entry saves received, failed ones included
    #[must_use]
    pub fn entry_calls(&self) -> usize {
        self.state.lock().entry_calls
    }

    async fn delay(&self) {
        if let Some(latency) = self.behavior.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl EntryApi<Entry> for InMemoryBackend {
    async fn save_entry(
        &self,
        mut entry: Entry,
    ) -> Result<EntrySaveResponse<Entry>, TransportError> {
        self.delay().await;
        let mut state = self.state.lock();
        state.entry_calls += 1;

        if self.behavior.fail_entry_save {
            return Err(TransportError::Network("connection reset".into()));
        }
        if entry.article_title.trim().is_empty() {
            return Ok(EntrySaveResponse::rejected(vec![ErrorPayload::field(
                "articleTitle",
                REQUIRED_MESSAGE,
            )]));
        }

        let id = match entry.id.clone() {
            Some(id) if state.entries.contains_key(&id) => id,
            Some(id) => {
                return Ok(EntrySaveResponse::rejected(vec![ErrorPayload::field(
                    "nonFieldErrors",
                    format!("Entry {id} does not exist."),
                )]));
            }
            None => state.entry_id(),
        };
        entry.id = Some(id.clone());
        state.entries.insert(id, entry.clone());
        Ok(EntrySaveResponse::ok(entry))
    }
}

#[async_trait]
impl FigureBulkApi<Figure> for InMemoryBackend {
    async fn bulk_save(
        &self,
        entry: &ServerId,
        request: BulkRequest<Figure>,
    ) -> Result<BulkResponse<Figure>, TransportError> {
        self.delay().await;
        let mut state = self.state.lock();
        let call = state.bulk_calls;
        state.bulk_calls += 1;

        if self.behavior.fail_bulk_call == Some(call) {
            return Err(TransportError::Server {
                status: 503,
                message: "service unavailable".into(),
            });
        }
        if !state.entries.contains_key(entry) {
            return Err(TransportError::Server {
                status: 404,
                message: format!("entry {entry} not found"),
            });
        }

        let deleted: Vec<ServerId> = request
            .delete_ids
            .into_iter()
            .filter(|id| state.figures.remove(id).is_some())
            .collect();

        let dropped: HashSet<usize> = self.behavior.drop_save_positions.iter().copied().collect();
        let mut results = Vec::with_capacity(request.save_items.len());
        let mut errors = Vec::with_capacity(request.save_items.len());

        for (position, item) in request.save_items.into_iter().enumerate() {
            if dropped.contains(&position) {
                results.push(None);
                errors.push(None);
                continue;
            }
            match state.save_figure(entry, item.payload) {
                Ok(saved) => {
                    let saved = if self.behavior.echo_keys {
                        SavedItem::new(saved).with_uuid(item.uuid)
                    } else {
                        SavedItem::new(saved)
                    };
                    results.push(Some(saved));
                    errors.push(None);
                }
                Err(payloads) => {
                    let payloads = if self.behavior.echo_keys {
                        payloads
                            .into_iter()
                            .map(|p| p.with_client_id(item.uuid))
                            .collect()
                    } else {
                        payloads
                    };
                    results.push(None);
                    errors.push(Some(payloads));
                }
            }
        }

        if self.behavior.echo_keys {
            results.retain(Option::is_some);
            errors.retain(Option::is_some);
        }

        let mut response = BulkResponse::new().with_deleted(deleted);
        if results.iter().any(Option::is_some) {
            response = response.with_result(results);
        }
        if errors.iter().any(Option::is_some) {
            response = response.with_errors(errors);
        }
        Ok(response)
    }
}

/// Shape of a simulated form
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSpec {
    /// New figures to add
    pub figures: usize,
    /// Figures already saved on the server
    pub existing: usize,
    /// Existing figures to delete
    pub delete: usize,
    /// Share of edited or new figures left invalid
    pub invalid_ratio: f64,
    /// Seed of the generator
    pub seed: u64,
}

impl Default for ScenarioSpec {
    fn default() -> Self {
        Self {
            figures: 12,
            existing: 4,
            delete: 1,
            invalid_ratio: 0.1,
            seed: 7,
        }
    }
}

/// What a simulated submission did
#[derive(Debug)]
pub struct ScenarioReport {
    /// Summary, or the error the submission ended with
    pub outcome: Result<RoundSummary, SaveError>,
    /// Notifications in emission order
    pub notifications: Vec<Notification>,
    /// Bulk calls the backend received
    pub bulk_calls: usize,
    /// Visible figures left in the form
    pub figures_in_form: usize,
    /// Figures still carrying errors
    pub figures_with_errors: usize,
    /// Figures stored by the backend
    pub figures_on_server: usize,
    /// Cached organizations after the round
    pub cached_organizations: usize,
}

impl ScenarioReport {
    /// True when the submission returned a summary
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

const COUNTRIES: [&str; 5] = ["NPL", "IND", "BGD", "PAK", "LKA"];
const ORGANIZATIONS: [&str; 4] = ["OCHA", "IOM", "UNHCR", "IFRC"];

fn random_figure(rng: &mut StdRng, invalid_ratio: f64) -> Figure {
    let country = COUNTRIES[rng.random_range(0..COUNTRIES.len())];
    let mut figure = Figure::new(country);
    if !rng.random_bool(invalid_ratio) {
        figure.reported = Some(rng.random_range(1..=5000));
    }
    let org = rng.random_range(0..ORGANIZATIONS.len());
    figure.sources = vec![LinkedEntity::new(
        ServerId::new((org + 1).to_string()),
        ORGANIZATIONS[org],
    )];
    figure
}

/// Build a randomized form and submit it once
///
/// # Errors
/// `ModelError` if the generated form could not be edited
pub async fn run_scenario(
    config: SyncConfig,
    scenario: &ScenarioSpec,
    behavior: BackendBehavior,
) -> Result<ScenarioReport, ModelError> {
    let invalid_ratio = if scenario.invalid_ratio.is_finite() {
        scenario.invalid_ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut rng = StdRng::seed_from_u64(scenario.seed);
    let backend = Arc::new(InMemoryBackend::new(behavior));
    let notifier = Arc::new(CollectingNotifier::new());
    let options = Arc::new(OptionStore::new());

    let entry = backend.seed_entry(Entry::new("Monsoon floods displace thousands"));
    let mut existing = Vec::with_capacity(scenario.existing);
    if let Some(entry_id) = &entry.id {
        for _ in 0..scenario.existing {
            existing.push(backend.seed_figure(entry_id, random_figure(&mut rng, 0.0)));
        }
    }
    let mut form = EntryForm::new(entry).with_figures(FigureCollection::from_loaded(existing));

    let keys: Vec<_> = form.figures.records().iter().map(|r| r.key).collect();
    let delete = scenario.delete.min(keys.len());
    for key in &keys[..delete] {
        form.figures.remove(*key)?;
    }
    for key in &keys[delete..] {
        let reported = if rng.random_bool(invalid_ratio) {
            None
        } else {
            Some(rng.random_range(1..=5000))
        };
        form.figures.edit(*key, |f| f.reported = reported)?;
    }
    for _ in 0..scenario.figures {
        form.figures.add(random_figure(&mut rng, invalid_ratio));
    }

    tracing::info!(
        new = scenario.figures,
        existing = scenario.existing,
        delete,
        seed = scenario.seed,
        "running scenario"
    );

    let mut coordinator =
        EntrySaveCoordinator::<Figure, Entry>::new(config, backend.clone(), backend.clone())
            .with_notifier(notifier.clone())
            .with_options(options.clone());
    let outcome = coordinator.submit(&mut form).await;

    Ok(ScenarioReport {
        outcome,
        notifications: notifier.notifications(),
        bulk_calls: backend.bulk_calls(),
        figures_in_form: form.figures.visible().count(),
        figures_with_errors: form
            .figures
            .records()
            .iter()
            .filter(|r| r.errors.is_some())
            .count(),
        figures_on_server: backend.figure_count(),
        cached_organizations: options.len(OptionKind::Organization),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use entry_model::{CorrelationKey, SaveItem};

    fn item(figure: Figure) -> SaveItem<Figure> {
        SaveItem {
            payload: figure,
            uuid: CorrelationKey::new(),
        }
    }

    #[tokio::test]
    async fn bulk_save_validates_reported() {
        let backend = InMemoryBackend::new(BackendBehavior::default());
        let entry = backend.seed_entry(Entry::new("Cyclone"));
        let id = entry.id.unwrap();

        let response = backend
            .bulk_save(
                &id,
                BulkRequest {
                    save_items: vec![
                        item(Figure::new("NPL").with_reported(3)),
                        item(Figure::new("NPL")),
                    ],
                    delete_ids: vec![],
                },
            )
            .await
            .unwrap();

        assert_eq!(
            response.saved_at(0).and_then(|s| s.value.id.clone()),
            Some(ServerId::from(1))
        );
        assert!(response.saved_at(1).is_none());
        assert_eq!(response.errors_at(1).unwrap()[0].field, "reported");
    }

    #[tokio::test]
    async fn unknown_deletes_are_omitted() {
        let backend = InMemoryBackend::new(BackendBehavior::default());
        let entry = backend.seed_entry(Entry::new("Cyclone"));
        let id = entry.id.unwrap();
        let seeded = backend.seed_figure(&id, Figure::new("NPL").with_reported(1));

        let response = backend
            .bulk_save(
                &id,
                BulkRequest {
                    save_items: vec![],
                    delete_ids: vec![seeded.id.unwrap(), ServerId::from("999")],
                },
            )
            .await
            .unwrap();

        let deleted: Vec<_> = response.deleted_items().map(|d| d.id.clone()).collect();
        assert_eq!(deleted, vec![ServerId::from(1)]);
        assert_eq!(backend.figure_count(), 0);
    }

    #[tokio::test]
    async fn failing_call_is_counted() {
        let backend = InMemoryBackend::new(BackendBehavior::default().failing_bulk_call(0));
        let entry = backend.seed_entry(Entry::new("Cyclone"));

        let result = backend
            .bulk_save(
                entry.id.as_ref().unwrap(),
                BulkRequest {
                    save_items: vec![],
                    delete_ids: vec![],
                },
            )
            .await;

        assert!(matches!(result, Err(TransportError::Server { status: 503, .. })));
        assert_eq!(backend.bulk_calls(), 1);
    }

    #[tokio::test]
    async fn scenario_is_reproducible() {
        let scenario = ScenarioSpec::default();
        let first = run_scenario(SyncConfig::new(), &scenario, BackendBehavior::default())
            .await
            .unwrap();
        let second = run_scenario(SyncConfig::new(), &scenario, BackendBehavior::default())
            .await
            .unwrap();

        let messages = |r: &ScenarioReport| {
            r.notifications
                .iter()
                .map(|n| n.message.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(messages(&first), messages(&second));
        assert_eq!(first.bulk_calls, second.bulk_calls);
    }

    #[tokio::test]
    async fn all_valid_scenario_saves_everything() {
        let scenario = ScenarioSpec {
            figures: 15,
            existing: 3,
            delete: 1,
            invalid_ratio: 0.0,
            seed: 1,
        };
        let report = run_scenario(SyncConfig::new(), &scenario, BackendBehavior::default())
            .await
            .unwrap();

        let summary = report.outcome.as_ref().unwrap();
        assert_eq!(summary.counts.saved, 17);
        assert_eq!(summary.counts.deleted, 1);
        assert_eq!(summary.pages_sent, 2);
        assert_eq!(report.figures_in_form, 17);
        assert_eq!(report.figures_on_server, 17);
        assert_eq!(report.figures_with_errors, 0);
        assert!(report.cached_organizations > 0);
    }

    #[tokio::test]
    async fn non_finite_ratio_means_all_valid() {
        let scenario = ScenarioSpec {
            invalid_ratio: f64::NAN,
            ..ScenarioSpec::default()
        };
        let report = run_scenario(SyncConfig::new(), &scenario, BackendBehavior::default())
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.figures_with_errors, 0);
    }
}
