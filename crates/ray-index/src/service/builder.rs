//! # Index Builder
//!
//! Batch compilation of pending notices into a new baseline:
//!
//! ```text
//! stash ──snapshot──→ fold into previous state ──→ candidate
//!                                                      │ audit
//!                        publish, mark notices done ←──┘ ok
//! ```
//!
//! A rejected candidate is discarded; the previous baseline stays current and
//! every notice stays pending for the next attempt.

use super::store::BaselineStore;
use crate::domain::audit::{AuditOptions, AuditReport, CompositeAuditor};
use crate::domain::baseline::{Baseline, BaselineWriter, Posting};
use crate::domain::config::IndexConfig;
use crate::domain::errors::IndexError;
use crate::domain::notice::{Notice, Target};
use crate::ports::outbound::{Stash, SystemTimeSource, TimeSource};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

/// attribute → target → value
type State = BTreeMap<String, BTreeMap<Target, String>>;

/// Outcome of one [`IndexBuilder::build`] call.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Published version, or `None` when the stash was empty.
    pub version: Option<u64>,
    /// Notices folded into the baseline.
    pub notices: usize,
    /// Notices dropped because they can never be indexed.
    pub rejected: usize,
    pub attributes: usize,
    /// Distinct (attribute, value) postings written.
    pub values: usize,
    pub audit: Option<AuditReport>,
    pub duration_ms: u64,
}

/// Single writer over a [`BaselineStore`].
pub struct IndexBuilder<T: TimeSource = SystemTimeSource> {
    store: BaselineStore,
    auditor: CompositeAuditor,
    options: AuditOptions,
    time: T,
}

impl IndexBuilder<SystemTimeSource> {
    pub fn new(store: BaselineStore) -> Self {
        Self::with_time_source(store, SystemTimeSource)
    }

    /// Open the configured store with the configured audit switches.
    pub fn from_config(config: &IndexConfig) -> Result<Self, IndexError> {
        config.validate()?;
        let store = BaselineStore::open(config.baselines_dir(), config.retained_baselines)?;
        Ok(Self::new(store).with_options(config.audit))
    }
}

impl<T: TimeSource> IndexBuilder<T> {
    pub fn with_time_source(store: BaselineStore, time: T) -> Self {
        Self {
            store,
            auditor: CompositeAuditor::default(),
            options: AuditOptions::default(),
            time,
        }
    }

    pub fn with_auditor(mut self, auditor: CompositeAuditor) -> Self {
        self.auditor = auditor;
        self
    }

    pub fn with_options(mut self, options: AuditOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &BaselineStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut BaselineStore {
        &mut self.store
    }

    /// Fold every pending notice of `stash` into a new baseline.
    ///
    /// Notices failing [`Notice::validate`] are marked done and skipped.
    ///
    /// # Errors
    ///
    /// - `DeserializationFailure` if a stash entry is corrupt (nothing is built)
    /// - `AuditFailure` if the candidate is rejected (nothing is published)
    pub fn build(&mut self, stash: &dyn Stash) -> Result<BuildReport, IndexError> {
        let started = Instant::now();
        let snapshot = stash.iter()?.collect::<Result<Vec<Notice>, _>>()?;

        // Notices that can never be indexed are marked done and left out
        let mut notices = Vec::with_capacity(snapshot.len());
        let mut rejected = 0;
        for notice in snapshot {
            match notice.validate() {
                Ok(()) => notices.push(notice),
                Err(e) => {
                    tracing::warn!("[ray-index] Dropping notice from the build: {}", e);
                    stash.remove(&notice)?;
                    rejected += 1;
                }
            }
        }
        if notices.is_empty() {
            tracing::info!("[ray-index] Nothing to index ({} notice(s) dropped)", rejected);
            return Ok(BuildReport {
                rejected,
                ..BuildReport::default()
            });
        }

        let mut state = self.load_state()?;
        let mut ordered: Vec<&Notice> = notices.iter().collect();
        ordered.sort_by(|a, b| a.timestamp().cmp(&b.timestamp()).then_with(|| a.cmp(b)));
        for notice in ordered {
            apply(&mut state, notice);
        }

        let version = self.store.next_version()?;
        let dir = self.store.candidate(version)?;
        let (candidate, attributes, values) =
            match self.write_candidate(&dir, version, state, notices.len() as u64) {
                Ok(written) => written,
                Err(e) => {
                    self.discard_quietly(&dir);
                    return Err(e);
                }
            };

        let audit = match self.auditor.audit(&candidate, &self.options) {
            Ok(report) => report,
            Err(e) => {
                self.discard_quietly(&dir);
                return Err(e);
            }
        };

        let published = self.store.publish(candidate)?;
        for notice in &notices {
            stash.remove(notice)?;
        }

        let report = BuildReport {
            version: Some(published.version()),
            notices: notices.len(),
            rejected,
            attributes,
            values,
            audit: Some(audit),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            "[ray-index] 🏗️ Built baseline v{} from {} notice(s): {} attribute(s), {} value(s) in {}ms",
            published.version(),
            report.notices,
            report.attributes,
            report.values,
            report.duration_ms
        );
        Ok(report)
    }

    /// Current baseline contents as attribute → target → value.
    fn load_state(&self) -> Result<State, IndexError> {
        let mut state = State::new();
        let Some(baseline) = self.store.current()? else {
            return Ok(state);
        };
        for entry in baseline.postings()? {
            let (position, posting) = entry.map_err(|e| {
                IndexError::corrupt_baseline(baseline.data_path(), e.to_string())
            })?;
            tracing::trace!("[ray-index] Loading posting at {}", position);
            let values = state.entry(posting.attribute).or_default();
            for target in posting.targets {
                values.insert(target, posting.value.clone());
            }
        }
        Ok(state)
    }

    fn write_candidate(
        &self,
        dir: &Path,
        version: u64,
        state: State,
        notices: u64,
    ) -> Result<(Baseline, usize, usize), IndexError> {
        let mut writer = BaselineWriter::create(dir)?;
        let mut attributes = 0;
        let mut values = 0;
        for (attribute, by_target) in state {
            let mut postings: BTreeMap<String, Vec<Target>> = BTreeMap::new();
            for (target, value) in by_target {
                postings.entry(value).or_default().push(target);
            }
            if postings.is_empty() {
                continue;
            }
            attributes += 1;
            for (value, targets) in postings {
                writer.append(&Posting {
                    attribute: attribute.clone(),
                    value,
                    targets,
                })?;
                values += 1;
            }
        }
        let baseline = writer.finish(version, self.time.now(), notices)?;
        Ok((baseline, attributes, values))
    }

    fn discard_quietly(&self, dir: &Path) {
        if let Err(e) = self.store.discard(dir) {
            tracing::warn!("[ray-index] Could not discard candidate: {}", e);
        }
    }
}

/// Apply one notice: each listed attribute is set for the target, and an
/// empty value clears it.
fn apply(state: &mut State, notice: &Notice) {
    for (attribute, value) in notice.attributes() {
        let values = state.entry(attribute.clone()).or_default();
        if value.is_empty() {
            values.remove(&notice.target());
        } else {
            values.insert(notice.target(), value.clone());
        }
    }
}
