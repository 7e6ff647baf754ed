use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use imagebatch_contracts::events::{now_utc_iso, BatchEvent, EventWriter};
use imagebatch_contracts::records::{
    GenerationRecord, GenerationRecordStore, RecordEntry, RunSummary,
};
use imagebatch_contracts::sizes::{SizeResolver, SupportedSize};
use imagebatch_contracts::BatchError;
use sha2::{Digest, Sha256};

use crate::items::{ensure_unique_identifiers, GenerationItem};
use crate::providers::{GenerateRequest, ImageProvider};
use crate::error_chain_text;

const ERROR_MESSAGE_MAX_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Skipped,
    Succeeded { size: SupportedSize, bytes: usize },
    Failed { size: Option<SupportedSize>, message: String },
}

/// What happened to one item, handed to the progress observer.
#[derive(Debug, Clone)]
pub struct ItemReport<'a> {
    pub index: usize,
    pub total: usize,
    pub item: &'a GenerationItem,
    pub outcome: &'a ItemOutcome,
}

/// Drives a batch sequentially against one provider and one record file.
pub struct BatchRunner<'p> {
    provider: &'p dyn ImageProvider,
    store: GenerationRecordStore,
    resolver: SizeResolver,
    events: Option<EventWriter>,
    delay: Duration,
    batch_id: String,
}

impl<'p> BatchRunner<'p> {
    pub fn new(provider: &'p dyn ImageProvider, store: GenerationRecordStore) -> Self {
        Self {
            provider,
            store,
            resolver: SizeResolver::default(),
            events: None,
            delay: Duration::ZERO,
            batch_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_resolver(mut self, resolver: SizeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.batch_id = events.batch_id().to_string();
        self.events = Some(events);
        self
    }

    /// Pause after every attempted item. Skips never wait.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn store(&self) -> &GenerationRecordStore {
        &self.store
    }

    pub fn run(&self, items: &[GenerationItem]) -> Result<RunSummary, BatchError> {
        self.run_with(items, |_| {})
    }

    /// Processes `items` in order. Per-item failures are recorded and counted;
    /// only record or event-log failures end the run early.
    pub fn run_with<F>(
        &self,
        items: &[GenerationItem],
        mut on_item: F,
    ) -> Result<RunSummary, BatchError>
    where
        F: FnMut(&ItemReport<'_>),
    {
        ensure_unique_identifiers(items)?;
        let mut record = self.store.load()?;

        let mut summary = RunSummary {
            batch_id: self.batch_id.clone(),
            started_at: now_utc_iso(),
            total: items.len() as u64,
            ..RunSummary::default()
        };
        self.emit(BatchEvent::BatchStarted {
            total: items.len(),
            provider: self.provider.name().to_string(),
            record_path: self.store.path().to_string_lossy().to_string(),
            previously_succeeded: record.values().filter(|entry| entry.is_success()).count(),
        })?;

        for (index, item) in items.iter().enumerate() {
            let outcome = self.process_item(item, &mut record)?;
            match &outcome {
                ItemOutcome::Skipped => summary.skipped += 1,
                ItemOutcome::Succeeded { .. } => summary.succeeded += 1,
                ItemOutcome::Failed { .. } => summary.failed += 1,
            }
            on_item(&ItemReport {
                index,
                total: items.len(),
                item,
                outcome: &outcome,
            });
            if !matches!(outcome, ItemOutcome::Skipped) && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
        }

        summary.finished_at = now_utc_iso();
        self.emit(BatchEvent::BatchFinished {
            total: summary.total,
            succeeded: summary.succeeded,
            skipped: summary.skipped,
            failed: summary.failed,
        })?;
        Ok(summary)
    }

    fn process_item(
        &self,
        item: &GenerationItem,
        record: &mut GenerationRecord,
    ) -> Result<ItemOutcome, BatchError> {
        let identifier = item.identifier.as_str();
        let destination = item.destination.to_string_lossy().to_string();
        if record.get(identifier).is_some_and(RecordEntry::is_success) {
            self.emit(BatchEvent::ItemSkipped {
                identifier: identifier.to_string(),
                destination,
            })?;
            return Ok(ItemOutcome::Skipped);
        }

        let style = Some(item.style.clone()).filter(|style| !style.is_empty());
        let resolved = self
            .resolver
            .resolve(item.requested_width, item.requested_height);
        let attempt = resolved
            .as_ref()
            .map_err(|err| anyhow::anyhow!(err.to_string()))
            .and_then(|size| self.attempt(item, *size));

        match attempt {
            Ok((size, digest, bytes)) => {
                self.store
                    .record(record, identifier, RecordEntry::success(style))?;
                self.emit(BatchEvent::ItemSucceeded {
                    identifier: identifier.to_string(),
                    destination,
                    requested_size: item.requested_size(),
                    size: size.to_string(),
                    style: item.style.clone(),
                    bytes,
                    sha256: digest,
                })?;
                Ok(ItemOutcome::Succeeded { size, bytes })
            }
            Err(err) => {
                let message = error_chain_text(&err, ERROR_MESSAGE_MAX_CHARS);
                self.store
                    .record(record, identifier, RecordEntry::failed(style, message.clone()))?;
                let size = resolved.ok();
                self.emit(BatchEvent::ItemFailed {
                    identifier: identifier.to_string(),
                    destination,
                    requested_size: item.requested_size(),
                    size: size.map(|size| size.to_string()),
                    style: item.style.clone(),
                    error: message.clone(),
                })?;
                Ok(ItemOutcome::Failed { size, message })
            }
        }
    }

    /// Provider call plus destination write, as one fallible unit.
    fn attempt(
        &self,
        item: &GenerationItem,
        size: SupportedSize,
    ) -> Result<(SupportedSize, String, usize)> {
        let request = GenerateRequest {
            prompt: item.prompt.clone(),
            size,
            style: item.style.clone(),
        };
        let image = self
            .provider
            .generate(&request)
            .with_context(|| format!("{} failed for {}", self.provider.name(), item.identifier))?;
        write_destination(&item.destination, &image.bytes)?;
        let digest = hex::encode(Sha256::digest(&image.bytes));
        Ok((size, digest, image.bytes.len()))
    }

    fn emit(&self, event: BatchEvent) -> Result<(), BatchError> {
        let Some(events) = &self.events else {
            return Ok(());
        };
        events
            .emit(&event)
            .map(|_| ())
            .map_err(|err| BatchError::Event(format!("{err:#}")))
    }
}

fn write_destination(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::path::Path;
    use std::time::{Duration, Instant};

    use anyhow::{bail, Result};
    use imagebatch_contracts::events::EventWriter;
    use imagebatch_contracts::records::{GenerationRecordStore, RecordStatus};
    use imagebatch_contracts::sizes::{SizeCatalog, SizeResolver};
    use imagebatch_contracts::BatchError;
    use serde_json::Value;

    use super::{BatchRunner, ItemOutcome};
    use crate::items::{GenerationItem, StyleSweep};
    use crate::providers::{GenerateRequest, GeneratedImage, ImageProvider};

    /// Records every call and fails for prompts listed in `failing`.
    #[derive(Default)]
    struct ScriptedProvider {
        failing: RefCell<HashSet<String>>,
        calls: RefCell<Vec<GenerateRequest>>,
    }

    impl ScriptedProvider {
        fn failing_on(prompts: &[&str]) -> Self {
            let provider = Self::default();
            provider
                .failing
                .borrow_mut()
                .extend(prompts.iter().map(|prompt| prompt.to_string()));
            provider
        }

        fn heal(&self) {
            self.failing.borrow_mut().clear();
        }

        fn called_prompts(&self) -> Vec<String> {
            self.calls
                .borrow()
                .iter()
                .map(|request| request.prompt.clone())
                .collect()
        }
    }

    impl ImageProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate(&self, request: &GenerateRequest) -> Result<GeneratedImage> {
            self.calls.borrow_mut().push(request.clone());
            if self.failing.borrow().contains(&request.prompt) {
                bail!("HTTP 500 from provider for '{}'", request.prompt);
            }
            Ok(GeneratedImage {
                bytes: format!("{}@{}", request.prompt, request.size).into_bytes(),
                mime_type: Some("image/png".to_string()),
            })
        }
    }

    fn three_items(dir: &Path) -> Result<Vec<GenerationItem>> {
        Ok(vec![
            GenerationItem::new("one.png", "one", "512x512", "any", dir.join("one.png"))?,
            GenerationItem::new("two.png", "two", "1280x500", "any", dir.join("two.png"))?,
            GenerationItem::new("three.png", "three", "700x500", "any", dir.join("three.png"))?,
        ])
    }

    #[test]
    fn second_run_skips_everything_after_full_success() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let items = three_items(&temp.path().join("imgs"))?;
        let store = GenerationRecordStore::new(temp.path().join("record.json"));
        let provider = ScriptedProvider::default();

        let first = BatchRunner::new(&provider, store.clone()).run(&items)?;
        assert_eq!((first.succeeded, first.skipped, first.failed), (3, 0, 0));

        let second = BatchRunner::new(&provider, store).run(&items)?;
        assert_eq!(second.total, 3);
        assert_eq!((second.succeeded, second.skipped, second.failed), (0, 3, 0));
        assert_eq!(provider.calls.borrow().len(), 3);
        Ok(())
    }

    #[test]
    fn skipped_items_do_not_wait_for_the_delay() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let items = three_items(&temp.path().join("imgs"))?;
        let store = GenerationRecordStore::new(temp.path().join("record.json"));
        let provider = ScriptedProvider::default();
        BatchRunner::new(&provider, store.clone()).run(&items)?;

        let started = Instant::now();
        let rerun = BatchRunner::new(&provider, store)
            .with_delay(Duration::from_secs(30))
            .run(&items)?;
        assert_eq!(rerun.skipped, 3);
        assert!(started.elapsed() < Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn failure_is_isolated_and_retried_on_next_run() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let items = three_items(&temp.path().join("imgs"))?;
        let store = GenerationRecordStore::new(temp.path().join("record.json"));
        let provider = ScriptedProvider::failing_on(&["two"]);

        let first = BatchRunner::new(&provider, store.clone()).run(&items)?;
        assert_eq!((first.succeeded, first.skipped, first.failed), (2, 0, 1));
        assert!(first.is_balanced());

        let record = store.load()?;
        let failed: Vec<&String> = record
            .iter()
            .filter(|(_, entry)| entry.status == RecordStatus::Failed)
            .map(|(identifier, _)| identifier)
            .collect();
        assert_eq!(failed, vec!["two.png"]);
        let error = record["two.png"].error.clone().unwrap_or_default();
        assert!(error.contains("HTTP 500"), "{error}");
        assert!(record["one.png"].error.is_none());
        assert!(!temp.path().join("imgs").join("two.png").exists());

        provider.heal();
        provider.calls.borrow_mut().clear();
        let second = BatchRunner::new(&provider, store.clone()).run(&items)?;
        assert_eq!((second.succeeded, second.skipped, second.failed), (1, 2, 0));
        assert_eq!(provider.called_prompts(), vec!["two"]);
        assert_eq!(store.load()?["two.png"].status, RecordStatus::Success);
        Ok(())
    }

    #[test]
    fn provider_receives_resolved_catalog_size_and_destination_gets_bytes() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let items = three_items(&temp.path().join("imgs"))?;
        let provider = ScriptedProvider::default();
        let resolver = SizeResolver::new(SizeCatalog::parse(&[
            "1024x1024",
            "1536x1024",
            "1024x1536",
        ])?);

        BatchRunner::new(&provider, GenerationRecordStore::new(temp.path().join("r.json")))
            .with_resolver(resolver)
            .run(&items)?;

        let sizes: Vec<String> = provider
            .calls
            .borrow()
            .iter()
            .map(|request| request.size.to_string())
            .collect();
        assert_eq!(sizes, vec!["1024x1024", "1536x1024", "1536x1024"]);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("imgs").join("two.png"))?,
            "two@1536x1024"
        );
        Ok(())
    }

    #[test]
    fn invalid_requested_size_is_recorded_as_item_failure() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut items = three_items(temp.path())?;
        items[0] = GenerationItem::new("zero.png", "zero", "0x500", "any", temp.path().join("z"))?;
        let store = GenerationRecordStore::new(temp.path().join("record.json"));
        let provider = ScriptedProvider::default();

        let summary = BatchRunner::new(&provider, store.clone()).run(&items)?;
        assert_eq!((summary.succeeded, summary.failed), (2, 1));
        assert!(!provider.called_prompts().contains(&"zero".to_string()));
        let error = store.load()?["zero.png"].error.clone().unwrap_or_default();
        assert!(error.contains("invalid input"), "{error}");
        Ok(())
    }

    #[test]
    fn corrupt_record_aborts_before_any_provider_call() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("record.json");
        std::fs::write(&path, "not json")?;
        let provider = ScriptedProvider::default();

        let err = BatchRunner::new(&provider, GenerationRecordStore::new(&path))
            .run(&three_items(temp.path())?)
            .err();
        assert!(matches!(err, Some(BatchError::CorruptRecord { .. })));
        assert!(provider.calls.borrow().is_empty());
        Ok(())
    }

    /// Turns the record path into a non-empty directory mid-run.
    struct RecordClobberingProvider {
        record_path: std::path::PathBuf,
        calls: RefCell<usize>,
    }

    impl ImageProvider for RecordClobberingProvider {
        fn name(&self) -> &str {
            "clobber"
        }

        fn generate(&self, _request: &GenerateRequest) -> Result<GeneratedImage> {
            *self.calls.borrow_mut() += 1;
            std::fs::create_dir_all(self.record_path.join("occupied"))?;
            Ok(GeneratedImage {
                bytes: b"png".to_vec(),
                mime_type: None,
            })
        }
    }

    #[test]
    fn record_persist_failure_aborts_the_run() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let record_path = temp.path().join("record.json");
        let provider = RecordClobberingProvider {
            record_path: record_path.clone(),
            calls: RefCell::new(0),
        };

        let err = BatchRunner::new(&provider, GenerationRecordStore::new(&record_path))
            .run(&three_items(&temp.path().join("imgs"))?)
            .err();
        assert!(matches!(err, Some(BatchError::StorageWrite { .. })));
        assert_eq!(*provider.calls.borrow(), 1);
        Ok(())
    }

    #[test]
    fn duplicate_identifiers_are_rejected_up_front() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let mut items = three_items(temp.path())?;
        items[2].identifier = "one.png".to_string();
        let provider = ScriptedProvider::default();

        let err = BatchRunner::new(&provider, GenerationRecordStore::new(temp.path().join("r")))
            .run(&items)
            .err();
        assert!(matches!(err, Some(BatchError::InvalidInput(_))));
        assert!(provider.calls.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn counts_always_balance() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let sweep = StyleSweep {
            prefix: "hero".to_string(),
            prompt: "p".to_string(),
            size: "1280x500".to_string(),
            out_dir: temp.path().join("styles"),
        };
        let styles = ["any", "digital_illustration", "realistic_image/hdr", "realistic_image/b_and_w"];
        let items = sweep.items(&styles)?;
        let store = GenerationRecordStore::new(temp.path().join("styles.json"));

        let provider = ScriptedProvider::failing_on(&["p"]);
        let first = BatchRunner::new(&provider, store.clone()).run(&items[..2])?;
        assert_eq!((first.total, first.failed), (2, 2));
        assert!(first.is_balanced());

        provider.heal();
        let second = BatchRunner::new(&provider, store.clone()).run(&items)?;
        assert_eq!((second.total, second.succeeded, second.skipped), (4, 4, 0));
        assert!(second.is_balanced());

        let record = store.load()?;
        assert_eq!(
            record["hero_style_03_realistic_image_hdr.png"].style.as_deref(),
            Some("realistic_image/hdr")
        );
        Ok(())
    }

    #[test]
    fn observer_and_event_log_see_every_item() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let items = three_items(&temp.path().join("imgs"))?;
        let events_path = temp.path().join("events.jsonl");
        let provider = ScriptedProvider::failing_on(&["three"]);
        let mut seen = Vec::new();

        let runner = BatchRunner::new(&provider, GenerationRecordStore::new(temp.path().join("r")))
            .with_events(EventWriter::new(&events_path, "batch-test"))
            .with_delay(Duration::from_millis(1));
        assert_eq!(runner.batch_id(), "batch-test");
        let summary = runner.run_with(&items, |report| {
            seen.push((report.index, report.item.identifier.clone(), report.outcome.clone()));
        })?;
        assert_eq!(summary.batch_id, "batch-test");

        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[0].2, ItemOutcome::Succeeded { .. }));
        assert!(matches!(seen[2].2, ItemOutcome::Failed { .. }));

        let types: Vec<String> = std::fs::read_to_string(events_path)?
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect();
        assert_eq!(
            types,
            vec![
                "batch_started",
                "item_succeeded",
                "item_succeeded",
                "item_failed",
                "batch_finished"
            ]
        );
        Ok(())
    }
}
