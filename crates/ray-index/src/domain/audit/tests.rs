//! # Audit Tests

use super::*;
use crate::domain::baseline::{BaselineWriter, Posting};
use crate::domain::catalog::CatalogRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn clean_baseline(dir: &Path) -> Baseline {
    let mut writer = BaselineWriter::create(dir).unwrap();
    for (attribute, value, targets) in [
        ("bout", "1", vec![10, 11]),
        ("bout", "2", vec![12]),
        ("author", "jeff", vec![10, 12]),
    ] {
        writer
            .append(&Posting {
                attribute: attribute.to_string(),
                value: value.to_string(),
                targets,
            })
            .unwrap();
    }
    writer.finish(1, 1_000, 3).unwrap()
}

fn inject(baseline: &Baseline, attribute: &str, record: CatalogRecord) {
    let path = baseline.catalog(attribute).unwrap().path().to_path_buf();
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(&record.encode()).unwrap();
}

struct Failing(&'static str);

impl Auditor for Failing {
    fn name(&self) -> &'static str {
        self.0
    }

    fn audit(&self, _: &Baseline, report: &mut AuditReport) -> Result<(), IndexError> {
        report.fail(self.0, "always fails");
        Ok(())
    }
}

#[test]
fn test_default_registry_order() {
    assert_eq!(CompositeAuditor::default().names(), vec!["numbers", "reversive"]);
}

#[test]
fn test_clean_baseline_passes() {
    let tmp = TempDir::new().unwrap();
    let baseline = clean_baseline(tmp.path());

    let report = CompositeAuditor::default()
        .audit(&baseline, &AuditOptions::default())
        .unwrap();

    assert!(report.passed());
    assert!(!report.skipped);
    // three records, checked once by each auditor
    assert_eq!(report.records_checked, 6);
}

#[test]
fn test_injected_out_of_range_record_fails() {
    let tmp = TempDir::new().unwrap();
    let baseline = clean_baseline(tmp.path());
    let data_len = baseline.data_len().unwrap();
    inject(
        &baseline,
        "bout",
        CatalogRecord {
            hash: u32::MAX,
            position: data_len + 100,
        },
    );

    let result = CompositeAuditor::default().audit(&baseline, &AuditOptions::default());

    match result {
        Err(IndexError::AuditFailure { diagnostics }) => {
            assert_eq!(diagnostics.len(), 2);
            assert!(diagnostics[0].starts_with("numbers:"));
            assert!(diagnostics[0].contains("outside"));
            assert!(diagnostics[1].starts_with("reversive:"));
        }
        other => panic!("Expected AuditFailure, got {:?}", other),
    }
}

#[test]
fn test_reversive_alone_rejects_out_of_range_record() {
    let tmp = TempDir::new().unwrap();
    let baseline = clean_baseline(tmp.path());
    let data_len = baseline.data_len().unwrap();
    inject(
        &baseline,
        "bout",
        CatalogRecord {
            hash: u32::MAX,
            position: data_len + 100,
        },
    );

    let auditor = CompositeAuditor::with_auditors(vec![Box::new(ReversiveAuditor)]);
    match auditor.audit(&baseline, &AuditOptions::default()) {
        Err(IndexError::AuditFailure { diagnostics }) => {
            assert_eq!(diagnostics.len(), 1);
            assert!(diagnostics[0].starts_with("reversive:"));
            assert!(diagnostics[0].contains("cannot be walked back"));
        }
        other => panic!("Expected AuditFailure, got {:?}", other),
    }
}

#[test]
fn test_reversive_alone_reports_missing_catalog() {
    let tmp = TempDir::new().unwrap();
    let baseline = clean_baseline(tmp.path());
    std::fs::remove_file(baseline.catalog("author").unwrap().path()).unwrap();

    let auditor = CompositeAuditor::with_auditors(vec![Box::new(ReversiveAuditor)]);
    let err = auditor
        .audit(&baseline, &AuditOptions::default())
        .unwrap_err();
    assert!(err.to_string().contains("catalog for 'author' is missing"));
}

#[test]
fn test_skip_performs_no_checks() {
    let tmp = TempDir::new().unwrap();
    let baseline = clean_baseline(tmp.path());
    inject(
        &baseline,
        "bout",
        CatalogRecord {
            hash: u32::MAX,
            position: 1,
        },
    );

    let started = std::time::Instant::now();
    let report = CompositeAuditor::default()
        .audit(&baseline, &AuditOptions::skipping())
        .unwrap();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    assert!(report.skipped);
    // Elapsed time is recorded on the skip path too
    assert!(report.duration_ms <= elapsed_ms);
    assert!(report.passed());
    assert_eq!(report.records_checked, 0);
}

#[test]
fn test_unsorted_catalog_is_reported() {
    let tmp = TempDir::new().unwrap();
    let baseline = clean_baseline(tmp.path());
    let catalog = baseline.catalog("bout").unwrap();
    let mut records: Vec<_> = catalog.records().unwrap().map(|r| r.unwrap()).collect();
    records.reverse();
    let bytes: Vec<u8> = records.iter().flat_map(|r| r.encode()).collect();
    std::fs::write(catalog.path(), bytes).unwrap();

    let result = CompositeAuditor::default().audit(&baseline, &AuditOptions::default());

    match result {
        Err(IndexError::AuditFailure { diagnostics }) => {
            assert!(diagnostics
                .iter()
                .any(|d| d.starts_with("reversive:") && d.contains("follows")));
        }
        other => panic!("Expected AuditFailure, got {:?}", other),
    }
}

#[test]
fn test_record_pointing_at_other_attribute_is_reported() {
    let tmp = TempDir::new().unwrap();
    let baseline = clean_baseline(tmp.path());
    let jeff = baseline.seek("author", "jeff").unwrap();
    inject(
        &baseline,
        "bout",
        CatalogRecord {
            hash: u32::MAX,
            position: jeff,
        },
    );

    let result = CompositeAuditor::default().audit(&baseline, &AuditOptions::default());

    match result {
        Err(IndexError::AuditFailure { diagnostics }) => {
            assert!(diagnostics
                .iter()
                .any(|d| d.contains("points at a posting of 'author'")));
        }
        other => panic!("Expected AuditFailure, got {:?}", other),
    }
}

#[test]
fn test_all_auditors_run_and_aggregate() {
    let tmp = TempDir::new().unwrap();
    let baseline = clean_baseline(tmp.path());
    let auditor = CompositeAuditor::with_auditors(vec![
        Box::new(Failing("first")),
        Box::new(Failing("second")),
    ]);

    match auditor.audit(&baseline, &AuditOptions::default()) {
        Err(IndexError::AuditFailure { diagnostics }) => {
            assert_eq!(
                diagnostics,
                vec!["first: always fails", "second: always fails"]
            );
        }
        other => panic!("Expected AuditFailure, got {:?}", other),
    }
}

#[test]
fn test_report_caps_diagnostics() {
    let mut report = AuditReport::new();
    for i in 0..(MAX_DIAGNOSTICS + 5) {
        report.fail("numbers", format!("problem {}", i));
    }
    assert_eq!(report.diagnostics.len(), MAX_DIAGNOSTICS);
    assert_eq!(report.suppressed, 5);
    assert!(!report.passed());

    match report.into_failure() {
        IndexError::AuditFailure { diagnostics } => {
            assert_eq!(diagnostics.last().unwrap(), "... and 5 more");
        }
        other => panic!("Expected AuditFailure, got {:?}", other),
    }
}
