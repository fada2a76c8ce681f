//! Order and reversibility checks.

use super::{AuditReport, Auditor};
use crate::domain::baseline::{Baseline, Posting};
use crate::domain::catalog::value_hash;
use crate::domain::errors::IndexError;
use std::fs::File;
use std::io;

/// Verifies that catalogs are sorted and that every record can be walked
/// back: the posting it points at names the catalog's attribute and a value
/// with the record's hash, and seeking that value lands on the same record.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReversiveAuditor;

impl Auditor for ReversiveAuditor {
    fn name(&self) -> &'static str {
        "reversive"
    }

    fn audit(&self, baseline: &Baseline, report: &mut AuditReport) -> Result<(), IndexError> {
        let name = self.name();
        let data_path = baseline.data_path();
        let data_len = baseline.data_len()?;
        let mut data = File::open(&data_path).map_err(IndexError::at(&data_path))?;

        for (attribute, catalog) in baseline.catalogs() {
            if !catalog.path().exists() {
                report.fail(name, format!("catalog for '{}' is missing", attribute));
                continue;
            }
            let mut previous: Option<u32> = None;
            for (index, record) in catalog.records()?.enumerate() {
                let record = record?;
                report.checked();
                if let Some(previous) = previous {
                    if record.hash < previous {
                        report.fail(
                            name,
                            format!(
                                "'{}' record #{} hash {:#010x} follows {:#010x}",
                                attribute, index, record.hash, previous
                            ),
                        );
                    }
                }
                previous = Some(record.hash);

                let posting = match Posting::read_at(&mut data, record.position, data_len) {
                    Ok(posting) => posting,
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
                        ) =>
                    {
                        report.fail(
                            name,
                            format!(
                                "'{}' record #{} cannot be walked back from {}: {}",
                                attribute, index, record.position, e
                            ),
                        );
                        continue;
                    }
                    Err(e) => return Err(IndexError::io(&data_path, e)),
                };
                if posting.attribute != *attribute {
                    report.fail(
                        name,
                        format!(
                            "'{}' record #{} points at a posting of '{}'",
                            attribute, index, posting.attribute
                        ),
                    );
                    continue;
                }
                if value_hash(&posting.value) != record.hash {
                    report.fail(
                        name,
                        format!(
                            "'{}' record #{} hash {:#010x} does not match value '{}'",
                            attribute, index, record.hash, posting.value
                        ),
                    );
                    continue;
                }
                let found = catalog.seek(&posting.value)?;
                if found != record.position {
                    report.fail(
                        name,
                        format!(
                            "'{}'='{}' seeks to {} instead of {}",
                            attribute, posting.value, found, record.position
                        ),
                    );
                }
            }
        }
        Ok(())
    }
}
