//! Numeric range checks: record sizes, positions and posting bounds.

use super::{AuditReport, Auditor};
use crate::domain::baseline::{Baseline, Posting, DATA_HEADER_LEN};
use crate::domain::catalog::RECORD_SIZE;
use crate::domain::errors::IndexError;
use std::fs::File;
use std::io;

/// Verifies that every catalog record points inside the data file at a
/// well-formed, non-empty posting block.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumbersAuditor;

impl Auditor for NumbersAuditor {
    fn name(&self) -> &'static str {
        "numbers"
    }

    fn audit(&self, baseline: &Baseline, report: &mut AuditReport) -> Result<(), IndexError> {
        let name = self.name();
        let data_path = baseline.data_path();
        let data_len = baseline.data_len()?;
        if data_len != baseline.manifest().data_len {
            report.fail(
                name,
                format!(
                    "data file is {} bytes, manifest says {}",
                    data_len,
                    baseline.manifest().data_len
                ),
            );
        }
        let mut data = File::open(&data_path).map_err(IndexError::at(&data_path))?;

        for (attribute, catalog) in baseline.catalogs() {
            let bytes = match catalog.byte_len() {
                Ok(bytes) => bytes,
                Err(IndexError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                    report.fail(name, format!("catalog for '{}' is missing", attribute));
                    continue;
                }
                Err(e) => return Err(e),
            };
            if bytes % RECORD_SIZE != 0 {
                report.fail(
                    name,
                    format!(
                        "catalog for '{}' is {} bytes, not a multiple of {}",
                        attribute, bytes, RECORD_SIZE
                    ),
                );
            }

            for record in catalog.records()? {
                let record = record?;
                report.checked();
                let position = record.position;
                if position < DATA_HEADER_LEN || position >= data_len {
                    report.fail(
                        name,
                        format!(
                            "'{}' position {} outside [{}, {})",
                            attribute, position, DATA_HEADER_LEN, data_len
                        ),
                    );
                    continue;
                }
                let posting = match Posting::read_at(&mut data, position, data_len) {
                    Ok(posting) => posting,
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof
                        ) =>
                    {
                        report.fail(
                            name,
                            format!("'{}' posting at {} is malformed: {}", attribute, position, e),
                        );
                        continue;
                    }
                    Err(e) => return Err(IndexError::io(&data_path, e)),
                };
                if posting.targets.is_empty() {
                    report.fail(
                        name,
                        format!("'{}' posting at {} has no targets", attribute, position),
                    );
                }
                if posting.targets.first() == Some(&0) {
                    report.fail(
                        name,
                        format!("'{}' posting at {} lists target zero", attribute, position),
                    );
                }
                if posting.targets.windows(2).any(|w| w[0] >= w[1]) {
                    report.fail(
                        name,
                        format!(
                            "'{}' posting at {} has targets out of order",
                            attribute, position
                        ),
                    );
                }
            }
        }
        Ok(())
    }
}
