//! Record unification: grouping, fill-forward/backward and text mining
//!
//! Two passes use the same grouping machinery:
//! - per file, where continuation rows inherit the customer id above them
//! - across the whole in-memory table, producing `UnifiedCustomer`s

use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;
use tracing::debug;

use crate::defaults::{PLACEHOLDER_NAME, PLACEHOLDER_SALESPERSON, REPORT_ARTIFACT_PHRASES};
use crate::services::phone_extractor::extract_phones;
use crate::services::zone_resolver::resolve_zone;
use crate::types::{CanonicalRecord, UnifiedCustomer, MAX_PHONES, SYNTHETIC_ID_PREFIX};

/// Errors raised inside a unification pass
#[derive(Debug, Error)]
pub enum UnifyError {
    #[error("grouping is not a partition: {grouped} grouped rows for {rows} input rows")]
    PartitionMismatch { rows: usize, grouped: usize },
    #[error("unification failed: {0}")]
    Internal(String),
}

/// How rows without a usable customer id are keyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackKey {
    /// `<Name>_<row>`
    #[default]
    NameAndIndex,
    /// `#<row>`
    RowIndex,
}

impl FromStr for FallbackKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name_index" | "name" => Ok(FallbackKey::NameAndIndex),
            "row_index" | "row" => Ok(FallbackKey::RowIndex),
            other => anyhow::bail!(
                "unknown fallback key policy '{}' (expected name_index or row_index)",
                other
            ),
        }
    }
}

/// Value used to cluster rows believed to be the same customer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    CustomerId(String),
    Synthetic(String),
}

impl GroupKey {
    pub fn for_record(record: &CanonicalRecord, index: usize, fallback: FallbackKey) -> Self {
        match record.real_customer_id() {
            Some(id) => GroupKey::CustomerId(id.to_string()),
            None => match fallback {
                FallbackKey::NameAndIndex => {
                    GroupKey::Synthetic(format!("{}_{}", record.name, index))
                }
                FallbackKey::RowIndex => GroupKey::Synthetic(format!("#{}", index)),
            },
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, GroupKey::Synthetic(_))
    }
}

/// Row indices per group, groups in order of first appearance
pub fn group_rows(keys: &[GroupKey]) -> Vec<Vec<usize>> {
    let mut index: HashMap<&GroupKey, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for (row, key) in keys.iter().enumerate() {
        let group = *index.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push(row);
    }

    groups
}

fn name_mut(r: &mut CanonicalRecord) -> &mut String {
    &mut r.name
}

fn salesperson_mut(r: &mut CanonicalRecord) -> &mut String {
    &mut r.salesperson
}

fn raw_zone_mut(r: &mut CanonicalRecord) -> &mut String {
    &mut r.raw_zone
}

const FILLED_FIELDS: [fn(&mut CanonicalRecord) -> &mut String; 3] =
    [name_mut, salesperson_mut, raw_zone_mut];

/// Propagate non-empty values across the members of one group.
///
/// `members` must be in ascending row order. The forward pass copies the
/// last seen value down; the backward pass fills leading gaps from the
/// first value found later in the group.
pub fn fill_group(records: &mut [CanonicalRecord], members: &[usize]) {
    for field in FILLED_FIELDS {
        let mut last: Option<String> = None;
        for &i in members {
            let value = field(&mut records[i]);
            if value.is_empty() {
                if let Some(v) = &last {
                    *value = v.clone();
                }
            } else {
                last = Some(value.clone());
            }
        }

        let mut next: Option<String> = None;
        for &i in members.iter().rev() {
            let value = field(&mut records[i]);
            if value.is_empty() {
                if let Some(v) = &next {
                    *value = v.clone();
                }
            } else {
                next = Some(value.clone());
            }
        }
    }
}

/// Group, fill and collapse to one representative per group
fn merge_groups(
    mut records: Vec<CanonicalRecord>,
    keys: Vec<GroupKey>,
) -> Result<Vec<(GroupKey, CanonicalRecord)>, UnifyError> {
    let groups = group_rows(&keys);
    let grouped: usize = groups.iter().map(Vec::len).sum();
    if grouped != records.len() || keys.len() != records.len() {
        return Err(UnifyError::PartitionMismatch { rows: records.len(), grouped });
    }

    let mut merged = Vec::with_capacity(groups.len());
    for members in &groups {
        fill_group(&mut records, members);

        let blob = members
            .iter()
            .map(|&i| records[i].row_text.as_str())
            .collect::<Vec<_>>()
            .join(" | ");

        let first = members[0];
        let mut representative = std::mem::take(&mut records[first]);
        representative.row_text = blob;
        merged.push((keys[first].clone(), representative));
    }

    Ok(merged)
}

/// First pass, inside one file.
///
/// Customer ids are filled down the file; rows above the first id get a
/// synthetic id so each of them forms its own group.
pub fn consolidate_file(
    mut records: Vec<CanonicalRecord>,
) -> Result<Vec<CanonicalRecord>, UnifyError> {
    let mut last_id: Option<String> = None;
    for (idx, record) in records.iter_mut().enumerate() {
        if record.customer_id.is_empty() {
            record.customer_id = match &last_id {
                Some(id) => id.clone(),
                None => format!("{}{}", SYNTHETIC_ID_PREFIX, idx),
            };
        } else {
            last_id = Some(record.customer_id.clone());
        }
    }

    let keys = records
        .iter()
        .map(|r| match r.real_customer_id() {
            Some(id) => GroupKey::CustomerId(id.to_string()),
            None => GroupKey::Synthetic(r.customer_id.clone()),
        })
        .collect();

    Ok(merge_groups(records, keys)?
        .into_iter()
        .map(|(_, record)| record)
        .collect())
}

fn is_report_artifact(name: &str) -> bool {
    let lowered = name.to_lowercase();
    REPORT_ARTIFACT_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Final unification stage, swappable for tests
pub trait Consolidator: Send + Sync {
    fn consolidate(
        &self,
        records: &[CanonicalRecord],
        progress: &mut dyn FnMut(u8, &str),
    ) -> Result<Vec<UnifiedCustomer>, UnifyError>;
}

/// Cross-file unifier producing the output table
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordUnifier {
    pub fallback: FallbackKey,
}

impl RecordUnifier {
    pub fn new(fallback: FallbackKey) -> Self {
        Self { fallback }
    }

    pub fn unify(&self, records: &[CanonicalRecord]) -> Result<Vec<UnifiedCustomer>, UnifyError> {
        self.consolidate(records, &mut |_, _| {})
    }
}

impl Consolidator for RecordUnifier {
    fn consolidate(
        &self,
        records: &[CanonicalRecord],
        progress: &mut dyn FnMut(u8, &str),
    ) -> Result<Vec<UnifiedCustomer>, UnifyError> {
        progress(5, "Standardizing in-memory table");

        let keys: Vec<GroupKey> = records
            .iter()
            .enumerate()
            .map(|(idx, r)| GroupKey::for_record(r, idx, self.fallback))
            .collect();

        progress(15, "Grouping duplicate customers");
        let merged = merge_groups(records.to_vec(), keys)?;

        let total = merged.len();
        let step = (total / 20).max(1);
        let mut customers = Vec::with_capacity(total);
        let mut dropped = 0usize;

        for (idx, (key, record)) in merged.into_iter().enumerate() {
            if idx % step == 0 {
                let percent = 15 + (idx * 85 / total) as u8;
                progress(percent, &format!("Processing customer {} of {}", idx, total));
            }

            let phones = extract_phones(&record.row_text);
            let zone = resolve_zone(&record.row_text, &record.raw_zone);

            if record.name.is_empty() && key.is_synthetic() && phones.is_empty() {
                dropped += 1;
                continue;
            }
            if is_report_artifact(&record.name) {
                dropped += 1;
                continue;
            }

            let customer_id = match key {
                GroupKey::CustomerId(id) => id,
                GroupKey::Synthetic(_) => String::new(),
            };

            customers.push(UnifiedCustomer {
                name: if record.name.is_empty() {
                    PLACEHOLDER_NAME.to_string()
                } else {
                    record.name
                },
                customer_id,
                resolved_zone: zone,
                salesperson: if record.salesperson.is_empty() {
                    PLACEHOLDER_SALESPERSON.to_string()
                } else {
                    record.salesperson
                },
                phones: phones.into_iter().take(MAX_PHONES).collect(),
            });
        }

        debug!(
            "Unified {} rows into {} customers ({} junk groups dropped)",
            records.len(),
            customers.len(),
            dropped
        );
        progress(100, "Consolidation finished");

        Ok(customers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ingestion::grid_to_records;

    fn record(id: &str, name: &str, salesperson: &str, text: &str) -> CanonicalRecord {
        CanonicalRecord {
            name: name.to_string(),
            customer_id: id.to_string(),
            salesperson: salesperson.to_string(),
            row_text: text.to_string(),
            ..Default::default()
        }
    }

    fn grid(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_shared_id_merges_name_and_salesperson() {
        let rows = vec![
            record("C1", "Acme", "", "Acme"),
            record("C1", "", "Diaz", "Diaz | 1144455566"),
        ];

        let customers = RecordUnifier::default().unify(&rows).unwrap();

        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].name, "Acme");
        assert_eq!(customers[0].salesperson, "Diaz");
        assert_eq!(customers[0].customer_id, "C1");
        assert_eq!(customers[0].phones, vec!["1144455566"]);
    }

    #[test]
    fn test_groups_form_a_partition() {
        let keys = vec![
            GroupKey::CustomerId("a".into()),
            GroupKey::Synthetic("x_1".into()),
            GroupKey::CustomerId("a".into()),
            GroupKey::CustomerId("b".into()),
        ];
        let groups = group_rows(&keys);

        assert_eq!(groups, vec![vec![0, 2], vec![1], vec![3]]);
        let mut all: Vec<usize> = groups.concat();
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_fill_forward_then_backward() {
        let mut rows = vec![
            record("", "", "", ""),
            record("", "X", "", ""),
            record("", "", "V", ""),
            record("", "Y", "", ""),
            record("", "", "", ""),
        ];
        fill_group(&mut rows, &[0, 1, 2, 3, 4]);

        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["X", "X", "X", "Y", "Y"]);
        let sellers: Vec<&str> = rows.iter().map(|r| r.salesperson.as_str()).collect();
        assert_eq!(sellers, vec!["V", "V", "V", "V", "V"]);
    }

    #[test]
    fn test_fill_stays_inside_group() {
        let mut rows = vec![record("", "A", "", ""), record("", "", "", "")];
        fill_group(&mut rows, &[1]);
        assert_eq!(rows[1].name, "");
    }

    #[test]
    fn test_consolidate_file_inherits_id_from_row_above() {
        let rows = vec![
            record("", "Banner", "", "Banner"),
            record("77", "Lopez", "", "77 | Lopez"),
            record("", "", "Diaz", "1144455566 | Diaz"),
        ];

        let merged = consolidate_file(rows).unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].customer_id, "SinID_0");
        assert_eq!(merged[1].customer_id, "77");
        assert_eq!(merged[1].salesperson, "Diaz");
        assert_eq!(merged[1].row_text, "77 | Lopez | 1144455566 | Diaz");
    }

    #[test]
    fn test_synthetic_ids_from_different_files_do_not_collide() {
        let file_a = consolidate_file(vec![record("", "Lopez", "", "Lopez | 1144455566")]).unwrap();
        let file_b = consolidate_file(vec![record("", "Perez", "", "Perez | 42901234")]).unwrap();
        assert_eq!(file_a[0].customer_id, file_b[0].customer_id);

        let table: Vec<_> = file_a.into_iter().chain(file_b).collect();
        let customers = RecordUnifier::default().unify(&table).unwrap();

        assert_eq!(customers.len(), 2);
        assert!(customers.iter().all(|c| c.customer_id.is_empty()));
    }

    #[test]
    fn test_junk_groups_are_dropped() {
        let rows = vec![
            record("SinID_0", "", "", "sin datos"),
            record("SinID_1", "", "", "1144455566"),
            record("SinID_2", "Fecha: 01/02/2024", "", ""),
            record("SinID_3", "WOOD TOOLS - Listado", "", ""),
            record("SinID_4", "Ordenado por Código", "", ""),
            record("C9", "", "", ""),
        ];

        let customers = RecordUnifier::default().unify(&rows).unwrap();

        assert_eq!(customers.len(), 2);
        assert_eq!(customers[0].name, PLACEHOLDER_NAME);
        assert_eq!(customers[0].phones, vec!["1144455566"]);
        assert_eq!(customers[1].customer_id, "C9");
        assert_eq!(customers[1].salesperson, PLACEHOLDER_SALESPERSON);
    }

    #[test]
    fn test_at_most_five_phones() {
        let text = "11111111 / 22222222 / 33333333 / 44444444 / 55555555 / 66666666";
        let rows = [record("C1", "Acme", "", text)];
        let customers = RecordUnifier::default().unify(&rows).unwrap();
        assert_eq!(customers[0].phones.len(), MAX_PHONES);
        assert_eq!(customers[0].phones[4], "55555555");
    }

    #[test]
    fn test_zone_resolved_from_group_text() {
        let mut row = record("C1", "Acme", "", "Acme | reparto 142");
        row.raw_zone = "Rosario".into();
        let customers = RecordUnifier::default().unify(&[row]).unwrap();
        assert!(customers[0].resolved_zone.starts_with("142 | ROSARIO"));
    }

    #[test]
    fn test_self_merge_is_idempotent() {
        let mut rows = vec![
            record("C1", "Acme", "", "Acme | 1144455566"),
            record("C1", "", "Diaz", "Diaz | zona sur"),
            record("", "Lopez", "", "Lopez | Merlo | 42901234"),
            record("SinID_3", "", "", "1560001111"),
            record("C2", "Beta", "Ruiz", "Beta"),
        ];
        rows[4].raw_zone = "Villa Rara".into();

        let unifier = RecordUnifier::default();
        let first = unifier.unify(&rows).unwrap();
        let refed: Vec<CanonicalRecord> = first.iter().map(CanonicalRecord::from).collect();
        let second = unifier.unify(&refed).unwrap();

        assert_eq!(first.len(), 4);
        assert_eq!(second, first);
    }

    #[test]
    fn test_fallback_policies_both_keep_rows_apart() {
        let rows = vec![record("", "Lopez", "", "Lopez"), record("", "Lopez", "", "Lopez")];
        for fallback in [FallbackKey::NameAndIndex, FallbackKey::RowIndex] {
            let customers = RecordUnifier::new(fallback).unify(&rows).unwrap();
            assert_eq!(customers.len(), 2);
        }
        assert_eq!(
            GroupKey::for_record(&rows[1], 1, FallbackKey::NameAndIndex),
            GroupKey::Synthetic("Lopez_1".into())
        );
        assert_eq!(
            GroupKey::for_record(&rows[1], 1, FallbackKey::RowIndex),
            GroupKey::Synthetic("#1".into())
        );
    }

    #[test]
    fn test_two_files_without_id_column_use_fallback_grouping() {
        // the id column exists but neither file fills it
        let file_a = grid(&[
            &["Nro", "Cliente", "Observaciones"],
            &["", "Lopez", "codigo 500-1234"],
        ]);
        let file_b = grid(&[
            &["Nro", "Cliente", "Telefono"],
            &["", "Lopez", "1144455566"],
        ]);

        let mut table = consolidate_file(grid_to_records(&file_a, "a.csv", 30)).unwrap();
        table.extend(consolidate_file(grid_to_records(&file_b, "b.csv", 30)).unwrap());
        let customers = RecordUnifier::default().unify(&table).unwrap();

        // without ids each row stays its own customer
        assert_eq!(customers.len(), 2);
        assert!(customers.iter().all(|c| c.name == "Lopez" && c.customer_id.is_empty()));
        assert!(customers[0].phones.is_empty());
        assert_eq!(customers[1].phones, vec!["1144455566"]);
    }

    #[test]
    fn test_two_files_with_id_column_merge_into_one_customer() {
        let file_a = grid(&[
            &["Nro", "Cliente", "Observaciones"],
            &["500", "Lopez", "codigo 500-1234"],
        ]);
        let file_b = grid(&[
            &["Nro", "Cliente", "Telefono"],
            &["500", "", "1144455566"],
        ]);

        let mut table = consolidate_file(grid_to_records(&file_a, "a.csv", 30)).unwrap();
        table.extend(consolidate_file(grid_to_records(&file_b, "b.csv", 30)).unwrap());
        let customers = RecordUnifier::default().unify(&table).unwrap();

        assert_eq!(customers.len(), 1);
        assert_eq!(customers[0].name, "Lopez");
        assert_eq!(customers[0].customer_id, "500");
        assert_eq!(customers[0].phones, vec!["1144455566"]);
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_at_100() {
        let rows: Vec<_> = (0..50)
            .map(|i| record(&format!("C{}", i), "Acme", "", "1144455566"))
            .collect();
        let mut seen = Vec::new();
        RecordUnifier::default()
            .consolidate(&rows, &mut |p, _| seen.push(p))
            .unwrap();

        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.first(), Some(&5));
        assert_eq!(seen.last(), Some(&100));
    }

    #[test]
    fn test_fallback_key_parses() {
        assert_eq!("name_index".parse::<FallbackKey>().unwrap(), FallbackKey::NameAndIndex);
        assert_eq!("ROW_INDEX".parse::<FallbackKey>().unwrap(), FallbackKey::RowIndex);
        assert!("random".parse::<FallbackKey>().is_err());
    }
}
