//! Central/peripheral labeling of dot pairs sharing a nucleus.

use std::collections::BTreeMap;

use crate::table::{DotRecord, DotTable};

/// More than two dots in the same nucleus and channel.
pub const CROWDED: i8 = -1;
/// Single dot in its nucleus and channel.
pub const SINGLE: i8 = 0;
/// The pair member farther from the lamina.
pub const CENTRAL: i8 = 1;
/// The pair member closer to the lamina.
pub const PERIPHERAL: i8 = 2;

/// Label every assigned dot by the size of its (field, channel, cell) group.
///
/// Dots outside every nucleus, or from fields that were not analyzed, keep
/// an undefined label. In a pair, the lower `lamin_dist_norm` is peripheral;
/// on a tie the earlier row is.
pub fn label_alleles(records: &mut [DotRecord]) {
    let mut groups: BTreeMap<(u32, &str, u32), Vec<usize>> = BTreeMap::new();
    for (i, rec) in records.iter().enumerate() {
        if let Some(cell) = rec.cell_id.filter(|&c| c > 0) {
            groups
                .entry((rec.fov, rec.channel.as_str(), cell))
                .or_default()
                .push(i);
        }
    }

    let mut labels = vec![None; records.len()];
    for rows in groups.values() {
        match rows.as_slice() {
            [only] => labels[*only] = Some(SINGLE),
            &[a, b] => {
                let da = records[a].lamin_dist_norm.unwrap_or(f64::NAN);
                let db = records[b].lamin_dist_norm.unwrap_or(f64::NAN);
                let (near, far) = if db < da { (b, a) } else { (a, b) };
                labels[near] = Some(PERIPHERAL);
                labels[far] = Some(CENTRAL);
            }
            crowd => {
                for &i in crowd {
                    labels[i] = Some(CROWDED);
                }
            }
        }
    }

    for (rec, label) in records.iter_mut().zip(labels) {
        rec.allele = label;
    }
}

/// Label the alleles of an analyzed table.
///
/// A table without distance columns is left unchanged and `false` is
/// returned.
pub fn add_allele(table: &mut DotTable) -> bool {
    if !table.has_analysis() {
        tracing::warn!(
            "Some required columns are missing: cell_ID, lamin_dist_norm. Skipping allele labeling"
        );
        return false;
    }
    label_alleles(table.records_mut());
    let counts = table
        .records()
        .iter()
        .filter_map(|r| r.allele)
        .fold([0usize; 4], |mut acc, a| {
            acc[(a + 1) as usize] += 1;
            acc
        });
    tracing::info!(
        "Allele labels: {} crowded, {} single, {} central, {} peripheral",
        counts[0],
        counts[1],
        counts[2],
        counts[3]
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(fov: u32, channel: &str, cell: Option<u32>, norm: f64) -> DotRecord {
        let mut d = DotRecord::new(fov, channel, [0, 0, 0]);
        d.cell_id = cell;
        if cell.map_or(false, |c| c > 0) {
            d.lamin_dist_norm = Some(norm);
        }
        d
    }

    #[test]
    fn pair_is_split_into_peripheral_and_central() {
        let mut dots = vec![dot(1, "a", Some(3), 0.8), dot(1, "a", Some(3), 0.2)];
        label_alleles(&mut dots);
        assert_eq!(dots[0].allele, Some(CENTRAL));
        assert_eq!(dots[1].allele, Some(PERIPHERAL));
    }

    #[test]
    fn crowded_and_single_groups() {
        let mut dots = vec![
            dot(1, "a", Some(1), 0.1),
            dot(1, "a", Some(1), 0.5),
            dot(1, "a", Some(1), 0.9),
            dot(1, "a", Some(2), 0.4),
        ];
        label_alleles(&mut dots);
        let labels: Vec<Option<i8>> = dots.iter().map(|d| d.allele).collect();
        assert_eq!(labels, vec![Some(-1), Some(-1), Some(-1), Some(0)]);
    }

    #[test]
    fn unassigned_dots_stay_undefined() {
        let mut dots = vec![
            dot(1, "a", Some(0), 0.0),
            dot(1, "a", Some(0), 0.0),
            dot(2, "a", None, 0.0),
        ];
        label_alleles(&mut dots);
        assert!(dots.iter().all(|d| d.allele.is_none()));
    }

    #[test]
    fn groups_are_split_by_field_and_channel() {
        let mut dots = vec![
            dot(1, "a", Some(1), 0.3),
            dot(1, "b", Some(1), 0.4),
            dot(2, "a", Some(1), 0.5),
            dot(1, "a", Some(1), 0.6),
        ];
        label_alleles(&mut dots);
        let labels: Vec<Option<i8>> = dots.iter().map(|d| d.allele).collect();
        assert_eq!(labels, vec![Some(2), Some(0), Some(0), Some(1)]);
    }

    #[test]
    fn tie_marks_the_earlier_row_peripheral() {
        let mut dots = vec![dot(1, "a", Some(1), 0.5), dot(1, "a", Some(1), 0.5)];
        label_alleles(&mut dots);
        assert_eq!(dots[0].allele, Some(PERIPHERAL));
        assert_eq!(dots[1].allele, Some(CENTRAL));
    }

    #[test]
    fn table_without_distances_is_left_unchanged() {
        let mut table = DotTable::from_records(vec![dot(1, "a", Some(1), 0.5)]);
        assert!(!add_allele(&mut table));
        assert_eq!(table.records()[0].allele, None);

        table.start_analysis(0);
        table.records_mut()[0].set_distances(1, 1.0, 2.0);
        assert!(add_allele(&mut table));
        assert_eq!(table.records()[0].allele, Some(SINGLE));
    }
}
