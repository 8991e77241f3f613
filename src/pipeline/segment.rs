use crate::pipeline::periodize::PeriodSample;

/// One complete subscription term of a single customer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TermBlock {
    /// Zero-based renewal count, chronological.
    pub index: u32,
    /// Start of the term's first period, microseconds since epoch.
    pub start_ts: i64,
    /// Per-period volumes, chronological, exactly `term_len` long.
    pub volumes: Vec<f64>,
    /// Parallel rolling feature values, when enabled.
    pub rolling: Option<Vec<f64>>,
    /// Churn label: set on exactly the last term of a churned customer.
    pub churned: bool,
}

/// Segments one customer's active period sequence into complete terms.
///
/// The trailing `len % term_len` periods never form a complete term and are
/// dropped unconditionally, for churned and active customers alike: a
/// cancellation mid-term is attributed to the decision at the end of the
/// previous complete term, and an active customer's running term is not yet
/// observable. A customer with fewer than `term_len` active periods (no
/// renewal observed) contributes nothing.
///
/// The raw per-period churn indicator is true for every period from the
/// churn flag onward; after trimming it collapses to a per-term label that
/// marks only the last retained term of a churned customer.
pub(crate) fn into_terms(
    active: &[PeriodSample],
    rolling: Option<&[f64]>,
    churned: bool,
    term_len: usize,
) -> Vec<TermBlock> {
    let mut blocks: Vec<TermBlock> = active
        .chunks_exact(term_len)
        .enumerate()
        .map(|(index, chunk)| TermBlock {
            index: index as u32,
            start_ts: chunk[0].ts,
            volumes: chunk.iter().map(|sample| sample.volume).collect(),
            rolling: rolling.map(|r| r[index * term_len..(index + 1) * term_len].to_vec()),
            churned: false,
        })
        .collect();

    if churned && let Some(last) = blocks.last_mut() {
        last.churned = true;
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(volumes: &[f64]) -> Vec<PeriodSample> {
        volumes
            .iter()
            .enumerate()
            .map(|(i, &volume)| PeriodSample {
                ts: i as i64,
                volume,
            })
            .collect()
    }

    #[test]
    fn test_term_count_is_floor_of_len_over_term_len() {
        let active = series(&[2.0, 1.0, 0.0, 3.0, 5.0, 1.0, 9.0]);
        let blocks = into_terms(&active, None, false, 3);

        assert_eq!(blocks.len(), 2, "7 periods / term of 3 -> 2 complete terms");
        assert_eq!(blocks[0].volumes, vec![2.0, 1.0, 0.0]);
        assert_eq!(blocks[1].volumes, vec![3.0, 5.0, 1.0]);
        assert_eq!(blocks[0].index, 0);
        assert_eq!(blocks[1].index, 1);
    }

    #[test]
    fn test_churn_label_lands_on_last_retained_term_only() {
        let active = series(&[2.0, 1.0, 0.0, 3.0, 5.0, 1.0]);
        let blocks = into_terms(&active, None, true, 3);

        assert_eq!(blocks.len(), 2);
        assert!(!blocks[0].churned);
        assert!(blocks[1].churned);
    }

    #[test]
    fn test_non_churned_customer_has_no_positive_label() {
        let active = series(&[2.0, 1.0, 0.0, 3.0, 5.0, 1.0]);
        let blocks = into_terms(&active, None, false, 3);
        assert!(blocks.iter().all(|b| !b.churned));
    }

    #[test]
    fn test_fewer_periods_than_one_term_yields_nothing() {
        let active = series(&[2.0, 1.0]);
        let blocks = into_terms(&active, None, true, 3);
        assert!(
            blocks.is_empty(),
            "No renewal observed, so no term rows even for a churned customer"
        );
    }

    #[test]
    fn test_rolling_values_stay_aligned_after_trimming() {
        let active = series(&[2.0, 1.0, 0.0, 3.0, 5.0]);
        let rolling = [0.0, 2.0, 1.5, 0.5, 1.5];
        let blocks = into_terms(&active, Some(&rolling), false, 2);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].rolling.as_deref(), Some(&[0.0, 2.0][..]));
        assert_eq!(blocks[1].rolling.as_deref(), Some(&[1.5, 0.5][..]));
    }

    #[test]
    fn test_term_start_is_first_period_of_block() {
        let active = series(&[2.0, 1.0, 0.0, 3.0]);
        let blocks = into_terms(&active, None, false, 2);
        assert_eq!(blocks[0].start_ts, 0);
        assert_eq!(blocks[1].start_ts, 2);
    }
}
