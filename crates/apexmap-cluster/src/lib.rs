//! Layout-variant clustering.
//!
//! Groups one track's cached round entries by geometry-signature equality and
//! builds a `LayoutVariant` per group. Float noise between rounds of the same
//! layout is already absorbed by the quantization inside
//! `GeometrySignature::compute`, so equality here is plain string equality.
//!
//! Variants carry no ordering promise relative to each other; consumers that
//! need one (e.g. most-recent-first) sort on their side.

use std::collections::BTreeMap;

use apexmap_model::{GeometrySignature, LayoutVariant, RoundEntry, RoundRef};

/// Cluster a track's entries into layout variants.
///
/// Per group, label and length come from the member with the greatest
/// `RoundRef`; `years` is the sorted distinct set of member years; `rounds`
/// is the sorted set of member rounds.
pub fn cluster_variants<'a, I>(entries: I) -> Vec<LayoutVariant>
where
    I: IntoIterator<Item = &'a RoundEntry>,
{
    let mut groups: BTreeMap<&GeometrySignature, Vec<&RoundEntry>> = BTreeMap::new();
    for entry in entries {
        groups.entry(&entry.signature).or_default().push(entry);
    }

    groups
        .into_values()
        .filter_map(|members| {
            let rep = *members.iter().max_by_key(|e| e.round)?;

            let mut years: Vec<i32> = members.iter().map(|e| e.round.year).collect();
            years.sort_unstable();
            years.dedup();

            let mut rounds: Vec<RoundRef> = members.iter().map(|e| e.round).collect();
            rounds.sort_unstable();

            Some(LayoutVariant {
                signature: rep.signature.clone(),
                layout_label: rep.layout_label.clone(),
                layout_length: rep.layout_length,
                years,
                rounds,
            })
        })
        .collect()
}

/// Distinct years across all variants, sorted ascending. This is what gets
/// written into every entry's `layout_years` during enrichment.
pub fn flatten_years(variants: &[LayoutVariant]) -> Vec<i32> {
    let mut years: Vec<i32> = variants.iter().flat_map(|v| v.years.iter().copied()).collect();
    years.sort_unstable();
    years.dedup();
    years
}
