//! Sharder
//!
//! Groups the splits of all modules into shards. Each shard serves one point of
//! the cross-product of the values observed on the sharded dimensions and is
//! made of:
//! - every master split
//! - for each sharded dimension, the splits targeting the point's value
//!
//! Points are enumerated in lexicographic order of their value tuple, with
//! dimensions in declaration order.

use std::collections::BTreeSet;

use log::{debug, info};
use rustc_hash::FxHashSet;

use crate::{
    error::{GenerationError, Result},
    model::{
        split::ModuleSplit,
        targeting::{DimensionValue, OptimizationDimension},
    },
};

/// Splits that together make up one standalone package
#[derive(Debug, Clone)]
pub struct ShardGroup<'a> {
    /// Position of the shard in the sharder's output
    pub index: usize,
    /// Value per sharded dimension that has any targeted split
    pub point: Vec<DimensionValue>,
    /// Member splits, in input order
    pub splits: Vec<&'a ModuleSplit>,
}

impl ShardGroup<'_> {
    /// Names of contributing modules, in order of first appearance
    pub fn module_names(&self) -> Vec<&str> {
        let mut seen = FxHashSet::default();
        self.splits
            .iter()
            .map(|split| split.module_name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }
}

/// Groups splits into shards along the required dimensions
#[derive(Debug, Clone)]
pub struct Sharder {
    dimensions: Vec<OptimizationDimension>,
}

impl Sharder {
    pub fn new(dimensions: impl IntoIterator<Item = OptimizationDimension>) -> Self {
        let dimensions: BTreeSet<_> = dimensions.into_iter().collect();
        Self {
            dimensions: dimensions.into_iter().collect(),
        }
    }

    /// Sharded dimensions in declaration order
    pub fn dimensions(&self) -> &[OptimizationDimension] {
        &self.dimensions
    }

    /// Partition `splits` into one group per point of the dimension space
    ///
    /// An empty input yields no shards. Without any targeted split the result is
    /// a single shard made of all master splits.
    pub fn group_splits_to_shards<'a>(
        &self,
        splits: &'a [ModuleSplit],
    ) -> Result<Vec<ShardGroup<'a>>> {
        if splits.is_empty() {
            return Ok(Vec::new());
        }

        let axes = self.observed_axes(splits)?;
        let points = cross_product(&axes);
        debug!(
            "Sharding {} splits over {} axes ({} points)",
            splits.len(),
            axes.len(),
            points.len()
        );

        let shards = points
            .into_iter()
            .enumerate()
            .map(|(index, point)| {
                let members = splits
                    .iter()
                    .filter(|split| split_applies_to(split, &point))
                    .collect();
                let group = ShardGroup {
                    index,
                    point,
                    splits: members,
                };
                check_one_split_per_axis(&group)?;
                Ok(group)
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Grouped {} splits into {} shards (sharded on {})",
            splits.len(),
            shards.len(),
            describe_dimensions(&self.dimensions)
        );
        Ok(shards)
    }

    /// Sorted observed values per sharded dimension, skipping empty axes
    fn observed_axes(&self, splits: &[ModuleSplit]) -> Result<Vec<Vec<DimensionValue>>> {
        let mut observed: Vec<BTreeSet<DimensionValue>> =
            vec![BTreeSet::new(); self.dimensions.len()];
        for split in splits.iter().filter(|split| !split.master) {
            for value in split.apk_targeting.values() {
                let dimension = value.dimension();
                let Some(axis) = self.dimensions.iter().position(|d| *d == dimension) else {
                    return Err(GenerationError::UnshardedDimension {
                        module: split.module_name.clone(),
                        dimension,
                    });
                };
                observed[axis].insert(value);
            }
        }
        Ok(observed
            .into_iter()
            .filter(|values| !values.is_empty())
            .map(|values| values.into_iter().collect())
            .collect())
    }
}

fn cross_product(axes: &[Vec<DimensionValue>]) -> Vec<Vec<DimensionValue>> {
    axes.iter().fold(vec![Vec::new()], |points, axis| {
        points
            .iter()
            .flat_map(|point| {
                axis.iter().map(move |value| {
                    let mut extended = point.clone();
                    extended.push(value.clone());
                    extended
                })
            })
            .collect()
    })
}

fn split_applies_to(split: &ModuleSplit, point: &[DimensionValue]) -> bool {
    split.master || split.apk_targeting.values().all(|value| point.contains(&value))
}

/// A module may contribute one master split and one split per sharded axis
fn check_one_split_per_axis(group: &ShardGroup<'_>) -> Result<()> {
    let mut seen = FxHashSet::default();
    for split in &group.splits {
        let axis = split
            .apk_targeting
            .values()
            .next()
            .map(|value| value.dimension());
        if !seen.insert((split.module_name.as_str(), axis)) {
            return Err(GenerationError::DuplicateModuleFragment {
                module: split.module_name.clone(),
                axis: axis.map_or_else(|| "master".to_owned(), |dimension| dimension.to_string()),
                shard: group.index,
            });
        }
    }
    Ok(())
}

fn describe_dimensions(dimensions: &[OptimizationDimension]) -> String {
    if dimensions.is_empty() {
        return "no dimensions".to_owned();
    }
    dimensions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" x ")
}
