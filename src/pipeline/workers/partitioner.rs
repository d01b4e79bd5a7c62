use serde::{Deserialize, Serialize};

use crate::common::{FaceRegion, PixelRect};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Regions with more pixels than this are split into row bands.
    pub tile_area_threshold: u64,
    pub tile_rows: u32,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            tile_area_threshold: 128 * 128,
            tile_rows: 64,
        }
    }
}

/// One unit of work: blur `tile`, which is part of the blur `region`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkUnit {
    pub region: PixelRect,
    pub tile: PixelRect,
}

/// Turns detected faces into disjoint units of work.
#[derive(Debug, Clone, Copy, Default)]
pub struct Partitioner {
    config: PartitionConfig,
}

impl Partitioner {
    pub fn new(config: PartitionConfig) -> Self {
        Self { config }
    }

    /// Merge overlapping rectangles into their union until no two overlap.
    ///
    /// The result is sorted by `y`, then `x`.
    pub fn coalesce(mut rects: Vec<PixelRect>) -> Vec<PixelRect> {
        loop {
            let overlap = (0..rects.len()).find_map(|i| {
                ((i + 1)..rects.len())
                    .find(|&j| rects[i].intersects(&rects[j]))
                    .map(|j| (i, j))
            });
            match overlap {
                Some((i, j)) => {
                    let other = rects.remove(j);
                    rects[i] = rects[i].union(&other);
                }
                None => break,
            }
        }
        rects.sort_by_key(|rect| (rect.y, rect.x));
        rects
    }

    pub fn plan(&self, regions: &[FaceRegion], width: u32, height: u32) -> Vec<WorkUnit> {
        let rects: Vec<PixelRect> = regions
            .iter()
            .filter_map(|region| region.rect().clip_to(width, height))
            .collect();
        let tile_rows = self.config.tile_rows.max(1);

        let mut units = Vec::new();
        for region in Self::coalesce(rects) {
            if region.area() <= self.config.tile_area_threshold || region.height <= tile_rows {
                units.push(WorkUnit {
                    region,
                    tile: region,
                });
                continue;
            }
            let mut y = region.y;
            while y < region.bottom() {
                let rows = tile_rows.min(region.bottom() - y);
                units.push(WorkUnit {
                    region,
                    tile: PixelRect::new(region.x, y, region.width, rows),
                });
                y += rows;
            }
        }
        units
    }
}
