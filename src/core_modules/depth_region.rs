// THEORY:
// The `DepthRegion` module represents a rectangular block of a depth frame, the unit
// of regional analysis. Spatial pooling turns hundreds of thousands of per-pixel
// comparisons into a few hundred regional summaries and cancels isolated sensor
// speckle.
//
// A region is still a "dumb" container. It knows its own extent and how to summarise
// the pixels inside it that deviate from the background. It does not decide whether
// that deviation is a void, a mass or a distortion; that is the analyzer's job.

pub mod depth_region {
    use crate::core_modules::background_model::BackgroundModel;
    use crate::core_modules::frame::{DepthFrame, NO_READING};

    /// A pixel rectangle `[x0, x1) x [y0, y1)` of a frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DepthRegion {
        pub grid_x: u32,
        pub grid_y: u32,
        pub x0: u32,
        pub y0: u32,
        pub x1: u32,
        pub y1: u32,
    }

    /// Aggregates over the pixels of a region that deviate from the background.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct DeviationSummary {
        pub sum_depth: f64,
        pub sum_diff: f64,
        pub count: usize,
        pub min_depth: u16,
        pub max_depth: u16,
    }

    impl DeviationSummary {
        pub fn average_depth(&self) -> f32 {
            if self.count == 0 { 0.0 } else { (self.sum_depth / self.count as f64) as f32 }
        }

        pub fn average_diff(&self) -> f32 {
            if self.count == 0 { 0.0 } else { (self.sum_diff / self.count as f64) as f32 }
        }

        pub fn depth_range(&self) -> f32 {
            if self.count == 0 { 0.0 } else { f32::from(self.max_depth - self.min_depth) }
        }
    }

    impl DepthRegion {
        /// The region at grid cell `(grid_x, grid_y)`, clipped to the frame.
        pub fn new(grid_x: u32, grid_y: u32, region_size: u32, width: u32, height: u32) -> Self {
            let x0 = grid_x * region_size;
            let y0 = grid_y * region_size;
            Self {
                grid_x,
                grid_y,
                x0,
                y0,
                x1: (x0 + region_size).min(width),
                y1: (y0 + region_size).min(height),
            }
        }

        pub fn width(&self) -> u32 {
            self.x1 - self.x0
        }

        pub fn height(&self) -> u32 {
            self.y1 - self.y0
        }

        /// Centre pixel, in pixel coordinates (may be fractional).
        pub fn center(&self) -> (f32, f32) {
            (
                self.x0 as f32 + self.width() as f32 / 2.0,
                self.y0 as f32 + self.height() as f32 / 2.0,
            )
        }

        /// Integer pixel used to sample the background at the region centre.
        pub fn center_pixel(&self) -> (u32, u32) {
            (self.x0 + self.width() / 2, self.y0 + self.height() / 2)
        }

        /// Summarises every pixel where both readings are valid and differ by more
        /// than `min_change` millimetres.
        pub fn summarize(
            &self,
            frame: &DepthFrame,
            background: &BackgroundModel,
            min_change: f32,
        ) -> DeviationSummary {
            let mut summary = DeviationSummary {
                sum_depth: 0.0,
                sum_diff: 0.0,
                count: 0,
                min_depth: u16::MAX,
                max_depth: 0,
            };

            for y in self.y0..self.y1 {
                let row = frame.index(0, y);
                for x in self.x0..self.x1 {
                    let current = frame.depth_data[row + x as usize];
                    let expected = background.depth_at(x, y);
                    if current == NO_READING || expected <= 0.0 {
                        continue;
                    }
                    let diff = (f32::from(current) - expected).abs();
                    if diff <= min_change {
                        continue;
                    }
                    summary.sum_depth += f64::from(current);
                    summary.sum_diff += f64::from(diff);
                    summary.count += 1;
                    summary.min_depth = summary.min_depth.min(current);
                    summary.max_depth = summary.max_depth.max(current);
                }
            }

            summary
        }
    }
}

#[cfg(test)]
mod tests {
    use super::depth_region::*;
    use crate::core_modules::background_model::BackgroundModel;
    use crate::core_modules::frame::DepthFrame;

    #[test]
    fn border_regions_are_clipped() {
        let region = DepthRegion::new(1, 1, 32, 40, 40);
        assert_eq!((region.x0, region.y0, region.x1, region.y1), (32, 32, 40, 40));
        assert_eq!(region.width(), 8);
        assert_eq!(region.center_pixel(), (36, 36));
    }

    #[test]
    fn summary_counts_only_deviating_valid_pixels() {
        let background = BackgroundModel::init(&DepthFrame::filled(4, 4, 2000, 0.0, 0), 0.01);
        let mut data = vec![2000u16; 16];
        data[0] = 1700; // counted
        data[1] = 1980; // below threshold
        data[2] = 0; // missing
        data[3] = 2400; // counted
        let frame = DepthFrame::new(data, 4, 4, 1.0, 1).unwrap();
        let summary = DepthRegion::new(0, 0, 32, 4, 4).summarize(&frame, &background, 50.0);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.min_depth, 1700);
        assert_eq!(summary.max_depth, 2400);
        assert_eq!(summary.average_diff(), 350.0);
        assert_eq!(summary.depth_range(), 700.0);
    }
}
